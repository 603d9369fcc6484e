//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Record Runner: drives one record through the state machine, dispatching
//! same-step-tuple stages (metadata + payload validation) in parallel
//! tasks and keeping the rest strictly sequential (spec §4.3, §5).

use std::sync::Arc;

use tracing::{info_span, Instrument};

use crate::adapter::registry::AdapterRegistry;
use crate::db::DbPool;
use crate::model::{JobConfig, Record, Stage};

use super::context::RunContext;
use super::{stage_runner, state_machine};

/// Copies the outcome of running `stage` on an independent clone of the
/// record back onto the canonical one. Only `stage`'s own `RecordStageInfo`
/// entry, and (for `VALIDATION_METADATA`, the one sibling whose `eval`
/// touches top-level fields) the identifiers it resolved, are merged back.
/// The first branch to have left `InProcess` wins the merged status, since
/// siblings settle concurrently and no ordering between them is specified.
fn merge_branch(record: &mut Record, branch: Record, stage: Stage) {
    if let Some(info) = branch.stages.get(&stage) {
        record.stages.insert(stage, info.clone());
    }
    if stage == Stage::ValidationMetadata {
        record.origin_system_id = branch.origin_system_id;
        record.external_id = branch.external_id;
        record.source_organization = branch.source_organization;
        record.ie_id = branch.ie_id;
    }
    if record.status == crate::model::RecordStatus::InProcess {
        record.status = branch.status;
    }
}

pub async fn run(
    ctx: Arc<RunContext>,
    db: DbPool,
    registry: Arc<AdapterRegistry>,
    job_config: Arc<JobConfig>,
    mut record: Record,
) -> Record {
    let span = info_span!("record", record_id = %record.id);
    async move {
        let mut drained = false;
        loop {
            if ctx.is_cancelled() {
                break;
            }
            // A stage failure already escalated `record.status` to a
            // terminal `*_ERROR` (stage_runner::run via `get_record_status`);
            // `get_next_stage` only inspects per-stage `success` flags, not
            // the record's overall status, so without this check a failed
            // stage would be re-dispatched forever (spec §7 "the record is
            // terminated but the job continues").
            if record.status != crate::model::RecordStatus::InProcess {
                break;
            }

            let Some(stages) = state_machine::get_next_stage(&record, &job_config) else {
                drained = true;
                break;
            };

            if stages.len() == 1 {
                stage_runner::run(
                    &ctx,
                    &db,
                    &registry,
                    &job_config,
                    &mut record,
                    stages[0],
                    false,
                    false,
                )
                .await;
            } else {
                let mut handles = Vec::with_capacity(stages.len());
                for stage in stages {
                    let ctx = ctx.clone();
                    let db = db.clone();
                    let registry = registry.clone();
                    let job_config = job_config.clone();
                    let mut branch = record.clone();
                    handles.push(tokio::spawn(async move {
                        stage_runner::run(&ctx, &db, &registry, &job_config, &mut branch, stage, false, false)
                            .await;
                        (stage, branch)
                    }));
                }
                for handle in handles {
                    match handle.await {
                        Ok((stage, branch)) => merge_branch(&mut record, branch, stage),
                        Err(err) => {
                            tracing::error!(error = %err, "sibling stage task panicked");
                            record.status = crate::model::RecordStatus::ProcessError;
                        }
                    }
                }
            }

            record.mark_changed();
            ctx.mutate(|report| {
                report.data.records.insert(record.id.clone(), record.clone());
            });
            if let Err(err) = ctx.push().await {
                tracing::warn!(error = %err, "failed to persist job report");
            }
        }

        // The state machine only ever reports a failure explicitly; reaching
        // the end of the pipeline with no stage having failed is success
        // (spec §8: every record ends `completed=true` in a terminal status).
        if drained && record.status == crate::model::RecordStatus::InProcess {
            record.status = crate::model::RecordStatus::Complete;
        }
        record.completed = true;
        ctx.mutate(|report| {
            report.data.records.insert(record.id.clone(), record.clone());
        });

        record
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use crate::model::{RecordStageInfo, RecordStatus, Report, Template, TemplateType};
    use crate::testutil::{all_success_registry, FakeAdapter};

    use super::*;

    fn test_ctx() -> Arc<RunContext> {
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused")
            .expect("lazy pool construction does not touch the network");
        Arc::new(RunContext::new(db, Report::new("http://localhost", Uuid::new_v4(), json!({}))))
    }

    fn already_imported(id: &str) -> Record {
        let mut record = Record::new(id);
        record.bitstream = true;
        record.stages.insert(
            Stage::ImportIes,
            RecordStageInfo { completed: true, success: Some(true), artifact: Some("import-artifact".into()), ..Default::default() },
        );
        record
    }

    fn plugin_job_config() -> JobConfig {
        let mut jc = JobConfig::new("cfg");
        jc.template = Some(Template { kind: TemplateType::Plugin, additional_information: json!({}) });
        jc
    }

    #[tokio::test]
    async fn happy_path_drains_to_complete() {
        let ctx = test_ctx();
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let registry = Arc::new(all_success_registry(&["r1"]));
        let job_config = Arc::new(plugin_job_config());

        let record = run(ctx, db, registry, job_config, already_imported("r1")).await;

        assert!(record.completed);
        assert_eq!(record.status, RecordStatus::Complete);
        for stage in [Stage::BuildIp, Stage::ValidationMetadata, Stage::PrepareIp, Stage::BuildSip, Stage::Transfer, Stage::Ingest] {
            let info = record.stages.get(&stage).unwrap_or_else(|| panic!("missing {stage}"));
            assert_eq!(info.success, Some(true), "{stage} did not succeed");
        }
        assert!(!record.stages.contains_key(&Stage::ValidationPayload), "bitstream record must skip payload validation");
    }

    #[tokio::test]
    async fn failed_stage_terminates_the_record_without_looping() {
        let ctx = test_ctx();
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap();

        let mut adapters: std::collections::HashMap<Stage, Arc<dyn crate::adapter::StageAdapter>> = std::collections::HashMap::new();
        adapters.insert(Stage::BuildIp, Arc::new(FakeAdapter::new(Stage::BuildIp, true)));
        adapters.insert(Stage::ValidationMetadata, Arc::new(FakeAdapter::new(Stage::ValidationMetadata, false)));
        let registry = Arc::new(crate::adapter::registry::AdapterRegistry::from_adapters(adapters));
        let job_config = Arc::new(plugin_job_config());

        let record = run(ctx, db, registry, job_config, already_imported("r2")).await;

        assert!(record.completed);
        assert_eq!(record.status, Stage::ValidationMetadata.error_status());
        let info = record.stages.get(&Stage::ValidationMetadata).unwrap();
        assert_eq!(info.success, Some(false));
        // Must not have been retried: a single FakeAdapter call increments
        // its own internal call counter, but the stage must appear in the
        // record's map exactly once regardless.
        assert!(!record.stages.contains_key(&Stage::PrepareIp));
    }
}
