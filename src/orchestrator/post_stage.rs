//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Post-stage persistence (spec §4.5) and IE linking (spec §4.6).
//!
//! Invoked by the Stage Runner after a stage completes successfully, and
//! directly by the Job Collector for each freshly imported record (which
//! never goes through the Stage Runner itself — import produces a batch,
//! not a single-record submission).

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::db::{models, DbPool};
use crate::error::Result;
use crate::model::{JobConfig, JobContext, LogLevel, Record, RecordStatus, Stage};

use super::context::RunContext;

fn status_text(status: RecordStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "in-process".to_string())
}

pub async fn run(
    ctx: &RunContext,
    db: &DbPool,
    job_config: &JobConfig,
    job_token: Uuid,
    record: &mut Record,
    stage: Stage,
) -> Result<()> {
    let is_test_trigger = job_config
        .execution_context
        .as_ref()
        .map(JobContext::is_test_trigger)
        .unwrap_or(false);

    match stage {
        // Each new record is inserted on completion of its import stage,
        // except when the submission itself is a dry `trigger_type=test`
        // run, which must not leave any durable trace (spec §4.8 "Lifecycles").
        Stage::ImportIes | Stage::ImportIps if !is_test_trigger => {
            models::insert_record(
                db,
                &record.id,
                &job_config.id,
                job_token,
                &status_text(record.status),
                record.import_type.as_deref(),
                record.oai_identifier.as_deref(),
                record.oai_datestamp.as_deref(),
                record.hotfolder_original_path.as_deref(),
            )
            .await?;
        }
        Stage::ImportIes | Stage::ImportIps => {}
        Stage::ValidationMetadata => {
            link_record_to_ie(ctx, db, job_config, record).await?;
        }
        Stage::Ingest => {
            models::update_record_archive_ids(
                db,
                &record.id,
                record.archive_ie_id.as_deref(),
                record.archive_sip_id.as_deref(),
            )
            .await?;
        }
        _ => {}
    }

    if stage.is_producer() {
        if let Some(artifact) = record.artifact_from(stage) {
            let expires = job_config
                .execution_context
                .as_ref()
                .and_then(|c| c.artifacts_ttl)
                .map(|ttl| Utc::now() + Duration::seconds(ttl));
            models::insert_artifact(db, artifact, &record.id, stage, expires).await?;
        }
    }

    Ok(())
}

/// Spec §4.6: identifies the logical Intellectual Entity across jobs and
/// attaches `record.ie_id` to it.
async fn link_record_to_ie(
    ctx: &RunContext,
    db: &DbPool,
    job_config: &JobConfig,
    record: &mut Record,
) -> Result<()> {
    let (Some(origin_system_id), Some(external_id)) =
        (record.origin_system_id.clone(), record.external_id.clone())
    else {
        ctx.log(
            LogLevel::Error,
            format!("record '{}' is missing identifiers for IE linking", record.id),
            None,
        );
        record.status = RecordStatus::IpValError;
        return Ok(());
    };

    let Some(archive_id) = job_config.resolve_archive_id().map(str::to_string) else {
        ctx.log(
            LogLevel::Error,
            format!("record '{}' has no resolvable target archive for IE linking", record.id),
            None,
        );
        record.status = RecordStatus::ProcessError;
        return Ok(());
    };

    let existing = models::find_ie(db, &job_config.id, &origin_system_id, &external_id, &archive_id).await?;

    let ie_id = match existing {
        Some(ie) => {
            if ie.source_organization.is_none() {
                if let Some(org) = &record.source_organization {
                    models::update_ie_source_organization(db, ie.id, org).await?;
                }
            }
            ie.id
        }
        None => {
            models::insert_ie(
                db,
                &job_config.id,
                record.source_organization.as_deref(),
                &origin_system_id,
                &external_id,
                &archive_id,
            )
            .await?
        }
    };

    record.ie_id = Some(ie_id.to_string());
    models::update_record_ie(db, &record.id, ie_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::model::{Report, TriggerType};

    use super::*;

    fn test_ctx_and_db() -> (RunContext, DbPool) {
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused")
            .expect("lazy pool construction does not touch the network");
        let ctx = RunContext::new(db.clone(), Report::new("http://localhost", Uuid::new_v4(), json!({})));
        (ctx, db)
    }

    #[tokio::test]
    async fn test_trigger_suppresses_record_insert() {
        let (ctx, db) = test_ctx_and_db();
        let mut job_config = JobConfig::new("cfg");
        job_config.execution_context = Some(JobContext {
            user_triggered: None,
            datetime_triggered: chrono::Utc::now(),
            trigger_type: TriggerType::Test,
            artifacts_ttl: None,
            callback_url: None,
        });
        let mut record = Record::new("rec-1");

        // If the insert were attempted, it would fail against the unreachable
        // lazy pool; `Ok(())` here is only possible because it was skipped.
        let result = run(&ctx, &db, &job_config, Uuid::new_v4(), &mut record, Stage::ImportIes).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn non_producer_stage_without_artifact_is_a_noop() {
        let (ctx, db) = test_ctx_and_db();
        let job_config = JobConfig::new("cfg");
        let mut record = Record::new("rec-2");

        let result = run(&ctx, &db, &job_config, Uuid::new_v4(), &mut record, Stage::ValidationPayload).await;
        assert!(result.is_ok());
    }
}
