//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Job Collector: resumes in-flight records from a prior job attempt, then
//! runs the import stage once for the records this submission newly
//! contributes (spec §4.7).

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{Duration, Utc};
use serde_json::Value;

use crate::adapter::registry::AdapterRegistry;
use crate::db::{models, DbPool};
use crate::model::{JobConfig, LogLevel, Record, RecordStageInfo, RecordStatus, Stage, TemplateType};

use super::context::RunContext;
use super::stage_runner;

pub struct JobCollector;

impl JobCollector {
    /// Runs both phases and returns every record (resumed and freshly
    /// imported) the Job Runner should dispatch.
    pub async fn collect(
        ctx: &RunContext,
        db: &DbPool,
        registry: &AdapterRegistry,
        job_config: &JobConfig,
    ) -> Vec<Record> {
        let mut records = Vec::new();

        if !job_config.test_mode && job_config.resume {
            records.extend(resume_phase(ctx, db, job_config).await);
        }

        records.extend(fresh_import_phase(ctx, db, registry, job_config).await);
        records
    }
}

async fn resume_phase(ctx: &RunContext, db: &DbPool, job_config: &JobConfig) -> Vec<Record> {
    let candidates = match models::select_inprocess_records(db, &job_config.id).await {
        Ok(rows) => rows,
        Err(err) => {
            ctx.log(LogLevel::Error, format!("resume phase query failed: {err}"), None);
            return Vec::new();
        }
    };

    let new_expiry = job_config
        .execution_context
        .as_ref()
        .and_then(|c| c.artifacts_ttl)
        .map(|ttl| Utc::now() + Duration::seconds(ttl));

    let mut resumed = Vec::new();
    for row in candidates {
        let owning_job = match models::fetch_job(db, row.job_token).await {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(err) => {
                ctx.log(
                    LogLevel::Error,
                    format!("resume phase failed to fetch owning job for record '{}': {err}", row.id),
                    None,
                );
                continue;
            }
        };

        if let Some(expiry) = new_expiry {
            let _ = models::extend_job_artifact_expiry(db, row.job_token, expiry).await;
            let _ = models::extend_artifact_expiry(db, &row.id, expiry).await;
        }

        let unresumable = owning_job
            .datetime_artifacts_expire
            .map(|expire| expire < Utc::now())
            .unwrap_or(true);
        if unresumable {
            let _ = models::update_record_status(db, &row.id, "process-error").await;
            continue;
        }

        let Some(mut stages) = rehydrate_stages(&owning_job.report, &row.id) else {
            let _ = models::update_record_status(db, &row.id, "process-error").await;
            continue;
        };
        stages.retain(|_, info: &mut RecordStageInfo| info.success == Some(true));

        if !stages.keys().any(|s| s.is_import()) {
            let _ = models::update_record_status(db, &row.id, "process-error").await;
            continue;
        }

        for info in stages.values() {
            if let Some(log_id) = &info.log_id {
                if let Some(child) = owning_job
                    .report
                    .get("children")
                    .and_then(|c| c.get(log_id))
                {
                    ctx.set_child_report(log_id, child.clone());
                }
            }
        }

        if let Err(err) = models::repoint_record_job(db, &row.id, ctx.token()).await {
            ctx.log(
                LogLevel::Error,
                format!("failed to repoint resumed record '{}': {err}", row.id),
                None,
            );
            continue;
        }

        let mut record = Record::new(row.id.clone());
        record.status = RecordStatus::InProcess;
        record.bitstream = row.bitstream;
        record.skip_object_validation = row.skip_object_validation;
        record.import_type = row.import_type;
        record.oai_identifier = row.oai_identifier;
        record.oai_datestamp = row.oai_datestamp;
        record.hotfolder_original_path = row.hotfolder_original_path;
        record.archive_sip_id = row.archive_sip_id;
        record.archive_ie_id = row.archive_ie_id;
        record.ie_id = row.ie_id.map(|id| id.to_string());
        record.stages = stages;
        resumed.push(record);
    }

    resumed
}

fn rehydrate_stages(job_report: &Value, record_id: &str) -> Option<HashMap<Stage, RecordStageInfo>> {
    let raw = job_report
        .get("data")?
        .get("records")?
        .get(record_id)?
        .get("stages")?
        .as_object()?;

    let mut stages = HashMap::new();
    for (key, value) in raw {
        if let Ok(stage) = Stage::from_str(key) {
            if let Ok(info) = serde_json::from_value::<RecordStageInfo>(value.clone()) {
                stages.insert(stage, info);
            }
        }
    }
    Some(stages)
}

async fn fresh_import_phase(
    ctx: &RunContext,
    db: &DbPool,
    registry: &AdapterRegistry,
    job_config: &JobConfig,
) -> Vec<Record> {
    let import_stage = match job_config.template.as_ref().map(|t| t.kind) {
        Some(TemplateType::Hotfolder) => Stage::ImportIps,
        _ => Stage::ImportIes,
    };

    let mut synthetic = Record::new("import");
    let outcome = stage_runner::run(
        ctx,
        db,
        registry,
        job_config,
        &mut synthetic,
        import_stage,
        true,
        true,
    )
    .await;

    let Some(report) = outcome.report.filter(|_| outcome.success) else {
        if let Some(log_id) = synthetic.stages.get(&import_stage).and_then(|i| i.log_id.clone()) {
            if let Some(child) = ctx.snapshot().children.get(&log_id) {
                merge_child_errors_into_job_log(ctx, child, &log_id);
            }
        }
        return Vec::new();
    };

    let mut imported = Vec::new();
    for (id, entry) in report
        .get("data")
        .and_then(|d| d.get("records"))
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
    {
        let fetched = entry
            .get("fetchedPayload")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut record = Record::new(id.clone());
        record.import_type = entry
            .get("importType")
            .and_then(Value::as_str)
            .map(str::to_string);
        record.oai_identifier = entry
            .get("oaiIdentifier")
            .and_then(Value::as_str)
            .map(str::to_string);
        record.oai_datestamp = entry
            .get("oaiDatestamp")
            .and_then(Value::as_str)
            .map(str::to_string);
        record.hotfolder_original_path = entry
            .get("hotfolderOriginalPath")
            .and_then(Value::as_str)
            .map(str::to_string);
        record.bitstream = entry.get("bitstream").and_then(Value::as_bool).unwrap_or(false);
        record.skip_object_validation = entry
            .get("skipObjectValidation")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let info = RecordStageInfo {
            completed: true,
            success: Some(fetched),
            artifact: entry.get("artifact").and_then(Value::as_str).map(str::to_string),
            ..Default::default()
        };
        record.stages.insert(import_stage, info);

        if !fetched {
            record.status = import_stage.error_status();
            record.completed = true;
        } else {
            record.status = RecordStatus::InProcess;
            if let Err(err) =
                super::post_stage::run(ctx, db, job_config, ctx.token(), &mut record, import_stage).await
            {
                ctx.log(
                    LogLevel::Error,
                    format!("post-stage persistence for imported record '{id}' failed: {err}"),
                    None,
                );
            }
        }

        imported.push(record);
    }

    imported
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use uuid::Uuid;

    use crate::adapter::StageAdapter;
    use crate::model::{JobContext, Report, Template, TriggerType};
    use crate::testutil::FakeImportAdapter;

    use super::*;

    fn test_ctx_and_db() -> (RunContext, DbPool) {
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused")
            .expect("lazy pool construction does not touch the network");
        let ctx = RunContext::new(db.clone(), Report::new("http://localhost", Uuid::new_v4(), json!({})));
        (ctx, db)
    }

    fn test_trigger_job_config() -> JobConfig {
        let mut jc = JobConfig::new("cfg");
        jc.template = Some(Template { kind: TemplateType::Plugin, additional_information: json!({}) });
        jc.execution_context = Some(JobContext {
            user_triggered: None,
            datetime_triggered: chrono::Utc::now(),
            trigger_type: TriggerType::Test,
            artifacts_ttl: None,
            callback_url: None,
        });
        jc
    }

    #[tokio::test]
    async fn fresh_import_phase_turns_each_entry_into_a_record() {
        let (ctx, db) = test_ctx_and_db();
        let mut adapters: HashMap<Stage, Arc<dyn StageAdapter>> = HashMap::new();
        adapters.insert(Stage::ImportIes, Arc::new(FakeImportAdapter::all_succeed(Stage::ImportIes, &["a", "b"])));
        let registry = AdapterRegistry::from_adapters(adapters);
        let job_config = test_trigger_job_config();

        let imported = fresh_import_phase(&ctx, &db, &registry, &job_config).await;

        assert_eq!(imported.len(), 2);
        let ids: Vec<&str> = imported.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"a") && ids.contains(&"b"));
        for record in &imported {
            assert!(!record.completed);
            assert_eq!(record.status, RecordStatus::InProcess);
            let info = record.stages.get(&Stage::ImportIes).expect("import stage recorded");
            assert_eq!(info.success, Some(true));
        }
    }

    #[tokio::test]
    async fn fresh_import_phase_marks_unfetched_entries_as_import_error() {
        let (ctx, db) = test_ctx_and_db();
        let entries = vec![("c".to_string(), json!({ "fetchedPayload": false }))];
        let mut adapters: HashMap<Stage, Arc<dyn StageAdapter>> = HashMap::new();
        adapters.insert(Stage::ImportIes, Arc::new(FakeImportAdapter::new(Stage::ImportIes, entries)));
        let registry = AdapterRegistry::from_adapters(adapters);
        let job_config = test_trigger_job_config();

        let imported = fresh_import_phase(&ctx, &db, &registry, &job_config).await;

        assert_eq!(imported.len(), 1);
        assert!(imported[0].completed);
        assert_eq!(imported[0].status, Stage::ImportIes.error_status());
    }

    #[tokio::test]
    async fn resume_phase_tolerates_an_unreachable_database() {
        let (ctx, db) = test_ctx_and_db();
        let job_config = test_trigger_job_config();

        let resumed = resume_phase(&ctx, &db, &job_config).await;

        assert!(resumed.is_empty());
    }
}

fn merge_child_errors_into_job_log(ctx: &RunContext, child: &Value, log_id: &str) {
    let Some(entries) = child.get("log").and_then(Value::as_array) else {
        return;
    };
    for entry in entries {
        let is_error = entry
            .get("level")
            .and_then(Value::as_str)
            .map(|l| l.eq_ignore_ascii_case("error"))
            .unwrap_or(false);
        if !is_error {
            continue;
        }
        let body = entry.get("body").and_then(Value::as_str).unwrap_or("");
        ctx.log(LogLevel::Error, body.to_string(), Some(log_id));
    }
}
