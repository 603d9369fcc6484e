//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Stage Runner: drives a single `(record, stage)` pair through submit,
//! poll, eval, and post-stage persistence (spec §4.4).

use serde_json::Value;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::adapter::registry::AdapterRegistry;
use crate::adapter::{SubmissionToken, UpdateHook};
use crate::db::DbPool;
use crate::error::OrchestratorError;
use crate::model::{JobConfig, LogLevel, Record, RecordStageInfo, RecordStatus, Stage};

use super::context::RunContext;
use super::{post_stage, state_machine};

pub struct StageOutcome {
    pub success: bool,
    /// The downstream's terminal report, when a submit/poll round actually
    /// completed. `None` on a `MissingInput`/submit/poll failure — used by
    /// the Job Collector's fresh-import phase to read `data.records` back
    /// out without a second round-trip through `report.children`.
    pub report: Option<Value>,
}

fn fail_stage(record: &mut Record, stage: Stage, log_id: &str) {
    let info = record.stages.entry(stage).or_default();
    info.completed = true;
    info.success = Some(false);
    info.log_id = Some(log_id.to_string());
}

fn copy_child_errors(ctx: &RunContext, record_id: &str, stage: Stage, log_id: &str, report: &Value) {
    let Some(entries) = report.get("log").and_then(Value::as_array) else {
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
        ctx.log(
            LogLevel::Error,
            format!("Running stage '{stage}' for record '{record_id}' caused an error: {body}"),
            Some(log_id),
        );
    }
}

/// Runs `stage` for `record`. `skip_eval`/`skip_post_stage` are used by the
/// Job Collector's fresh-import phase, which runs the import stage itself
/// through this function before any real records exist (spec §4.7).
pub async fn run(
    ctx: &RunContext,
    db: &DbPool,
    registry: &AdapterRegistry,
    job_config: &JobConfig,
    record: &mut Record,
    stage: Stage,
    skip_eval: bool,
    skip_post_stage: bool,
) -> StageOutcome {
    let span = info_span!("stage", stage = %stage, record_id = %record.id);
    async move {
        let Some(adapter) = registry.get(stage) else {
            ctx.log(
                LogLevel::Error,
                format!("no adapter configured for stage '{stage}'"),
                None,
            );
            record.status = RecordStatus::ProcessError;
            return StageOutcome { success: false, report: None };
        };

        // Step 1: allocate the client-side idempotency token.
        let mut token = Uuid::new_v4().to_string();
        record.stages.insert(stage, RecordStageInfo::new(token.clone()));
        let mut log_id = format!("{token}@{stage}");

        // Steps 2-3: register the child placeholder and the self-contained
        // abort callback, keyed by the token we just allocated.
        let abort_callback = adapter.abort_callback(SubmissionToken(token.clone()));
        ctx.add_child(token.clone(), log_id.clone(), abort_callback);

        // Step 4: build the request body.
        let body = match adapter.build_request_body(job_config, record) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(error = %err, "build_request_body failed");
                fail_stage(record, stage, &log_id);
                record.status = RecordStatus::ProcessError;
                ctx.remove_child(&token);
                return StageOutcome { success: false, report: None };
            }
        };

        // Step 5: submit, then poll to a terminal report.
        let submission = adapter.submit(body, &token).await;
        let submission_token = match submission {
            Ok(t) => t,
            Err(err) => {
                return finish_with_downstream_error(ctx, record, stage, &token, &log_id, err);
            }
        };

        if submission_token.0 != token {
            let new_log_id = format!("{}@{}", submission_token.0, stage);
            ctx.rekey_child(&token, &submission_token.0, &new_log_id);
            if let Some(info) = record.stages.get_mut(&stage) {
                info.token = Some(submission_token.0.clone());
            }
            token = submission_token.0.clone();
            log_id = new_log_id;
        }

        let hook_ctx = ctx;
        let hook_log_id = log_id.clone();
        let update_hook: UpdateHook = Box::new(move |report: &Value| {
            hook_ctx.set_child_report(&hook_log_id, report.clone());
        });

        let poll_result = adapter.poll(&submission_token, update_hook).await;
        let report = match poll_result {
            Ok(report) => report,
            Err(err) => {
                return finish_with_downstream_error(ctx, record, stage, &token, &log_id, err);
            }
        };

        // Step 6: un-register the abort handle now that we have a terminal
        // outcome.
        ctx.remove_child(&token);
        ctx.set_child_report(&log_id, report.clone());

        // Step 7: eval + copy downstream errors into the job log.
        if !skip_eval {
            adapter.eval(record, &report);
        }
        copy_child_errors(ctx, &record.id, stage, &log_id, &report);

        // Step 8: mark the stage terminal.
        let success = adapter.success(&report);
        {
            let info = record.stages.entry(stage).or_default();
            info.completed = true;
            info.success = Some(success);
            info.log_id = Some(log_id.clone());
        }
        record.status = state_machine::get_record_status(stage, record);

        // Step 9: post-stage persistence, unless asked to skip or failed.
        if !skip_post_stage && success {
            if let Err(err) = post_stage::run(ctx, db, job_config, ctx.token(), record, stage).await {
                ctx.log(
                    LogLevel::Error,
                    format!("post-stage persistence for '{stage}' failed: {err}"),
                    Some(&log_id),
                );
            }
        }

        StageOutcome { success, report: Some(report) }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde_json::json;

    use crate::adapter::StageAdapter;
    use crate::model::Report;
    use crate::testutil::FakeAdapter;

    use super::*;

    /// `connect_lazy` never dials the database; these tests all pass
    /// `skip_post_stage = true` so no query is ever issued against it.
    fn test_ctx() -> RunContext {
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused")
            .expect("lazy pool construction does not touch the network");
        let token = Uuid::new_v4();
        RunContext::new(db, Report::new("http://localhost", token, json!({})))
    }

    fn registry_with(stage: Stage, adapter: FakeAdapter) -> AdapterRegistry {
        let mut adapters: HashMap<Stage, Arc<dyn StageAdapter>> = HashMap::new();
        adapters.insert(stage, Arc::new(adapter));
        AdapterRegistry::from_adapters(adapters)
    }

    #[tokio::test]
    async fn successful_producer_stage_records_artifact_and_terminal_status() {
        let ctx = test_ctx();
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let registry = registry_with(Stage::PrepareIp, FakeAdapter::new(Stage::PrepareIp, true));
        let job_config = JobConfig::new("cfg");
        let mut record = Record::new("rec-1");

        let outcome = run(&ctx, &db, &registry, &job_config, &mut record, Stage::PrepareIp, false, true).await;

        assert!(outcome.success);
        let info = record.stages.get(&Stage::PrepareIp).expect("stage recorded");
        assert!(info.completed);
        assert_eq!(info.success, Some(true));
        assert_eq!(info.artifact.as_deref(), Some("prepare_ip-artifact-rec-1"));
        assert_eq!(record.status, RecordStatus::InProcess);
    }

    #[tokio::test]
    async fn downstream_failure_marks_stage_error_status() {
        let ctx = test_ctx();
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let registry = registry_with(Stage::Transfer, FakeAdapter::new(Stage::Transfer, false));
        let job_config = JobConfig::new("cfg");
        let mut record = Record::new("rec-2");

        let outcome = run(&ctx, &db, &registry, &job_config, &mut record, Stage::Transfer, false, true).await;

        assert!(!outcome.success);
        let info = record.stages.get(&Stage::Transfer).expect("stage recorded");
        assert_eq!(info.success, Some(false));
        assert_eq!(record.status, Stage::Transfer.error_status());
    }

    #[tokio::test]
    async fn missing_input_short_circuits_before_submission() {
        let ctx = test_ctx();
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let registry = registry_with(Stage::BuildSip, FakeAdapter::failing_request_body(Stage::BuildSip));
        let job_config = JobConfig::new("cfg");
        let mut record = Record::new("rec-3");

        let outcome = run(&ctx, &db, &registry, &job_config, &mut record, Stage::BuildSip, false, true).await;

        assert!(!outcome.success);
        assert!(outcome.report.is_none());
        assert_eq!(record.status, RecordStatus::ProcessError);
        let info = record.stages.get(&Stage::BuildSip).expect("stage recorded");
        assert_eq!(info.success, Some(false));
    }

    #[tokio::test]
    async fn missing_adapter_marks_process_error_without_dispatch() {
        let ctx = test_ctx();
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let registry = AdapterRegistry::from_adapters(HashMap::new());
        let job_config = JobConfig::new("cfg");
        let mut record = Record::new("rec-4");

        let outcome = run(&ctx, &db, &registry, &job_config, &mut record, Stage::Ingest, false, true).await;

        assert!(!outcome.success);
        assert_eq!(record.status, RecordStatus::ProcessError);
        assert!(record.stages.get(&Stage::Ingest).is_none());
    }
}

fn finish_with_downstream_error(
    ctx: &RunContext,
    record: &mut Record,
    stage: Stage,
    token: &str,
    log_id: &str,
    err: OrchestratorError,
) -> StageOutcome {
    ctx.log(
        LogLevel::Error,
        format!(
            "Running stage '{stage}' for record '{}' caused an error: {err}",
            record.id
        ),
        Some(log_id),
    );
    fail_stage(record, stage, log_id);
    ctx.remove_child(token);

    record.status = if err.is_orchestrator_level() {
        RecordStatus::ProcessError
    } else {
        state_machine::get_record_status(stage, record)
    };

    StageOutcome { success: false, report: None }
}
