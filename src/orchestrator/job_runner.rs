//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Job Runner: the top-level per-job loop. Collects records, dispatches
//! them `PROCESS_RECORD_CONCURRENCY` at a time, and finalizes the job row
//! once every record has settled (spec §4.8).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

use crate::adapter::registry::AdapterRegistry;
use crate::db::{models, DbPool};
use crate::model::{JobConfig, LogLevel, Progress, Record};

use super::collector::JobCollector;
use super::context::RunContext;
use super::record_runner;

pub struct JobRunner;

impl JobRunner {
    /// Runs a job to completion. Any panic escaping the inner loop is
    /// caught so the job row is still finalized with `success = false`
    /// (spec §4.8 "Top-level error handling").
    pub async fn run(
        ctx: Arc<RunContext>,
        db: DbPool,
        registry: Arc<AdapterRegistry>,
        job_config: Arc<JobConfig>,
        concurrency: usize,
        interval: Duration,
    ) {
        let span = info_span!("job", job_token = %ctx.token());
        async move {
            let outcome = std::panic::AssertUnwindSafe(run_inner(
                ctx.clone(),
                db.clone(),
                registry,
                job_config.clone(),
                concurrency,
                interval,
            ))
            .catch_unwind()
            .await;

            if let Err(panic) = outcome {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(reason = %reason, "job runner terminated unexpectedly");
                ctx.log(
                    LogLevel::Error,
                    format!("job runner terminated unexpectedly: {reason}"),
                    None,
                );
                ctx.mutate(|report| {
                    report.data.success = Some(false);
                    report.progress = Progress::completed();
                });
            }

            // If the job was aborted mid-flight, `AbortHook::abort` already
            // owns the terminal write (progress = aborted, status =
            // "aborted"); finalizing here too would race the abort path and
            // regress the job row back to "completed" (spec §8 scenario 6).
            if !ctx.is_cancelled() {
                let report = ctx.snapshot();
                let report_value = serde_json::to_value(&report).unwrap_or_default();
                if let Err(err) =
                    models::finalize_job(&db, ctx.token(), "completed", report.data.success, &report_value).await
                {
                    error!(error = %err, "failed to finalize job row");
                }
            }

            // The callback fires on both success and failure (spec §7), so
            // it runs regardless of which path owned the terminal write.
            let report_value = serde_json::to_value(&ctx.snapshot()).unwrap_or_default();
            if let Some(url) = job_config
                .execution_context
                .as_ref()
                .and_then(|c| c.callback_url.clone())
            {
                fire_callback(&url, &report_value).await;
            }
        }
        .instrument(span)
        .await
    }
}

async fn run_inner(
    ctx: Arc<RunContext>,
    db: DbPool,
    registry: Arc<AdapterRegistry>,
    job_config: Arc<JobConfig>,
    concurrency: usize,
    interval: Duration,
) {
    ctx.mutate(|report| report.progress = Progress::running("collecting records", 0));
    let _ = ctx.push().await;

    if let Err(err) = models::mark_job_started(&db, ctx.token()).await {
        error!(error = %err, "failed to mark job started");
    }

    let collected = JobCollector::collect(&ctx, &db, &registry, &job_config).await;

    let mut queued: VecDeque<Record> = VecDeque::new();
    let mut completed: Vec<Record> = Vec::new();

    // Step 1: drain records the Collector already settled (failed imports).
    for record in collected {
        if record.completed {
            completed.push(record);
        } else {
            queued.push_back(record);
        }
    }

    let mut processing: Vec<JoinHandle<Record>> = Vec::new();

    while !(queued.is_empty() && processing.is_empty()) {
        let mut still_processing = Vec::with_capacity(processing.len());
        for handle in processing.drain(..) {
            if handle.is_finished() {
                match handle.await {
                    Ok(record) => completed.push(record),
                    Err(err) => error!(error = %err, "record runner task panicked"),
                }
            } else {
                still_processing.push(handle);
            }
        }
        processing = still_processing;

        while processing.len() < concurrency {
            let Some(record) = queued.pop_front() else { break };
            let task_ctx = ctx.clone();
            let task_db = db.clone();
            let task_registry = registry.clone();
            let task_job_config = job_config.clone();
            processing.push(tokio::spawn(async move {
                record_runner::run(task_ctx, task_db, task_registry, task_job_config, record).await
            }));
        }

        if queued.is_empty() && processing.is_empty() {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    let successful = completed.iter().filter(|r| r.status.is_success()).count();
    let failed = completed.len() - successful;

    ctx.log(
        LogLevel::Info,
        format!("Processed {} record(s) ({successful} successful, {failed} failed).", completed.len()),
        None,
    );
    info!(total = completed.len(), successful, failed, "job processing complete");

    let cancelled = ctx.is_cancelled();
    ctx.mutate(|report| {
        for record in &completed {
            report.data.records.insert(record.id.clone(), record.clone());
        }
        report.data.issues = report.data.records.values().filter(|r| !r.status.is_success()).count() as u32;
        report.recompute_success();
        // An abort delivered while records were still draining already set
        // progress to `aborted`; don't regress it back to `completed` once
        // the drain itself finishes (spec §8 scenario 6).
        if !cancelled {
            report.progress = Progress::completed();
        }
    });
}

async fn fire_callback(url: &str, report: &serde_json::Value) {
    let client = reqwest::Client::new();
    if let Err(err) = client.post(url).json(report).send().await {
        error!(error = %err, url, "completion callback failed");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use crate::model::{Report, Template, TemplateType};
    use crate::testutil::all_success_registry;

    use super::*;

    /// Every DB write `run_inner` issues against this pool fails (it never
    /// dials out) and is logged, not propagated — resume, import-record
    /// insert, and artifact persistence are all best-effort side effects
    /// here, so the records still settle on their own merits.
    fn test_ctx_and_db() -> (Arc<RunContext>, DbPool) {
        let db = sqlx::PgPool::connect_lazy("postgres://localhost/unused")
            .expect("lazy pool construction does not touch the network");
        let ctx = Arc::new(RunContext::new(db.clone(), Report::new("http://localhost", Uuid::new_v4(), json!({}))));
        (ctx, db)
    }

    fn plugin_job_config() -> JobConfig {
        let mut jc = JobConfig::new("cfg");
        jc.template = Some(Template { kind: TemplateType::Plugin, additional_information: json!({}) });
        jc
    }

    #[tokio::test]
    async fn run_inner_drains_the_queue_and_finalizes_the_report() {
        let (ctx, db) = test_ctx_and_db();
        let registry = Arc::new(all_success_registry(&["a", "b", "c"]));
        let job_config = Arc::new(plugin_job_config());

        run_inner(ctx.clone(), db, registry, job_config, 2, Duration::from_millis(1)).await;

        let report = ctx.snapshot();
        assert_eq!(report.data.records.len(), 3);
        for record in report.data.records.values() {
            assert!(record.completed);
            assert!(record.status.is_success(), "record '{}' ended as {:?}", record.id, record.status);
        }
        assert_eq!(report.data.issues, 0);
        assert_eq!(report.progress.status, crate::model::ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn run_inner_does_not_reclaim_progress_from_an_aborted_job() {
        let (ctx, db) = test_ctx_and_db();
        let registry = Arc::new(all_success_registry(&["a"]));
        let job_config = Arc::new(plugin_job_config());

        ctx.mutate(|report| {
            report.progress = crate::model::Progress::aborted("user requested", "test");
        });
        ctx.broadcast_abort("user requested".into(), "test".into()).await;

        run_inner(ctx.clone(), db, registry, job_config, 2, Duration::from_millis(1)).await;

        let report = ctx.snapshot();
        assert_eq!(report.progress.status, crate::model::ProgressStatus::Aborted);
    }
}
