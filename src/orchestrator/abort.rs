//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Abort Hook: the synchronous-to-the-client cancellation path invoked by
//! `DELETE /process` (spec §4.9).

use serde_json::Value;
use uuid::Uuid;

use crate::db::{models, DbPool};
use crate::error::{OrchestratorError, Result};
use crate::model::{Progress, Report};

use super::context::RunContext;

pub struct AbortHook;

impl AbortHook {
    /// `ctx` is `Some` iff the job is currently tracked in-process by the
    /// worker pool (i.e. genuinely in-flight). A job that is `queued` or
    /// `running` in the database but has no live context (the worker that
    /// owned it is gone) is treated as never-running: its final report is
    /// synthesized directly.
    pub async fn abort(db: &DbPool, token: Uuid, reason: &str, origin: &str, ctx: Option<&RunContext>) -> Result<()> {
        if let Some(ctx) = ctx {
            ctx.broadcast_abort(reason.to_string(), origin.to_string()).await;
            ctx.mutate(|report| report.progress = Progress::aborted(reason, origin));
            let report = ctx.snapshot();
            let report_value = serde_json::to_value(&report).unwrap_or_default();
            models::finalize_job(db, token, "aborted", report.data.success, &report_value).await?;
            return Ok(());
        }

        let Some(job) = models::fetch_job(db, token).await? else {
            return Err(OrchestratorError::Orchestrator(format!("unknown job token '{token}'")));
        };

        if job.status == "completed" || job.status == "aborted" {
            return Ok(());
        }

        let mut report: Report = serde_json::from_value(job.report.clone())
            .unwrap_or_else(|_| Report::new("unknown", token, Value::Null));
        report.progress = Progress::aborted(reason, origin);
        let report_value = serde_json::to_value(&report).unwrap_or_default();
        models::finalize_job(db, token, "aborted", report.data.success, &report_value).await?;
        Ok(())
    }
}
