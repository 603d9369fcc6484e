//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Stage Adapter: a uniform façade over one downstream service.
//!
//! Each stage of the pipeline has exactly one concrete adapter. Adapters are
//! intentionally thin: they build a request body, submit it, poll the
//! downstream service to a terminal report, support cancellation, and read
//! the stage-specific facts back out of that report into the `Record`. The
//! HTTP mechanics shared by every adapter live in [`http_client`]; the
//! per-stage specifics live in the sibling modules.

pub mod build_ip;
pub mod build_sip;
pub mod http_client;
pub mod import_ies;
pub mod import_ips;
pub mod ingest;
pub mod prepare_ip;
pub mod registry;
pub mod transfer;
pub mod validation_metadata;
pub mod validation_payload;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{OrchestratorError, Result};
use crate::model::{JobConfig, Record, Stage};

/// Polling/resilience knobs an adapter applies to its own downstream calls.
/// One instance per configured downstream service (see `config::AdapterConfig`).
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub base_url: reqwest::Url,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_interval: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

/// A single downstream submission in flight: the token the service assigned
/// and its own base url, so `poll`/`abort` can address it directly.
#[derive(Debug, Clone)]
pub struct SubmissionToken(pub String);

/// Called once after every poll tick so the caller can push an in-memory
/// progress snapshot without touching the database (Stage Runner step 5).
pub type UpdateHook<'a> = Box<dyn FnMut(&Value) + Send + 'a>;

/// Result of an abort callback's best-effort fetch of the downstream's final
/// report, once cancellation has been requested.
pub type AbortFuture = Pin<Box<dyn Future<Output = Option<Value>> + Send>>;

/// A self-contained abort closure (spec §9 "Parallelism abstraction"):
/// captures only owned values (URL, token, timeouts, retry policy) so it can
/// outlive the stage task that registered it and be invoked from the Abort
/// Hook without any reference back into the adapter or its pooled client.
pub type AbortCallback = Box<dyn Fn(String, String) -> AbortFuture + Send + Sync>;

/// Uniform façade over one downstream service, one instance per `Stage`.
///
/// Implementations are expected to be cheap to clone (an `Arc` around a
/// pooled `reqwest::Client` and a resolved `AdapterSettings`) since the
/// Adapter Registry hands out shared references to every concurrent Record
/// Runner task.
#[async_trait]
pub trait StageAdapter: Send + Sync {
    fn stage(&self) -> Stage;

    /// Deterministic construction of the downstream request body. Pulls the
    /// target artifact from the most recent predecessor stage, merges
    /// template/data-processing arguments, and carries over a previously
    /// assigned `token` from the record (resume).
    fn build_request_body(&self, job_config: &JobConfig, record: &Record) -> Result<Value>;

    /// One HTTP submission. Honors `request_timeout`/`max_retries`/
    /// `retry_interval` internally. `token` is the client-supplied
    /// idempotency token the Stage Runner allocated for this dispatch
    /// (spec §4.4 step 1); the downstream service is expected to adopt it
    /// as its own submission identifier (spec §1 Non-goals: "downstream
    /// services are themselves idempotent under a client-supplied token").
    async fn submit(&self, request_body: Value, token: &str) -> Result<SubmissionToken>;

    /// Polls the downstream `GET /report` every `poll_interval` until the
    /// report's `progress.status` is terminal or `poll_timeout` elapses,
    /// invoking `update_hook` after every tick.
    async fn poll(&self, token: &SubmissionToken, update_hook: UpdateHook<'_>) -> Result<Value>;

    /// Requests downstream cancellation. Safe to call concurrently with an
    /// in-flight `poll` of the same token.
    async fn abort(&self, token: &SubmissionToken, reason: &str, origin: &str) -> Result<()>;

    /// This adapter's resolved HTTP settings, exposed so the default
    /// `abort_callback` can build a self-contained closure.
    fn settings(&self) -> &AdapterSettings;

    /// Builds a self-contained abort closure for `token`: fresh
    /// `reqwest::Client`, settings captured by value. Invoked by the Abort
    /// Hook (spec §4.9) without any reference to this adapter instance or
    /// its pooled client.
    fn abort_callback(&self, token: SubmissionToken) -> AbortCallback {
        let settings = self.settings().clone();
        let stage = self.stage();
        Box::new(move |reason: String, origin: String| {
            let settings = settings.clone();
            let token = token.clone();
            Box::pin(async move {
                let client = reqwest::Client::new();
                let _ = http_client::abort(&client, &settings, stage, &token, &reason, &origin).await;
                http_client::fetch_report(&client, &settings, stage, &token).await
            })
        })
    }

    /// Stage-specific truth of success. Defaults to `report.data.success`;
    /// validation stages override to read `report.data.valid`.
    fn success(&self, report: &Value) -> bool {
        report
            .get("data")
            .and_then(|d| d.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Writes stage-specific facts from a terminal report into the record.
    /// Not called for the import stages (the Job Collector reads
    /// `report.data.records` directly instead, see `orchestrator::collector`).
    fn eval(&self, record: &mut Record, report: &Value);
}

/// Reads `record.artifact_from(stage)` for each candidate predecessor in
/// order, returning the first present artifact. Shared by every adapter
/// whose input may come from one of several upstream producer stages.
pub(crate) fn first_artifact<'a>(record: &'a Record, candidates: &[Stage]) -> Option<&'a str> {
    candidates.iter().find_map(|s| record.artifact_from(*s))
}

pub(crate) fn missing_input(stage: Stage, reason: impl Into<String>) -> OrchestratorError {
    OrchestratorError::MissingInput {
        stage,
        reason: reason.into(),
    }
}
