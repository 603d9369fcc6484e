//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Shared submit/poll/abort mechanics used by every per-stage adapter.
//!
//! Mirrors the downstream services' common shape: `POST <endpoint>` returns
//! `{"token": "..."}`, `GET /report?token=...` returns a report object whose
//! `progress.status` is one of `queued`/`running`/`completed`/`aborted`, and
//! `DELETE /process?token=...` requests cancellation.

use serde_json::{json, Value};
use tokio::time::Instant;

use crate::error::OrchestratorError;
use crate::model::Stage;

use super::{AdapterSettings, SubmissionToken, UpdateHook};

fn terminal(status: &str) -> bool {
    matches!(status, "completed" | "aborted")
}

fn progress_status(report: &Value) -> Option<&str> {
    report.get("progress")?.get("status")?.as_str()
}

/// Posts `body` (merged with the client-supplied idempotency `token`, per
/// spec §1 Non-goals) to `<base_url><endpoint>`, retrying transient failures
/// up to `settings.max_retries` times with `settings.retry_interval` between
/// attempts, and returns the token the downstream service assigned — per
/// spec §6 this is the `value` field of a `201 {value, expires, expires_at}`
/// response.
pub async fn submit(
    client: &reqwest::Client,
    settings: &AdapterSettings,
    stage: Stage,
    endpoint: &str,
    mut body: Value,
    token: &str,
) -> crate::error::Result<SubmissionToken> {
    if let Value::Object(map) = &mut body {
        map.insert("token".into(), json!(token));
    }

    let url = settings
        .base_url
        .join(endpoint)
        .map_err(|e| OrchestratorError::Orchestrator(e.to_string()))?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = client
            .post(url.clone())
            .timeout(settings.request_timeout)
            .json(&body)
            .send()
            .await;

        match outcome {
            Ok(resp) if resp.status().is_success() => {
                let payload: Value = resp
                    .json()
                    .await
                    .map_err(|e| OrchestratorError::Unreachable { stage, source: e })?;
                let assigned = payload
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or(token);
                return Ok(SubmissionToken(assigned.to_string()));
            }
            Ok(resp) if resp.status().is_client_error() => {
                let reason = resp.text().await.unwrap_or_default();
                return Err(OrchestratorError::Rejected { stage, reason });
            }
            Ok(_) | Err(_) if attempt <= settings.max_retries => {
                tokio::time::sleep(settings.retry_interval).await;
                continue;
            }
            Ok(resp) => {
                return Err(OrchestratorError::Rejected {
                    stage,
                    reason: format!("HTTP {}", resp.status()),
                });
            }
            Err(source) => return Err(OrchestratorError::Unreachable { stage, source }),
        }
    }
}

/// Polls `GET /report?token=...` every `settings.poll_interval` until
/// terminal or `settings.poll_timeout` elapses, calling `update_hook` after
/// every tick.
pub async fn poll(
    client: &reqwest::Client,
    settings: &AdapterSettings,
    stage: Stage,
    token: &SubmissionToken,
    mut update_hook: UpdateHook<'_>,
) -> crate::error::Result<Value> {
    let url = settings
        .base_url
        .join("report")
        .map_err(|e| OrchestratorError::Orchestrator(e.to_string()))?;
    let deadline = Instant::now() + settings.poll_timeout;

    loop {
        let resp = client
            .get(url.clone())
            .query(&[("token", token.0.as_str())])
            .timeout(settings.request_timeout)
            .send()
            .await
            .map_err(|source| OrchestratorError::Unreachable { stage, source })?;

        let report: Value = resp
            .json()
            .await
            .map_err(|source| OrchestratorError::Unreachable { stage, source })?;

        update_hook(&report);

        if progress_status(&report).map(terminal).unwrap_or(false) {
            return Ok(report);
        }

        if Instant::now() >= deadline {
            return Err(OrchestratorError::Timeout {
                stage,
                elapsed: settings.poll_timeout,
            });
        }

        tokio::time::sleep(settings.poll_interval).await;
    }
}

/// Issues `DELETE /process?token=...`. Safe to call while a `poll` of the
/// same token is in flight elsewhere: the downstream service owns
/// serialization of the two.
pub async fn abort(
    client: &reqwest::Client,
    settings: &AdapterSettings,
    stage: Stage,
    token: &SubmissionToken,
    reason: &str,
    origin: &str,
) -> crate::error::Result<()> {
    let url = settings
        .base_url
        .join("process")
        .map_err(|e| OrchestratorError::Orchestrator(e.to_string()))?;

    client
        .delete(url)
        .query(&[("token", token.0.as_str())])
        .json(&json!({ "origin": origin, "reason": reason }))
        .timeout(settings.request_timeout)
        .send()
        .await
        .map_err(|source| OrchestratorError::Unreachable { stage, source })?;

    Ok(())
}

/// Single best-effort `GET /report?token=...`, used by an abort callback to
/// capture the downstream's final state after cancellation. Unlike [`poll`]
/// this never retries or waits for a terminal status: any failure is
/// swallowed and reported as `None`, since the job is already tearing down.
pub async fn fetch_report(
    client: &reqwest::Client,
    settings: &AdapterSettings,
    _stage: Stage,
    token: &SubmissionToken,
) -> Option<Value> {
    let url = settings.base_url.join("report").ok()?;
    let resp = client
        .get(url)
        .query(&[("token", token.0.as_str())])
        .timeout(settings.request_timeout)
        .send()
        .await
        .ok()?;
    resp.json().await.ok()
}
