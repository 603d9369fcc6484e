//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Handler bodies for the three endpoints. Business logic (record
//! collection, dispatch, cancellation) lives entirely in `orchestrator::*`;
//! these functions only shape requests/responses around it (spec §1
//! "HTTP request routing ... out of scope", kept thin per SPEC_FULL.md
//! "HTTP surface").

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models;
use crate::model::{JobConfig, JobContext, Report, TriggerType};

use super::dto::{AbortRequest, ContextBody, ProcessRequest, TokenQuery};
use super::error::AppError;
use super::AppState;

/// `POST /process` (spec §6). Resolves the referenced job config/template,
/// creates the durable job row, and hands the job to the worker pool.
/// Resubmitting an already-known `token` is acknowledged without
/// re-enqueuing.
pub async fn submit_process(
    State(state): State<AppState>,
    Json(body): Json<ProcessRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let token = body.token.unwrap_or_else(Uuid::new_v4);

    if models::fetch_job(&state.db, token).await?.is_some() {
        return Ok((StatusCode::CREATED, Json(json!({ "value": token }))));
    }

    let resolution = models::load_job_config(&state.db, &body.process.id)
        .await?
        .ok_or_else(|| AppError::bad_request(format!("unknown job config '{}'", body.process.id)))?;

    let context_body = body.context.clone().unwrap_or_default();
    let job_context = to_job_context(&context_body, body.callback_url.clone());

    let mut job_config = JobConfig::new(body.process.id.clone());
    job_config.test_mode = body.process.test_mode.unwrap_or(false);
    job_config.resume = body.process.resume.unwrap_or(true);
    job_config.template = Some(resolution.template);
    job_config.data_selection = resolution.data_selection;
    job_config.data_processing = resolution.data_processing;
    job_config.archives = state.config.archives.clone();
    job_config.default_target_archive_id = resolution
        .default_target_archive_id
        .or_else(|| state.config.default_target_archive_id.clone());
    job_config.execution_context = Some(job_context.clone());

    let args = serde_json::to_value(&body).unwrap_or(Value::Null);
    let report = Report::new(state.host.clone(), token, args);

    let datetime_artifacts_expire = job_context
        .artifacts_ttl
        .map(|ttl| Utc::now() + chrono::Duration::seconds(ttl));

    models::insert_job(
        &state.db,
        token,
        &job_config.id,
        job_context.user_triggered.as_deref(),
        job_context.datetime_triggered,
        trigger_type_str(job_context.trigger_type),
        datetime_artifacts_expire,
        &serde_json::to_value(&report).unwrap_or(Value::Null),
    )
    .await?;

    state.worker_pool.submit(Arc::new(job_config), report);

    Ok((StatusCode::CREATED, Json(json!({ "value": token }))))
}

fn to_job_context(body: &ContextBody, callback_url: Option<String>) -> JobContext {
    JobContext {
        user_triggered: body.user_triggered.clone(),
        datetime_triggered: body.datetime_triggered.unwrap_or_else(Utc::now),
        trigger_type: body.trigger_type.unwrap_or(TriggerType::Manual),
        artifacts_ttl: body.artifacts_ttl,
        callback_url,
    }
}

fn trigger_type_str(trigger_type: TriggerType) -> &'static str {
    match trigger_type {
        TriggerType::Manual => "manual",
        TriggerType::Scheduled => "scheduled",
        TriggerType::Onetime => "onetime",
        TriggerType::Test => "test",
    }
}

/// `GET /report?token=...` (spec §6). Prefers the live in-memory report of
/// a job still tracked by the worker pool; falls back to the last-pushed
/// database row for a job that has already drained.
pub async fn get_report(
    State(state): State<AppState>,
    Query(params): Query<TokenQuery>,
) -> Result<Json<Value>, AppError> {
    if let Some(report) = state.worker_pool.snapshot(params.token) {
        return Ok(Json(serde_json::to_value(&report).unwrap_or(Value::Null)));
    }

    let job = models::fetch_job(&state.db, params.token)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("unknown job token '{}'", params.token)))?;

    Ok(Json(job.report))
}

/// `DELETE /process?token=...` (spec §6). Synchronous w.r.t. the database
/// finalization: by the time this returns, `jobs.status` already reflects
/// the abort.
pub async fn abort_process(
    State(state): State<AppState>,
    Query(params): Query<TokenQuery>,
    Json(body): Json<AbortRequest>,
) -> Result<String, AppError> {
    state
        .worker_pool
        .abort(params.token, &body.reason, &body.origin)
        .await?;
    Ok(format!("aborted job '{}'", params.token))
}
