//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Row structs and queries for the tables this service owns (spec §6
//! "Persistence layout"): `jobs`, `records`, `ies`, `artifacts`.
//!
//! Every record's persistence is committed independently of its siblings
//! (spec §5 "Shared resource policy") — no transaction spans a whole job.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::model::{Stage, Template, TemplateType};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub token: Uuid,
    pub status: String,
    pub job_config_id: String,
    pub user_triggered: Option<String>,
    pub datetime_triggered: DateTime<Utc>,
    pub trigger_type: String,
    pub success: Option<bool>,
    pub datetime_started: Option<DateTime<Utc>>,
    pub datetime_ended: Option<DateTime<Utc>>,
    pub datetime_artifacts_expire: Option<DateTime<Utc>>,
    pub report: Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecordRow {
    pub id: String,
    pub job_config_id: String,
    pub job_token: Uuid,
    pub status: String,
    pub datetime_changed: Option<DateTime<Utc>>,
    pub import_type: Option<String>,
    pub oai_identifier: Option<String>,
    pub oai_datestamp: Option<String>,
    pub hotfolder_original_path: Option<String>,
    pub archive_ie_id: Option<String>,
    pub archive_sip_id: Option<String>,
    pub ie_id: Option<Uuid>,
    pub bitstream: bool,
    pub skip_object_validation: bool,
    pub report_id: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IeRow {
    pub id: Uuid,
    pub job_config_id: String,
    pub source_organization: Option<String>,
    pub origin_system_id: String,
    pub external_id: String,
    pub archive_id: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct JobConfigRow {
    id: String,
    template_id: String,
    default_target_archive_id: Option<String>,
    data_selection: Option<Value>,
    data_processing: Option<Value>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TemplateRow {
    #[sqlx(rename = "type")]
    kind: String,
    additional_information: Value,
}

/// Resolved slice of an external `job_configs`/`templates` row, enough for
/// the Job Collector to populate a `JobConfig` (spec §4.1).
pub struct JobConfigResolution {
    pub default_target_archive_id: Option<String>,
    pub data_selection: Option<Value>,
    pub data_processing: Option<Value>,
    pub template: Template,
}

/// Looks up `job_config_id` and its template. Returns `None` if either row
/// is missing (an unknown submission id).
pub async fn load_job_config(pool: &PgPool, job_config_id: &str) -> sqlx::Result<Option<JobConfigResolution>> {
    let Some(config_row): Option<JobConfigRow> =
        sqlx::query_as("select * from job_configs where id = $1")
            .bind(job_config_id)
            .fetch_optional(pool)
            .await?
    else {
        return Ok(None);
    };

    let Some(template_row): Option<TemplateRow> =
        sqlx::query_as("select * from templates where id = $1")
            .bind(&config_row.template_id)
            .fetch_optional(pool)
            .await?
    else {
        return Ok(None);
    };

    let kind: TemplateType = serde_json::from_value(Value::String(template_row.kind))
        .unwrap_or(TemplateType::Plugin);

    Ok(Some(JobConfigResolution {
        default_target_archive_id: config_row.default_target_archive_id,
        data_selection: config_row.data_selection,
        data_processing: config_row.data_processing,
        template: Template {
            kind,
            additional_information: template_row.additional_information,
        },
    }))
}

/// Inserts the `jobs` row for a freshly accepted submission. Returns
/// `false` without writing anything if `token` is already present (spec
/// §6: a resubmitted token is "acknowledged without re-enqueuing").
pub async fn insert_job(
    pool: &PgPool,
    token: Uuid,
    job_config_id: &str,
    user_triggered: Option<&str>,
    datetime_triggered: DateTime<Utc>,
    trigger_type: &str,
    datetime_artifacts_expire: Option<DateTime<Utc>>,
    report: &Value,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "insert into jobs \
         (token, status, job_config_id, user_triggered, datetime_triggered, trigger_type, \
          datetime_artifacts_expire, report) \
         values ($1, 'queued', $2, $3, $4, $5, $6, $7) \
         on conflict (token) do nothing",
    )
    .bind(token)
    .bind(job_config_id)
    .bind(user_triggered)
    .bind(datetime_triggered)
    .bind(trigger_type)
    .bind(datetime_artifacts_expire)
    .bind(report)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn fetch_job(pool: &PgPool, token: Uuid) -> sqlx::Result<Option<JobRow>> {
    sqlx::query_as("select * from jobs where token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await
}

pub async fn mark_job_started(pool: &PgPool, token: Uuid) -> sqlx::Result<()> {
    sqlx::query("update jobs set status = 'running', datetime_started = now() where token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persists the live `Report` for `push()` (spec §5: pushes are serialized
/// by the caller's job-scoped mutex, not here — this is one UPDATE).
pub async fn update_job_report(pool: &PgPool, token: Uuid, report: &Value) -> sqlx::Result<()> {
    sqlx::query("update jobs set report = $2 where token = $1")
        .bind(token)
        .bind(report)
        .execute(pool)
        .await?;
    Ok(())
}

/// Finalizes a job row at the end of a run (Job Runner, Abort Hook).
pub async fn finalize_job(
    pool: &PgPool,
    token: Uuid,
    status: &str,
    success: Option<bool>,
    report: &Value,
) -> sqlx::Result<()> {
    sqlx::query(
        "update jobs set status = $2, success = $3, report = $4, datetime_ended = now() \
         where token = $1",
    )
    .bind(token)
    .bind(status)
    .bind(success)
    .bind(report)
    .execute(pool)
    .await?;
    Ok(())
}

/// Extends `jobs.datetime_artifacts_expire` to `new_expiry`, but only if
/// the row's current value is still in the future (spec §4.7 resume
/// phase). Returns whether the row was still live.
pub async fn extend_job_artifact_expiry(
    pool: &PgPool,
    token: Uuid,
    new_expiry: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "update jobs set datetime_artifacts_expire = $2 \
         where token = $1 and datetime_artifacts_expire > now()",
    )
    .bind(token)
    .bind(new_expiry)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Records with `status = in-process` for `job_config_id` (spec §4.7
/// resume phase candidate selection).
pub async fn select_inprocess_records(
    pool: &PgPool,
    job_config_id: &str,
) -> sqlx::Result<Vec<RecordRow>> {
    sqlx::query_as("select * from records where job_config_id = $1 and status = 'in-process'")
        .bind(job_config_id)
        .fetch_all(pool)
        .await
}

pub async fn insert_record(
    pool: &PgPool,
    id: &str,
    job_config_id: &str,
    job_token: Uuid,
    status: &str,
    import_type: Option<&str>,
    oai_identifier: Option<&str>,
    oai_datestamp: Option<&str>,
    hotfolder_original_path: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        "insert into records \
         (id, job_config_id, job_token, status, datetime_changed, import_type, oai_identifier, \
          oai_datestamp, hotfolder_original_path) \
         values ($1, $2, $3, $4, now(), $5, $6, $7, $8) \
         on conflict (id) do update set \
           job_token = excluded.job_token, status = excluded.status, datetime_changed = now()",
    )
    .bind(id)
    .bind(job_config_id)
    .bind(job_token)
    .bind(status)
    .bind(import_type)
    .bind(oai_identifier)
    .bind(oai_datestamp)
    .bind(hotfolder_original_path)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_record_status(pool: &PgPool, id: &str, status: &str) -> sqlx::Result<()> {
    sqlx::query("update records set status = $2, datetime_changed = now() where id = $1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

/// Re-points a resumed record at the current job (spec §4.7 resume phase,
/// last step for resumable survivors).
pub async fn repoint_record_job(pool: &PgPool, id: &str, job_token: Uuid) -> sqlx::Result<()> {
    sqlx::query("update records set job_token = $2, datetime_changed = now() where id = $1")
        .bind(id)
        .bind(job_token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Post-stage for `INGEST`: `{archive_ie_id, archive_sip_id}` (spec §4.5).
pub async fn update_record_archive_ids(
    pool: &PgPool,
    id: &str,
    archive_ie_id: Option<&str>,
    archive_sip_id: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        "update records set archive_ie_id = $2, archive_sip_id = $3, datetime_changed = now() \
         where id = $1",
    )
    .bind(id)
    .bind(archive_ie_id)
    .bind(archive_sip_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// IE linking step 5 (spec §4.6): `{ie_id, datetime_changed}`.
pub async fn update_record_ie(pool: &PgPool, id: &str, ie_id: Uuid) -> sqlx::Result<()> {
    sqlx::query("update records set ie_id = $2, datetime_changed = now() where id = $1")
        .bind(id)
        .bind(ie_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find_ie(
    pool: &PgPool,
    job_config_id: &str,
    origin_system_id: &str,
    external_id: &str,
    archive_id: &str,
) -> sqlx::Result<Option<IeRow>> {
    sqlx::query_as(
        "select * from ies where job_config_id = $1 and origin_system_id = $2 \
         and external_id = $3 and archive_id = $4",
    )
    .bind(job_config_id)
    .bind(origin_system_id)
    .bind(external_id)
    .bind(archive_id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_ie(
    pool: &PgPool,
    job_config_id: &str,
    source_organization: Option<&str>,
    origin_system_id: &str,
    external_id: &str,
    archive_id: &str,
) -> sqlx::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "insert into ies (id, job_config_id, source_organization, origin_system_id, \
         external_id, archive_id) values ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(job_config_id)
    .bind(source_organization)
    .bind(origin_system_id)
    .bind(external_id)
    .bind(archive_id)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn update_ie_source_organization(
    pool: &PgPool,
    id: Uuid,
    source_organization: &str,
) -> sqlx::Result<()> {
    sqlx::query("update ies set source_organization = $2 where id = $1")
        .bind(id)
        .bind(source_organization)
        .execute(pool)
        .await?;
    Ok(())
}

/// Producer-stage post-stage artifact row (spec §4.5); `expires` is
/// `None` when `artifacts_ttl` is unset.
pub async fn insert_artifact(
    pool: &PgPool,
    path: &str,
    record_id: &str,
    stage: Stage,
    expires: Option<DateTime<Utc>>,
) -> sqlx::Result<()> {
    sqlx::query(
        "insert into artifacts (id, path, record_id, stage, datetime_expires) \
         values ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(path)
    .bind(record_id)
    .bind(stage.identifier())
    .bind(expires)
    .execute(pool)
    .await?;
    Ok(())
}

/// Extends every artifact of `record_id` whose expiry is still in the
/// future to `new_expiry` (spec §4.7 resume phase).
pub async fn extend_artifact_expiry(
    pool: &PgPool,
    record_id: &str,
    new_expiry: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        "update artifacts set datetime_expires = $2 \
         where record_id = $1 and datetime_expires > now()",
    )
    .bind(record_id)
    .bind(new_expiry)
    .execute(pool)
    .await?;
    Ok(())
}
