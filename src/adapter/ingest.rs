//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `INGEST` adapter: deposits the transferred SIP into the archive system
//! and records the archive's own identifiers for the ingested IE/SIP.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{ArchiveApi, JobConfig, Record, Stage};

use super::{first_artifact, missing_input, AdapterSettings, StageAdapter, SubmissionToken, UpdateHook};

pub struct IngestAdapter {
    client: reqwest::Client,
    settings: AdapterSettings,
}

impl IngestAdapter {
    pub fn new(client: reqwest::Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl StageAdapter for IngestAdapter {
    fn stage(&self) -> Stage {
        Stage::Ingest
    }

    fn build_request_body(&self, job_config: &JobConfig, record: &Record) -> Result<Value> {
        let artifact = first_artifact(record, &[Stage::Transfer])
            .ok_or_else(|| missing_input(self.stage(), "no artifact from TRANSFER"))?;

        let archive_id = job_config
            .resolve_archive_id()
            .ok_or_else(|| missing_input(self.stage(), "no target archive resolvable"))?;
        let archive = job_config
            .archive(archive_id)
            .ok_or_else(|| missing_input(self.stage(), format!("unknown archive '{archive_id}'")))?;

        let ingest = match archive.kind {
            ArchiveApi::RosettaRestV0 => json!({
                "rosetta": { "subdir": artifact }
            }),
        };

        Ok(json!({ "ingest": ingest }))
    }

    async fn submit(&self, request_body: Value, token: &str) -> Result<SubmissionToken> {
        super::http_client::submit(
            &self.client,
            &self.settings,
            self.stage(),
            "ingest",
            request_body,
            token,
        )
        .await
    }

    async fn poll(&self, token: &SubmissionToken, update_hook: UpdateHook<'_>) -> Result<Value> {
        super::http_client::poll(&self.client, &self.settings, self.stage(), token, update_hook)
            .await
    }

    async fn abort(&self, token: &SubmissionToken, reason: &str, origin: &str) -> Result<()> {
        super::http_client::abort(&self.client, &self.settings, self.stage(), token, reason, origin)
            .await
    }

    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn eval(&self, record: &mut Record, report: &Value) {
        let details = report.get("data").and_then(|d| d.get("details"));

        record.archive_sip_id = details
            .and_then(|d| d.get("deposit"))
            .and_then(|d| d.get("sip_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        record.archive_ie_id = details
            .and_then(|d| d.get("sip"))
            .and_then(|d| d.get("iePids"))
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(Value::as_str)
            .map(str::to_string);
    }
}
