//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `TRANSFER` adapter: ships the built SIP to the resolved archive's
//! transfer destination.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{JobConfig, Record, Stage};

use super::{first_artifact, missing_input, AdapterSettings, StageAdapter, SubmissionToken, UpdateHook};

pub struct TransferAdapter {
    client: reqwest::Client,
    settings: AdapterSettings,
}

impl TransferAdapter {
    pub fn new(client: reqwest::Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl StageAdapter for TransferAdapter {
    fn stage(&self) -> Stage {
        Stage::Transfer
    }

    fn build_request_body(&self, job_config: &JobConfig, record: &Record) -> Result<Value> {
        let artifact = first_artifact(record, &[Stage::BuildSip])
            .ok_or_else(|| missing_input(self.stage(), "no artifact from BUILD_SIP"))?;

        let archive_id = job_config
            .resolve_archive_id()
            .ok_or_else(|| missing_input(self.stage(), "no target archive resolvable"))?;
        let archive = job_config
            .archive(archive_id)
            .ok_or_else(|| missing_input(self.stage(), format!("unknown archive '{archive_id}'")))?;

        Ok(json!({
            "transfer": {
                "target": { "path": artifact },
                "destinationId": archive.transfer_destination_id,
            }
        }))
    }

    async fn submit(&self, request_body: Value, token: &str) -> Result<SubmissionToken> {
        super::http_client::submit(
            &self.client,
            &self.settings,
            self.stage(),
            "transfer",
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
        let target_path = report
            .get("args")
            .and_then(|a| a.get("transfer"))
            .and_then(|t| t.get("target"))
            .and_then(|t| t.get("path"))
            .and_then(Value::as_str);

        let basename = target_path
            .map(Path::new)
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map(str::to_string);

        let entry = record
            .stages
            .entry(self.stage())
            .or_insert_with(|| crate::model::RecordStageInfo::default());
        entry.artifact = basename;
    }
}
