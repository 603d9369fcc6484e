//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `BUILD_SIP` adapter: assembles the archive-ready Submission Information
//! Package.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{JobConfig, Record, Stage};

use super::{first_artifact, missing_input, AdapterSettings, StageAdapter, SubmissionToken, UpdateHook};

pub struct BuildSipAdapter {
    client: reqwest::Client,
    settings: AdapterSettings,
}

impl BuildSipAdapter {
    pub fn new(client: reqwest::Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl StageAdapter for BuildSipAdapter {
    fn stage(&self) -> Stage {
        Stage::BuildSip
    }

    fn build_request_body(&self, _job_config: &JobConfig, record: &Record) -> Result<Value> {
        let artifact = first_artifact(
            record,
            &[Stage::PrepareIp, Stage::BuildIp, Stage::ImportIps],
        )
        .ok_or_else(|| missing_input(self.stage(), "no artifact from PREPARE_IP/BUILD_IP/IMPORT_IPS"))?;

        Ok(json!({ "build": { "target": { "path": artifact } } }))
    }

    async fn submit(&self, request_body: Value, token: &str) -> Result<SubmissionToken> {
        super::http_client::submit(&self.client, &self.settings, self.stage(), "build", request_body, token)
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
        let path = report.get("data").and_then(|d| d.get("path")).and_then(Value::as_str);
        let entry = record
            .stages
            .entry(self.stage())
            .or_insert_with(|| crate::model::RecordStageInfo::default());
        entry.artifact = path.map(str::to_string);
    }
}
