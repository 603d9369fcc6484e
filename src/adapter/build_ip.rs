//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `BUILD_IP` adapter: turns an imported IE into an Information Package.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{JobConfig, Record, Stage};

use super::{first_artifact, missing_input, AdapterSettings, StageAdapter, SubmissionToken, UpdateHook};

pub struct BuildIpAdapter {
    client: reqwest::Client,
    settings: AdapterSettings,
}

impl BuildIpAdapter {
    pub fn new(client: reqwest::Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl StageAdapter for BuildIpAdapter {
    fn stage(&self) -> Stage {
        Stage::BuildIp
    }

    fn build_request_body(&self, job_config: &JobConfig, record: &Record) -> Result<Value> {
        let artifact = first_artifact(record, &[Stage::ImportIes])
            .ok_or_else(|| missing_input(self.stage(), "no artifact from IMPORT_IES"))?;

        let mut build = serde_json::Map::new();
        build.insert("target".into(), json!({ "path": artifact }));
        build.insert("validate".into(), json!(false));

        if let Some(mapping) = job_config
            .data_processing
            .as_ref()
            .and_then(|dp| dp.get("mapping"))
        {
            build.insert("mappingPlugin".into(), mapping.clone());
        }

        let mut body = serde_json::Map::new();
        body.insert("build".into(), Value::Object(build));
        Ok(Value::Object(body))
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
