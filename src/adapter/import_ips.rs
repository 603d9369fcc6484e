//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `IMPORT_IPS` adapter: imports a batch of pre-built Information Packages
//! from a hotfolder.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{JobConfig, Record, Stage};

use super::{missing_input, AdapterSettings, StageAdapter, SubmissionToken, UpdateHook};

pub struct ImportIpsAdapter {
    client: reqwest::Client,
    settings: AdapterSettings,
}

impl ImportIpsAdapter {
    pub fn new(client: reqwest::Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl StageAdapter for ImportIpsAdapter {
    fn stage(&self) -> Stage {
        Stage::ImportIps
    }

    fn build_request_body(&self, job_config: &JobConfig, _record: &Record) -> Result<Value> {
        let template = job_config.template.as_ref().ok_or_else(|| {
            missing_input(self.stage(), "job config has no resolved template")
        })?;
        let source_id = template
            .additional_information
            .get("source_id")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_input(self.stage(), "template is missing hotfolder id"))?;
        let path = job_config
            .data_selection
            .as_ref()
            .and_then(|sel| sel.get("path"))
            .and_then(Value::as_str)
            .ok_or_else(|| missing_input(self.stage(), "missing target path in hotfolder"))?;

        let mut import = serde_json::Map::new();
        import.insert(
            "target".into(),
            json!({ "hotfolderId": source_id, "path": path }),
        );
        import.insert("test".into(), json!(job_config.test_mode));

        let mut body = serde_json::Map::new();
        body.insert("import".into(), Value::Object(import));
        Ok(Value::Object(body))
    }

    async fn submit(&self, request_body: Value, token: &str) -> Result<SubmissionToken> {
        super::http_client::submit(
            &self.client,
            &self.settings,
            self.stage(),
            "import",
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

    fn eval(&self, _record: &mut Record, _report: &Value) {
        unreachable!("eval is not called for the import stages; see orchestrator::collector")
    }
}
