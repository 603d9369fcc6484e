//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `VALIDATION_PAYLOAD` adapter: validates object payload integrity and
//! format identification via the `integrity-bagit` and
//! `jhove-fido-mimetype-bagit` plugins.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{JobConfig, Record, Stage};

use super::{first_artifact, missing_input, AdapterSettings, StageAdapter, SubmissionToken, UpdateHook};

const PAYLOAD_VALIDATION_PLUGINS: [&str; 2] = ["integrity-bagit", "jhove-fido-mimetype-bagit"];

pub struct ValidationPayloadAdapter {
    client: reqwest::Client,
    settings: AdapterSettings,
}

impl ValidationPayloadAdapter {
    pub fn new(client: reqwest::Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl StageAdapter for ValidationPayloadAdapter {
    fn stage(&self) -> Stage {
        Stage::ValidationPayload
    }

    fn build_request_body(&self, _job_config: &JobConfig, record: &Record) -> Result<Value> {
        let artifact = first_artifact(record, &[Stage::BuildIp, Stage::ImportIps])
            .ok_or_else(|| missing_input(self.stage(), "no artifact from BUILD_IP/IMPORT_IPS"))?;

        Ok(json!({
            "validation": {
                "target": { "path": artifact },
                "modules": PAYLOAD_VALIDATION_PLUGINS,
            }
        }))
    }

    async fn submit(&self, request_body: Value, token: &str) -> Result<SubmissionToken> {
        super::http_client::submit(
            &self.client,
            &self.settings,
            self.stage(),
            "validate",
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

    fn success(&self, report: &Value) -> bool {
        report
            .get("data")
            .and_then(|d| d.get("valid"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn eval(&self, _record: &mut Record, _report: &Value) {}
}
