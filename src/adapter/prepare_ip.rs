//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `PREPARE_IP` adapter: stages bag-info and signature-properties
//! operations ahead of SIP construction.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{JobConfig, Record, Stage};

use super::{first_artifact, missing_input, AdapterSettings, StageAdapter, SubmissionToken, UpdateHook};

const BITSTREAM_OPERATION: &str = "Preservation-Level";

pub struct PrepareIpAdapter {
    client: reqwest::Client,
    settings: AdapterSettings,
}

impl PrepareIpAdapter {
    pub fn new(client: reqwest::Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl StageAdapter for PrepareIpAdapter {
    fn stage(&self) -> Stage {
        Stage::PrepareIp
    }

    fn build_request_body(&self, job_config: &JobConfig, record: &Record) -> Result<Value> {
        let artifact = first_artifact(record, &[Stage::BuildIp, Stage::ImportIps])
            .ok_or_else(|| missing_input(self.stage(), "no artifact from BUILD_IP/IMPORT_IPS"))?;

        let data_processing = job_config.data_processing.as_ref();
        let mut bag_info_operations: Vec<Value> = data_processing
            .and_then(|dp| dp.get("rightsOperations"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        bag_info_operations.extend(
            data_processing
                .and_then(|dp| dp.get("preservationOperations"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        );

        if record.bitstream {
            bag_info_operations.push(json!({
                "type": "set",
                "targetField": BITSTREAM_OPERATION,
                "value": "Bitstream",
            }));
        }

        let sig_prop_operations = data_processing
            .and_then(|dp| dp.get("sigPropOperations"))
            .cloned()
            .unwrap_or_else(|| json!([]));

        Ok(json!({
            "preparation": {
                "target": { "path": artifact },
                "bagInfoOperations": bag_info_operations,
                "sigPropOperations": sig_prop_operations,
            }
        }))
    }

    async fn submit(&self, request_body: Value, token: &str) -> Result<SubmissionToken> {
        super::http_client::submit(
            &self.client,
            &self.settings,
            self.stage(),
            "prepare",
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
        let path = report.get("data").and_then(|d| d.get("path")).and_then(Value::as_str);
        let entry = record
            .stages
            .entry(self.stage())
            .or_insert_with(|| crate::model::RecordStageInfo::default());
        entry.artifact = path.map(str::to_string);
    }
}
