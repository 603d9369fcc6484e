//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `IMPORT_IES` adapter: imports a batch of Intellectual Entities from an
//! OAI-PMH endpoint, a plugin, or (indirectly, via `IMPORT_IPS`) a hotfolder.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{JobConfig, Record, Stage, TemplateType};

use super::{missing_input, AdapterSettings, StageAdapter, SubmissionToken, UpdateHook};

pub struct ImportIesAdapter {
    client: reqwest::Client,
    settings: AdapterSettings,
}

impl ImportIesAdapter {
    pub fn new(client: reqwest::Client, settings: AdapterSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl StageAdapter for ImportIesAdapter {
    fn stage(&self) -> Stage {
        Stage::ImportIes
    }

    fn build_request_body(&self, job_config: &JobConfig, _record: &Record) -> Result<Value> {
        let template = job_config.template.as_ref().ok_or_else(|| {
            missing_input(self.stage(), "job config has no resolved template")
        })?;

        let mut import = serde_json::Map::new();
        match template.kind {
            TemplateType::Plugin => {
                let plugin = template
                    .additional_information
                    .get("plugin")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        missing_input(self.stage(), "template is missing 'plugin'")
                    })?;
                import.insert("plugin".into(), json!(plugin));
                import.insert(
                    "args".into(),
                    template
                        .additional_information
                        .get("args")
                        .cloned()
                        .unwrap_or_else(|| json!({})),
                );
            }
            TemplateType::Oai => {
                let info = &template.additional_information;
                let mut args = serde_json::Map::new();
                args.insert("base_url".into(), info.get("url").cloned().unwrap_or(Value::Null));
                args.insert(
                    "metadata_prefix".into(),
                    info.get("metadata_prefix").cloned().unwrap_or(Value::Null),
                );
                if let Some(filters) = info.get("transfer_url_filters") {
                    args.insert("transfer_url_info".into(), filters.clone());
                }
                if let Some(selection) = &job_config.data_selection {
                    if let Some(sets) = selection.get("sets") {
                        args.insert("set_spec".into(), sets.clone());
                    }
                    if let Some(from) = selection.get("from") {
                        args.insert("from_".into(), from.clone());
                    }
                    if let Some(until) = selection.get("until") {
                        args.insert("until".into(), until.clone());
                    }
                    if let Some(identifiers) = selection.get("identifiers") {
                        args.insert("identifiers".into(), identifiers.clone());
                    }
                }
                import.insert("plugin".into(), json!("oai_pmh_v2"));
                import.insert("args".into(), Value::Object(args));
                import.insert("jobConfigId".into(), json!(job_config.id));
            }
            TemplateType::Hotfolder => {
                return Err(missing_input(
                    self.stage(),
                    "hotfolder templates enter via IMPORT_IPS, not IMPORT_IES",
                ));
            }
        }

        if let Some(args) = import.get_mut("args") {
            if let Value::Object(map) = args {
                map.insert("test".into(), json!(job_config.test_mode));
            }
        }

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

    /// Never invoked: import returns a batch of records, not a single
    /// record's facts. The Job Collector reads `report.data.records` itself.
    fn eval(&self, _record: &mut Record, _report: &Value) {
        unreachable!("eval is not called for the import stages; see orchestrator::collector")
    }
}
