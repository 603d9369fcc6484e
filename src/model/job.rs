//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `JobConfig`, `JobContext` (submission-level), and the template types they
//! carry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::archive::ArchiveConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Onetime,
    Test,
}

/// Template type: chooses which import stage a job enters at and how its
/// `build_request_body` is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    Plugin,
    Oai,
    Hotfolder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "type")]
    pub kind: TemplateType,
    #[serde(default, rename = "additionalInformation")]
    pub additional_information: Value,
}

/// Submission-level execution context (spec §3 `JobContext`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    #[serde(default, rename = "userTriggered")]
    pub user_triggered: Option<String>,
    #[serde(rename = "datetimeTriggered")]
    pub datetime_triggered: DateTime<Utc>,
    #[serde(rename = "triggerType")]
    pub trigger_type: TriggerType,
    /// Seconds an artifact remains valid for resume purposes.
    #[serde(rename = "artifactsTtl")]
    pub artifacts_ttl: Option<i64>,
    /// Notified with the final report on both success and failure (spec §6
    /// `POST /process` body field `callbackUrl`).
    #[serde(default, rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

impl JobContext {
    /// `trigger_type = test` suppresses durable record creation.
    pub fn is_test_trigger(&self) -> bool {
        matches!(self.trigger_type, TriggerType::Test)
    }
}

/// Job configuration: the serializable submission plus runtime-populated
/// fields filled in by the Job Collector once the template is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub id: String,
    #[serde(default, rename = "testMode")]
    pub test_mode: bool,
    #[serde(default = "default_true")]
    pub resume: bool,

    #[serde(skip)]
    pub template: Option<Template>,
    #[serde(skip)]
    pub data_selection: Option<Value>,
    #[serde(skip)]
    pub data_processing: Option<Value>,
    #[serde(skip)]
    pub archives: HashMap<String, ArchiveConfiguration>,
    #[serde(skip)]
    pub default_target_archive_id: Option<String>,
    #[serde(skip)]
    pub execution_context: Option<JobContext>,
}

fn default_true() -> bool {
    true
}

impl JobConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            test_mode: false,
            resume: true,
            template: None,
            data_selection: None,
            data_processing: None,
            archives: HashMap::new(),
            default_target_archive_id: None,
            execution_context: None,
        }
    }

    /// Resolves the archive id to use for TRANSFER/INGEST/IE-linking:
    /// the template's `target_archive` if set, else the configured default.
    pub fn resolve_archive_id(&self) -> Option<&str> {
        self.template
            .as_ref()
            .and_then(|t| t.additional_information.get("targetArchive"))
            .and_then(|v| v.as_str())
            .or(self.default_target_archive_id.as_deref())
    }

    pub fn archive(&self, id: &str) -> Option<&ArchiveConfiguration> {
        self.archives.get(id)
    }
}
