//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Wire shapes for the three endpoints in spec §6 `EXTERNAL INTERFACES`.
//!
//! These are deliberately separate from `model::{JobContext, JobConfig}`:
//! the wire body allows fields the runtime model requires (e.g.
//! `datetimeTriggered`, `triggerType`) to be absent, falling back to
//! submission-time defaults the way the original service's request
//! validation layer would have filled them in. Request-body *validation*
//! itself is out of scope (spec §1); this module only shapes the JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::TriggerType;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessRequest {
    pub process: ProcessBody,
    #[serde(default)]
    pub context: Option<ContextBody>,
    #[serde(default)]
    pub token: Option<Uuid>,
    #[serde(default, rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessBody {
    pub id: String,
    #[serde(default, rename = "testMode")]
    pub test_mode: Option<bool>,
    #[serde(default)]
    pub resume: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextBody {
    #[serde(default, rename = "jobConfigId")]
    pub job_config_id: Option<String>,
    #[serde(default, rename = "userTriggered")]
    pub user_triggered: Option<String>,
    #[serde(default, rename = "datetimeTriggered")]
    pub datetime_triggered: Option<DateTime<Utc>>,
    #[serde(default, rename = "triggerType")]
    pub trigger_type: Option<TriggerType>,
    #[serde(default, rename = "artifactsTTL")]
    pub artifacts_ttl: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbortRequest {
    pub origin: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenQuery {
    pub token: Uuid,
}
