//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `RecordStatus`, `RecordStageInfo`, and `Record`: the per-record part of
//! the data model (spec §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::Stage;

/// Closed enumeration of record statuses: one in-process value, one success
/// terminal, one error terminal per stage, plus an orchestrator-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    #[serde(rename = "in-process")]
    InProcess,
    Complete,
    ProcessError,
    ImportError,
    BuildIpError,
    IpValError,
    ObjValError,
    PrepareIpError,
    BuildSipError,
    TransferError,
    IngestError,
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordStatus::InProcess)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RecordStatus::Complete)
    }
}

impl Default for RecordStatus {
    fn default() -> Self {
        RecordStatus::InProcess
    }
}

/// Per-stage execution fact for one record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordStageInfo {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "logId", skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl RecordStageInfo {
    pub fn new(token: String) -> Self {
        Self {
            token: Some(token),
            ..Default::default()
        }
    }
}

/// The unit of work flowing through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,

    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default, rename = "datetimeChanged")]
    pub datetime_changed: Option<DateTime<Utc>>,

    #[serde(default)]
    pub bitstream: bool,
    #[serde(default, rename = "skipObjectValidation")]
    pub skip_object_validation: bool,

    #[serde(default, rename = "sourceOrganization")]
    pub source_organization: Option<String>,
    #[serde(default, rename = "externalId")]
    pub external_id: Option<String>,
    #[serde(default, rename = "originSystemId")]
    pub origin_system_id: Option<String>,
    #[serde(default, rename = "importType")]
    pub import_type: Option<String>,
    #[serde(default, rename = "oaiIdentifier")]
    pub oai_identifier: Option<String>,
    #[serde(default, rename = "oaiDatestamp")]
    pub oai_datestamp: Option<String>,
    #[serde(default, rename = "hotfolderOriginalPath")]
    pub hotfolder_original_path: Option<String>,

    #[serde(default, rename = "archiveSipId")]
    pub archive_sip_id: Option<String>,
    #[serde(default, rename = "archiveIeId")]
    pub archive_ie_id: Option<String>,
    #[serde(default, rename = "ieId")]
    pub ie_id: Option<String>,

    #[serde(default, with = "super::stage::stage_map")]
    pub stages: HashMap<Stage, RecordStageInfo>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started: false,
            completed: false,
            status: RecordStatus::InProcess,
            datetime_changed: None,
            bitstream: false,
            skip_object_validation: false,
            source_organization: None,
            external_id: None,
            origin_system_id: None,
            import_type: None,
            oai_identifier: None,
            oai_datestamp: None,
            hotfolder_original_path: None,
            archive_sip_id: None,
            archive_ie_id: None,
            ie_id: None,
            stages: HashMap::new(),
        }
    }

    /// The import stage present in this record, if any (invariant 5: at
    /// most one of `ImportIes`/`ImportIps`).
    pub fn import_stage(&self) -> Option<Stage> {
        self.stages
            .keys()
            .copied()
            .find(|s| s.is_import())
    }

    /// Most-recently completed producer stage's artifact, used by a
    /// successor adapter's `build_request_body` to find its input.
    pub fn artifact_from(&self, stage: Stage) -> Option<&str> {
        self.stages
            .get(&stage)
            .and_then(|info| info.artifact.as_deref())
    }

    pub fn mark_changed(&mut self) {
        self.datetime_changed = Some(Utc::now());
    }
}
