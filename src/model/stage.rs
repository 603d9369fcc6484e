//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! The `Stage` enum: the closed set of pipeline steps and the state graph
//! connecting them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the DCM processing pipeline.
///
/// Ordering, leaves-first: `IMPORT_IES`/`IMPORT_IPS` are the mutually
/// exclusive entry stages (chosen by template type); `BUILD_IP` only follows
/// `IMPORT_IES`; `VALIDATION_METADATA`/`VALIDATION_PAYLOAD` are dispatched as
/// a step-tuple; the remainder is strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ImportIes,
    ImportIps,
    BuildIp,
    ValidationMetadata,
    ValidationPayload,
    PrepareIp,
    BuildSip,
    Transfer,
    Ingest,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::ImportIes,
        Stage::ImportIps,
        Stage::BuildIp,
        Stage::ValidationMetadata,
        Stage::ValidationPayload,
        Stage::PrepareIp,
        Stage::BuildSip,
        Stage::Transfer,
        Stage::Ingest,
    ];

    /// Identifier used to build a `log_id` (`"<token>@<stage>"`).
    pub fn identifier(&self) -> &'static str {
        match self {
            Stage::ImportIes => "import_ies",
            Stage::ImportIps => "import_ips",
            Stage::BuildIp => "build_ip",
            Stage::ValidationMetadata => "validation_metadata",
            Stage::ValidationPayload => "validation_payload",
            Stage::PrepareIp => "prepare_ip",
            Stage::BuildSip => "build_sip",
            Stage::Transfer => "transfer",
            Stage::Ingest => "ingest",
        }
    }

    /// Whether this stage is one of the two mutually-exclusive import
    /// entry points (invariant 5: only one may appear in a record's stages).
    pub fn is_import(&self) -> bool {
        matches!(self, Stage::ImportIes | Stage::ImportIps)
    }

    /// Producer stages are the ones whose successful `RecordStageInfo` may
    /// carry a non-null `artifact`, and which trigger an `artifacts` row on
    /// post-stage.
    pub fn is_producer(&self) -> bool {
        matches!(
            self,
            Stage::ImportIes
                | Stage::ImportIps
                | Stage::BuildIp
                | Stage::PrepareIp
                | Stage::BuildSip
        )
    }

    /// Stages dispatched in the same step-tuple as this one (including
    /// itself). Only `VALIDATION_METADATA`/`VALIDATION_PAYLOAD` form a
    /// group of more than one; every other stage is its own singleton
    /// group. Used by the Stage Runner to launch one task per sibling and
    /// to wait for the whole step-tuple to settle before re-consulting the
    /// state machine.
    pub fn sibling_group(&self) -> &'static [Stage] {
        match self {
            Stage::ValidationMetadata | Stage::ValidationPayload => {
                &[Stage::ValidationMetadata, Stage::ValidationPayload]
            }
            Stage::ImportIes => &[Stage::ImportIes],
            Stage::ImportIps => &[Stage::ImportIps],
            Stage::BuildIp => &[Stage::BuildIp],
            Stage::PrepareIp => &[Stage::PrepareIp],
            Stage::BuildSip => &[Stage::BuildSip],
            Stage::Transfer => &[Stage::Transfer],
            Stage::Ingest => &[Stage::Ingest],
        }
    }

    /// The error `RecordStatus` this stage maps to on failure (§3).
    pub fn error_status(&self) -> super::record::RecordStatus {
        use super::record::RecordStatus::*;
        match self {
            Stage::ImportIes | Stage::ImportIps => ImportError,
            Stage::BuildIp => BuildIpError,
            Stage::ValidationMetadata => IpValError,
            Stage::ValidationPayload => ObjValError,
            Stage::PrepareIp => PrepareIpError,
            Stage::BuildSip => BuildSipError,
            Stage::Transfer => TransferError,
            Stage::Ingest => IngestError,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown stage identifier '{0}'")]
pub struct UnknownStage(String);

impl std::str::FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.identifier() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// `serde(with = "stage_map")`: (de)serializes a `HashMap<Stage, V>` using
/// each stage's wire identifier as the JSON object key, since `serde_json`
/// cannot use a non-string enum directly as a map key.
pub mod stage_map {
    use super::Stage;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;
    use std::str::FromStr;

    pub fn serialize<S, V>(map: &HashMap<Stage, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let as_strings: HashMap<String, &V> = map
            .iter()
            .map(|(stage, value)| (stage.identifier().to_string(), value))
            .collect();
        as_strings.serialize(serializer)
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<HashMap<Stage, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let as_strings: HashMap<String, V> = HashMap::deserialize(deserializer)?;
        as_strings
            .into_iter()
            .map(|(k, v)| {
                Stage::from_str(&k)
                    .map(|stage| (stage, v))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
