//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Adapter Registry: a process-local `Stage -> StageAdapter` map.
//!
//! Built once per worker process after the worker picks up a job — Stage
//! Adapters hold pooled `reqwest::Client`s whose connection pools do not
//! survive a process fork, so the registry is never constructed ahead of
//! time or shared across workers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Configuration;
use crate::model::Stage;

use super::build_ip::BuildIpAdapter;
use super::build_sip::BuildSipAdapter;
use super::import_ies::ImportIesAdapter;
use super::import_ips::ImportIpsAdapter;
use super::ingest::IngestAdapter;
use super::prepare_ip::PrepareIpAdapter;
use super::transfer::TransferAdapter;
use super::validation_metadata::ValidationMetadataAdapter;
use super::validation_payload::ValidationPayloadAdapter;
use super::{AdapterSettings, StageAdapter};

#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Stage, Arc<dyn StageAdapter>>,
}

impl AdapterRegistry {
    /// Builds one adapter per stage, each with its own `reqwest::Client`
    /// (and thus its own connection pool) and its own resolved settings.
    pub fn build(config: &Configuration) -> anyhow::Result<Self> {
        let mut adapters: HashMap<Stage, Arc<dyn StageAdapter>> = HashMap::new();

        let client = || -> anyhow::Result<reqwest::Client> {
            Ok(reqwest::Client::builder().build()?)
        };

        let settings = |stage: Stage| -> anyhow::Result<AdapterSettings> {
            config.adapter_settings(stage)
        };

        adapters.insert(
            Stage::ImportIes,
            Arc::new(ImportIesAdapter::new(client()?, settings(Stage::ImportIes)?)),
        );
        adapters.insert(
            Stage::ImportIps,
            Arc::new(ImportIpsAdapter::new(client()?, settings(Stage::ImportIps)?)),
        );
        adapters.insert(
            Stage::BuildIp,
            Arc::new(BuildIpAdapter::new(client()?, settings(Stage::BuildIp)?)),
        );
        adapters.insert(
            Stage::ValidationMetadata,
            Arc::new(ValidationMetadataAdapter::new(
                client()?,
                settings(Stage::ValidationMetadata)?,
            )),
        );
        adapters.insert(
            Stage::ValidationPayload,
            Arc::new(ValidationPayloadAdapter::new(
                client()?,
                settings(Stage::ValidationPayload)?,
            )),
        );
        adapters.insert(
            Stage::PrepareIp,
            Arc::new(PrepareIpAdapter::new(client()?, settings(Stage::PrepareIp)?)),
        );
        adapters.insert(
            Stage::BuildSip,
            Arc::new(BuildSipAdapter::new(client()?, settings(Stage::BuildSip)?)),
        );
        adapters.insert(
            Stage::Transfer,
            Arc::new(TransferAdapter::new(client()?, settings(Stage::Transfer)?)),
        );
        adapters.insert(
            Stage::Ingest,
            Arc::new(IngestAdapter::new(client()?, settings(Stage::Ingest)?)),
        );

        Ok(Self { adapters })
    }

    pub fn get(&self, stage: Stage) -> Option<Arc<dyn StageAdapter>> {
        self.adapters.get(&stage).cloned()
    }

    /// Test-only constructor: builds a registry directly from a prepared
    /// `Stage -> StageAdapter` map, bypassing HTTP client/config resolution
    /// (see `testutil`).
    #[doc(hidden)]
    pub fn from_adapters(adapters: HashMap<Stage, Arc<dyn StageAdapter>>) -> Self {
        Self { adapters }
    }
}
