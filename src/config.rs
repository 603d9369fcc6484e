//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Process configuration: the closed set of environment options recognized
//! by this service (spec §6). Loaded once at startup via the `config` crate
//! layered over `Environment::default()`; nothing here is read again after
//! boot.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::adapter::AdapterSettings;
use crate::model::{ArchiveApi, ArchiveConfiguration, Stage};

fn default_database_url() -> String {
    "postgres://localhost/dcm_job_processor".to_string()
}

fn default_host(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Raw, serde-deserializable shape. Durations are seconds; `ARCHIVES_SRC` is
/// a JSON object keyed by archive id, matching `ArchiveConfiguration`.
#[derive(Debug, Deserialize)]
struct RawConfiguration {
    #[serde(default = "default_database_url")]
    database_url: String,

    #[serde(default = "default_worker_pool_size")]
    orchestra_worker_pool_size: usize,

    #[serde(default = "default_record_concurrency")]
    process_record_concurrency: usize,
    #[serde(default = "default_process_interval")]
    process_interval_ms: u64,

    #[serde(default = "default_request_timeout")]
    request_timeout_secs: u64,
    #[serde(default = "default_process_timeout")]
    process_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    request_poll_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    process_request_max_retries: u32,
    #[serde(default = "default_retry_interval")]
    process_request_retry_interval_secs: u64,

    #[serde(default)]
    import_module_host: Option<String>,
    #[serde(default)]
    ip_builder_host: Option<String>,
    #[serde(default)]
    object_validator_host: Option<String>,
    #[serde(default)]
    preparation_module_host: Option<String>,
    #[serde(default)]
    sip_builder_host: Option<String>,
    #[serde(default)]
    transfer_module_host: Option<String>,
    #[serde(default)]
    backend_host: Option<String>,

    #[serde(default)]
    archives_src: Option<String>,
    #[serde(default)]
    default_target_archive_id: Option<String>,

    #[serde(default)]
    db_load_schema: bool,
    #[serde(default)]
    db_strict_schema_version: bool,

    #[serde(default)]
    process_log_error_tracebacks: bool,
}

fn default_worker_pool_size() -> usize {
    4
}
fn default_record_concurrency() -> usize {
    8
}
fn default_process_interval() -> u64 {
    500
}
fn default_request_timeout() -> u64 {
    1
}
fn default_process_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    1
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_interval() -> u64 {
    1
}

/// Resolved, process-wide configuration.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub database_url: String,
    pub worker_pool_size: usize,

    pub process_record_concurrency: usize,
    pub process_interval: Duration,

    pub request_timeout: Duration,
    pub process_timeout: Duration,
    pub request_poll_interval: Duration,
    pub process_request_max_retries: u32,
    pub process_request_retry_interval: Duration,

    pub service_hosts: HashMap<Stage, String>,

    pub archives: HashMap<String, ArchiveConfiguration>,
    pub default_target_archive_id: Option<String>,

    pub db_load_schema: bool,
    pub db_strict_schema_version: bool,
    pub log_error_tracebacks: bool,
}

impl Configuration {
    /// Loads configuration from process environment variables. Every
    /// variable named in spec §6's closed set is optional; unset values
    /// fall back to the defaults above (mirroring the original service's
    /// `config.py`).
    pub fn from_env() -> anyhow::Result<Self> {
        let raw: RawConfiguration = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        let mut service_hosts = HashMap::new();
        service_hosts.insert(
            Stage::ImportIes,
            raw.import_module_host.clone().unwrap_or_else(|| default_host(8080)),
        );
        service_hosts.insert(
            Stage::ImportIps,
            raw.import_module_host.unwrap_or_else(|| default_host(8080)),
        );
        service_hosts.insert(
            Stage::BuildIp,
            raw.ip_builder_host.clone().unwrap_or_else(|| default_host(8081)),
        );
        service_hosts.insert(
            Stage::ValidationMetadata,
            raw.ip_builder_host.unwrap_or_else(|| default_host(8081)),
        );
        service_hosts.insert(
            Stage::ValidationPayload,
            raw.object_validator_host.unwrap_or_else(|| default_host(8082)),
        );
        service_hosts.insert(
            Stage::PrepareIp,
            raw.preparation_module_host.unwrap_or_else(|| default_host(8083)),
        );
        service_hosts.insert(
            Stage::BuildSip,
            raw.sip_builder_host.unwrap_or_else(|| default_host(8084)),
        );
        service_hosts.insert(
            Stage::Transfer,
            raw.transfer_module_host.unwrap_or_else(|| default_host(8085)),
        );
        service_hosts.insert(
            Stage::Ingest,
            raw.backend_host.unwrap_or_else(|| default_host(8086)),
        );

        let archives = match raw.archives_src {
            Some(json) if !json.is_empty() => {
                let parsed: HashMap<String, RawArchive> = serde_json::from_str(&json)?;
                parsed
                    .into_iter()
                    .map(|(id, a)| {
                        (
                            id.clone(),
                            ArchiveConfiguration {
                                id,
                                kind: a.kind,
                                transfer_destination_id: a.transfer_destination_id,
                            },
                        )
                    })
                    .collect()
            }
            _ => HashMap::new(),
        };

        Ok(Self {
            database_url: raw.database_url,
            worker_pool_size: raw.orchestra_worker_pool_size,
            process_record_concurrency: raw.process_record_concurrency,
            process_interval: Duration::from_millis(raw.process_interval_ms),
            request_timeout: Duration::from_secs(raw.request_timeout_secs),
            process_timeout: Duration::from_secs(raw.process_timeout_secs),
            request_poll_interval: Duration::from_secs(raw.request_poll_interval_secs),
            process_request_max_retries: raw.process_request_max_retries,
            process_request_retry_interval: Duration::from_secs(
                raw.process_request_retry_interval_secs,
            ),
            service_hosts,
            archives,
            default_target_archive_id: raw.default_target_archive_id,
            db_load_schema: raw.db_load_schema,
            db_strict_schema_version: raw.db_strict_schema_version,
            log_error_tracebacks: raw.process_log_error_tracebacks,
        })
    }

    /// Resolves the per-adapter HTTP settings for `stage`, combining its
    /// configured host with the shared poll/retry knobs.
    pub fn adapter_settings(&self, stage: Stage) -> anyhow::Result<AdapterSettings> {
        let host = self
            .service_hosts
            .get(&stage)
            .ok_or_else(|| anyhow::anyhow!("no configured host for stage '{stage}'"))?;
        let host = if host.ends_with('/') {
            host.clone()
        } else {
            format!("{host}/")
        };
        let base_url = reqwest::Url::parse(&host)?;
        Ok(AdapterSettings {
            base_url,
            request_timeout: self.request_timeout,
            max_retries: self.process_request_max_retries,
            retry_interval: self.process_request_retry_interval,
            poll_interval: self.request_poll_interval,
            poll_timeout: self.process_timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawArchive {
    #[serde(rename = "type")]
    kind: ArchiveApi,
    #[serde(rename = "transferDestinationId")]
    transfer_destination_id: String,
}
