//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Test doubles for `StageAdapter`, exercising Stage Runner / Record Runner
//! / Job Runner / Collector behavior without a live downstream HTTP service
//! or database (SPEC_FULL.md "Test tooling"; mirrors the shape of the
//! original Python suite's `test_dcm_job_processor/conftest.py`: one fake
//! adapter per stage, controllable success/failure).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapter::registry::AdapterRegistry;
use crate::adapter::{AdapterSettings, StageAdapter, SubmissionToken, UpdateHook};
use crate::error::{OrchestratorError, Result};
use crate::model::{JobConfig, Record, Stage};

fn test_settings() -> AdapterSettings {
    AdapterSettings {
        base_url: reqwest::Url::parse("http://localhost:0/").unwrap(),
        request_timeout: Duration::from_millis(50),
        max_retries: 0,
        retry_interval: Duration::from_millis(1),
        poll_interval: Duration::from_millis(1),
        poll_timeout: Duration::from_secs(1),
    }
}

/// A fake non-import-stage adapter: skips the network entirely and returns
/// a fixed terminal outcome. One instance per desired (stage, outcome)
/// pairing — build a fresh `FakeAdapter` for each stage a test wants to
/// control independently.
pub struct FakeAdapter {
    stage: Stage,
    succeed: bool,
    fail_request_body: bool,
    settings: AdapterSettings,
    calls: Arc<Mutex<u32>>,
}

impl FakeAdapter {
    pub fn new(stage: Stage, succeed: bool) -> Self {
        Self {
            stage,
            succeed,
            fail_request_body: false,
            settings: test_settings(),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Simulates `build_request_body` failing with `MissingInput` before
    /// any HTTP call would be made.
    pub fn failing_request_body(stage: Stage) -> Self {
        Self {
            stage,
            succeed: false,
            fail_request_body: true,
            settings: test_settings(),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of times `build_request_body` has been invoked — used by
    /// resume tests to assert a rehydrated stage is never re-dispatched.
    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl StageAdapter for FakeAdapter {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn build_request_body(&self, _job_config: &JobConfig, _record: &Record) -> Result<Value> {
        *self.calls.lock().unwrap() += 1;
        if self.fail_request_body {
            return Err(OrchestratorError::MissingInput {
                stage: self.stage,
                reason: "fake: missing input".into(),
            });
        }
        Ok(json!({}))
    }

    async fn submit(&self, _request_body: Value, token: &str) -> Result<SubmissionToken> {
        Ok(SubmissionToken(token.to_string()))
    }

    async fn poll(&self, token: &SubmissionToken, mut update_hook: UpdateHook<'_>) -> Result<Value> {
        let report = json!({
            "token": token.0,
            "progress": { "status": "completed", "verbose": "completed", "numeric": 100 },
            "log": [],
            "data": { "success": self.succeed, "valid": self.succeed },
        });
        update_hook(&report);
        Ok(report)
    }

    async fn abort(&self, _token: &SubmissionToken, _reason: &str, _origin: &str) -> Result<()> {
        Ok(())
    }

    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn eval(&self, record: &mut Record, _report: &Value) {
        if !self.succeed {
            return;
        }
        match self.stage {
            Stage::ImportIes | Stage::ImportIps => {
                unreachable!("eval is not called for the import stages")
            }
            Stage::ValidationMetadata => {
                record.origin_system_id = Some(format!("origin-{}", record.id));
                record.external_id = Some(format!("external-{}", record.id));
                record.source_organization = Some("test-org".to_string());
            }
            Stage::Ingest => {
                record.archive_sip_id = Some(format!("sip-{}", record.id));
                record.archive_ie_id = Some(format!("ie-{}", record.id));
            }
            stage if stage.is_producer() => {
                let artifact = format!("{stage}-artifact-{}", record.id);
                record.stages.entry(stage).or_default().artifact = Some(artifact);
            }
            _ => {}
        }
    }
}

/// A fake import-stage adapter: returns a batch of records via
/// `data.records`, the shape `orchestrator::collector`'s fresh-import phase
/// reads directly (import's `eval` is never invoked, spec §4.1).
pub struct FakeImportAdapter {
    stage: Stage,
    settings: AdapterSettings,
    entries: Vec<(String, Value)>,
}

impl FakeImportAdapter {
    /// `entries` is `(record_id, entry_json)`; `entry_json` follows the
    /// shape `orchestrator::collector::fresh_import_phase` parses:
    /// `{fetchedPayload, importType?, artifact?, bitstream?, ...}`.
    pub fn new(stage: Stage, entries: Vec<(String, Value)>) -> Self {
        Self { stage, settings: test_settings(), entries }
    }

    /// Convenience constructor for the common case: every entry succeeds
    /// and carries an artifact named after its id.
    pub fn all_succeed(stage: Stage, ids: &[&str]) -> Self {
        let entries = ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    json!({ "fetchedPayload": true, "artifact": format!("import-artifact-{id}") }),
                )
            })
            .collect();
        Self::new(stage, entries)
    }
}

#[async_trait]
impl StageAdapter for FakeImportAdapter {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn build_request_body(&self, _job_config: &JobConfig, _record: &Record) -> Result<Value> {
        Ok(json!({}))
    }

    async fn submit(&self, _request_body: Value, token: &str) -> Result<SubmissionToken> {
        Ok(SubmissionToken(token.to_string()))
    }

    async fn poll(&self, token: &SubmissionToken, mut update_hook: UpdateHook<'_>) -> Result<Value> {
        let mut records = serde_json::Map::new();
        for (id, entry) in &self.entries {
            records.insert(id.clone(), entry.clone());
        }
        let report = json!({
            "token": token.0,
            "progress": { "status": "completed", "verbose": "completed", "numeric": 100 },
            "log": [],
            "data": { "success": true, "records": Value::Object(records) },
        });
        update_hook(&report);
        Ok(report)
    }

    async fn abort(&self, _token: &SubmissionToken, _reason: &str, _origin: &str) -> Result<()> {
        Ok(())
    }

    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn eval(&self, _record: &mut Record, _report: &Value) {
        unreachable!("eval is not called for the import stages")
    }
}

/// Builds a registry where every non-import stage succeeds and
/// `IMPORT_IES` returns one fetched record per id in `ids`. Individual
/// entries in the returned map may be swapped out by the caller before
/// use (e.g. to force one stage to fail).
pub fn all_success_registry(ids: &[&str]) -> AdapterRegistry {
    let mut adapters: HashMap<Stage, Arc<dyn StageAdapter>> = HashMap::new();
    adapters.insert(Stage::ImportIes, Arc::new(FakeImportAdapter::all_succeed(Stage::ImportIes, ids)));
    adapters.insert(
        Stage::ImportIps,
        Arc::new(FakeImportAdapter::all_succeed(Stage::ImportIps, ids)),
    );
    for stage in [
        Stage::BuildIp,
        Stage::ValidationMetadata,
        Stage::ValidationPayload,
        Stage::PrepareIp,
        Stage::BuildSip,
        Stage::Transfer,
        Stage::Ingest,
    ] {
        adapters.insert(stage, Arc::new(FakeAdapter::new(stage, true)));
    }
    AdapterRegistry::from_adapters(adapters)
}
