//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Job Context: the job-scoped mutable state shared across every Record
//! Runner / Stage Runner task for one job (spec §5 "Shared resource
//! policy").
//!
//! The `Report` is the only cross-task shared mutable state; all mutation
//! goes through a single `std::sync::Mutex` (not `tokio::sync::Mutex` —
//! every critical section here is synchronous field manipulation, never an
//! `.await`, and the registered abort callbacks must themselves be `Fn`,
//! which rules out holding an async lock across their invocation).

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::adapter::AbortCallback;
use crate::db::{models, DbPool};
use crate::model::{LogLevel, Report};

struct AbortHandle {
    log_id: String,
    callback: AbortCallback,
}

struct Inner {
    report: Report,
    abort_handles: HashMap<String, AbortHandle>,
    cancelled: bool,
}

pub struct RunContext {
    db: DbPool,
    token: Uuid,
    inner: Mutex<Inner>,
}

impl RunContext {
    pub fn new(db: DbPool, report: Report) -> Self {
        let token = report.token;
        Self {
            db,
            token,
            inner: Mutex::new(Inner {
                report,
                abort_handles: HashMap::new(),
                cancelled: false,
            }),
        }
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Appends a log entry to the job-level report.
    pub fn log(&self, level: LogLevel, body: impl Into<String>, origin: Option<&str>) {
        self.inner.lock().unwrap().report.log(level, body, origin);
    }

    /// Takes an atomic, read-only copy of the current report (spec §5:
    /// "read-only snapshots are taken atomically when serializing").
    pub fn snapshot(&self) -> Report {
        self.inner.lock().unwrap().report.clone()
    }

    /// Runs `f` against the guarded report under the mutex. `f` must be
    /// synchronous: no `.await` may be reached while holding this lock.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Report) -> R) -> R {
        f(&mut self.inner.lock().unwrap().report)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().unwrap().cancelled
    }

    /// Stage Runner step 2-3: registers an empty child-report placeholder
    /// and the self-contained abort callback for `token`, keyed by the
    /// token the caller allocated for this dispatch.
    pub fn add_child(&self, token: String, log_id: String, callback: AbortCallback) {
        let mut inner = self.inner.lock().unwrap();
        inner.report.children.insert(log_id.clone(), Value::Null);
        inner.abort_handles.insert(token, AbortHandle { log_id, callback });
    }

    /// Stage Runner step 6: un-registers the abort handle once the stage
    /// has reached a terminal outcome (success, failure, or abort).
    pub fn remove_child(&self, token: &str) {
        self.inner.lock().unwrap().abort_handles.remove(token);
    }

    /// Overwrites `report.children[log_id]` with the downstream's latest
    /// (possibly terminal) report.
    pub fn set_child_report(&self, log_id: &str, report: Value) {
        self.inner.lock().unwrap().report.children.insert(log_id.to_string(), report);
    }

    /// Re-keys an abort handle and its log id after the downstream
    /// submission returned a token different from the client-allocated
    /// one (spec §1 Non-goals: downstream services are expected to adopt
    /// the client token, but are not required to — see stage_runner).
    pub fn rekey_child(&self, old_token: &str, new_token: &str, new_log_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(mut handle) = inner.abort_handles.remove(old_token) {
            let old_log_id = handle.log_id.clone();
            if old_log_id != new_log_id {
                if let Some(placeholder) = inner.report.children.remove(&old_log_id) {
                    inner.report.children.insert(new_log_id.to_string(), placeholder);
                }
                handle.log_id = new_log_id.to_string();
            }
            inner.abort_handles.insert(new_token.to_string(), handle);
        }
    }

    /// Persists the current report to `jobs.report`. Writes are naturally
    /// serialized by Postgres's per-row lock; the mutex above only
    /// serializes the in-memory mutation that precedes each push.
    pub async fn push(&self) -> sqlx::Result<()> {
        let report = self.snapshot();
        models::update_job_report(&self.db, self.token, &serde_json::to_value(&report).unwrap()).await
    }

    /// Abort Hook in-flight branch (spec §4.9): marks the context
    /// cancelled, then invokes every registered abort callback and
    /// captures its best-effort final report.
    pub async fn broadcast_abort(&self, reason: String, origin: String) {
        let handles: Vec<(String, AbortHandle)> = {
            let mut inner = self.inner.lock().unwrap();
            inner.cancelled = true;
            inner.abort_handles.drain().collect()
        };

        for (_token, handle) in handles {
            let final_report = (handle.callback)(reason.clone(), origin.clone()).await;
            if let Some(report) = final_report {
                self.set_child_report(&handle.log_id, report);
            } else {
                warn!(log_id = %handle.log_id, "abort callback returned no final report");
            }
        }
    }
}
