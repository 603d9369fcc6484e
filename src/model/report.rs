//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `Report`, `JobResult`, and the live progress fields they carry.
//!
//! The `Report` is the mutable job-level state object, shared across every
//! Record/Stage Runner task for the job via a single job-scoped mutex (see
//! `orchestrator::context`). This module only defines its shape; guarding it
//! is the context module's job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Queued,
    Running,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub status: ProgressStatus,
    pub verbose: String,
    pub numeric: u8,
}

impl Progress {
    pub fn queued() -> Self {
        Self {
            status: ProgressStatus::Queued,
            verbose: "queued".into(),
            numeric: 0,
        }
    }

    pub fn running(verbose: impl Into<String>, numeric: u8) -> Self {
        Self {
            status: ProgressStatus::Running,
            verbose: verbose.into(),
            numeric,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: ProgressStatus::Completed,
            verbose: "completed".into(),
            numeric: 100,
        }
    }

    pub fn aborted(reason: &str, origin: &str) -> Self {
        Self {
            status: ProgressStatus::Aborted,
            verbose: format!("aborted: {reason} ({origin})"),
            numeric: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub body: String,
    pub datetime: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Aggregates all per-record information for a single job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub issues: u32,
    #[serde(default)]
    pub records: HashMap<String, Record>,
}

/// The mutable job-level state object: returned to the client live and
/// persisted to the `jobs.report` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub host: String,
    pub token: Uuid,
    pub args: Value,
    pub progress: Progress,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    pub data: JobResult,
    /// `log_id -> downstream child report`, mirrored verbatim from the
    /// downstream service's own `/report` response.
    #[serde(default)]
    pub children: HashMap<String, Value>,
}

impl Report {
    pub fn new(host: impl Into<String>, token: Uuid, args: Value) -> Self {
        Self {
            host: host.into(),
            token,
            args,
            progress: Progress::queued(),
            log: Vec::new(),
            data: JobResult::default(),
            children: HashMap::new(),
        }
    }

    pub fn log(&mut self, level: LogLevel, body: impl Into<String>, origin: Option<&str>) {
        self.log.push(LogEntry {
            level,
            body: body.into(),
            datetime: chrono::Utc::now(),
            origin: origin.map(str::to_string),
        });
    }

    /// `report.data.success = true` iff every record ended in `COMPLETE`.
    pub fn recompute_success(&mut self) {
        self.data.success = Some(
            self.data
                .records
                .values()
                .all(|r| r.status.is_success()),
        );
    }
}
