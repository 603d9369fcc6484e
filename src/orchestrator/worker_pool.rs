//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Worker layer (spec §5): bounds how many jobs run concurrently to
//! `ORCHESTRA_WORKER_POOL_SIZE` and tracks the live `RunContext` of every
//! in-flight job so the Abort Hook can reach it.
//!
//! Each accepted job gets a fresh `AdapterRegistry` at entry, mirroring
//! spec §4.2's "not constructed until the worker picks up a job" — the
//! registry holds pooled HTTP clients that would not be safe to share
//! across OS process forks in the source system; this crate models the
//! worker pool as bounded concurrent tasks rather than forked processes,
//! so the per-job registry rebuild is kept for fidelity to that boundary
//! even though nothing here is actually forked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tracing::error;
use uuid::Uuid;

use crate::adapter::registry::AdapterRegistry;
use crate::config::Configuration;
use crate::db::DbPool;
use crate::error::Result;
use crate::model::{JobConfig, Report};

use super::abort::AbortHook;
use super::context::RunContext;
use super::job_runner::JobRunner;

#[derive(Clone)]
pub struct WorkerPool {
    db: DbPool,
    config: Arc<Configuration>,
    semaphore: Arc<Semaphore>,
    active: Arc<Mutex<HashMap<Uuid, Arc<RunContext>>>>,
}

impl WorkerPool {
    pub fn new(db: DbPool, config: Arc<Configuration>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Self {
            db,
            config,
            semaphore,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers the job and schedules it onto the pool. Returns immediately;
    /// the job itself does not start running until a worker slot is free.
    pub fn submit(&self, job_config: Arc<JobConfig>, report: Report) {
        let token = report.token;
        let ctx = Arc::new(RunContext::new(self.db.clone(), report));
        self.active.lock().unwrap().insert(token, ctx.clone());

        let semaphore = self.semaphore.clone();
        let active = self.active.clone();
        let db = self.db.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    error!(error = %err, "worker pool semaphore closed");
                    active.lock().unwrap().remove(&token);
                    return;
                }
            };

            let registry = match AdapterRegistry::build(&config) {
                Ok(registry) => Arc::new(registry),
                Err(err) => {
                    error!(error = %err, "failed to build adapter registry for job");
                    active.lock().unwrap().remove(&token);
                    return;
                }
            };

            JobRunner::run(
                ctx,
                db,
                registry,
                job_config,
                config.process_record_concurrency,
                config.process_interval,
            )
            .await;

            active.lock().unwrap().remove(&token);
        });
    }

    pub async fn abort(&self, token: Uuid, reason: &str, origin: &str) -> Result<()> {
        let ctx = self.active.lock().unwrap().get(&token).cloned();
        AbortHook::abort(&self.db, token, reason, origin, ctx.as_deref()).await
    }

    pub fn is_active(&self, token: Uuid) -> bool {
        self.active.lock().unwrap().contains_key(&token)
    }

    /// The live, in-memory report for a job still tracked by this pool, if
    /// any (`GET /report` prefers this over the last-pushed database row —
    /// spec §6 "live job report").
    pub fn snapshot(&self, token: Uuid) -> Option<Report> {
        let ctx = self.active.lock().unwrap().get(&token).cloned()?;
        Some(ctx.snapshot())
    }
}
