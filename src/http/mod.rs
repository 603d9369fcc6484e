//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Thin Axum surface binding spec §6's three endpoints onto the
//! orchestrator (SPEC_FULL.md "HTTP surface"). All business logic lives in
//! `orchestrator::*`; this module only shapes requests/responses around it.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;

use std::sync::Arc;

use crate::config::Configuration;
use crate::db::DbPool;
use crate::orchestrator::WorkerPool;

pub use router::build_router;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Configuration>,
    pub worker_pool: WorkerPool,
    /// This service's own self-identity, mirrored into every `Report.host`
    /// it produces (spec §3). Populated from the bind address; identity/
    /// self-description beyond that is out of scope (spec §1).
    pub host: String,
}
