//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `dcm-job-processor`: the job-orchestration control plane that drives
//! records through the DCM archival pipeline (spec §1-§2).
//!
//! The binary entrypoint (`main.rs`) only wires configuration, the
//! database pool, and the Axum server together; every module below is
//! reusable as a library so the orchestration engine can be exercised
//! directly in tests without a live HTTP service (SPEC_FULL.md "Test
//! tooling").

pub mod adapter;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod model;
pub mod orchestrator;
pub mod testutil;
