//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! The orchestration engine: Record State Machine, Stage Runner, Record
//! Runner, Job Collector, Job Runner, and Abort Hook (spec §2, §4).

pub mod abort;
pub mod collector;
pub mod context;
pub mod job_runner;
pub mod post_stage;
pub mod record_runner;
pub mod stage_runner;
pub mod state_machine;
pub mod worker_pool;

pub use abort::AbortHook;
pub use collector::JobCollector;
pub use context::RunContext;
pub use job_runner::JobRunner;
pub use worker_pool::WorkerPool;
