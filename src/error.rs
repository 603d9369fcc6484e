//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Crate-wide error taxonomy.
//!
//! Mirrors the kinds named in the error-handling design: input errors are
//! handled at the HTTP boundary and never reach here, so this enum covers
//! downstream, orchestrator, persistence and fatal-orchestrator errors.

use thiserror::Error;

use crate::model::stage::Stage;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("adapter for stage '{stage}' could not build a request body: {reason}")]
    MissingInput { stage: Stage, reason: String },

    #[error("downstream service for stage '{stage}' unreachable: {source}")]
    Unreachable {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },

    #[error("downstream service for stage '{stage}' timed out after {elapsed:?}")]
    Timeout { stage: Stage, elapsed: std::time::Duration },

    #[error("submission for stage '{stage}' was rejected: {reason}")]
    Rejected { stage: Stage, reason: String },

    #[error("stage '{stage}' was aborted")]
    Aborted { stage: Stage },

    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("fatal orchestrator error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Whether this error should be logged with a traceback when
    /// `PROCESS_LOG_ERROR_TRACEBACKS` is enabled.
    pub fn is_orchestrator_level(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Orchestrator(_) | OrchestratorError::Fatal(_) | OrchestratorError::Other(_)
        )
    }
}
