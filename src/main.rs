//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! `dcm-job-processor` binary entrypoint: loads configuration, connects to
//! the database, and serves the Axum router (SPEC_FULL.md "HTTP surface").

use std::sync::Arc;

use dcm_job_processor::config::Configuration;
use dcm_job_processor::db::{bootstrap_schema, establish_connection};
use dcm_job_processor::http::{build_router, AppState};
use dcm_job_processor::orchestrator::WorkerPool;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dcm_job_processor=debug".into()),
        )
        .init();

    let config = Arc::new(Configuration::from_env()?);

    let db = establish_connection(&config).await?;
    bootstrap_schema(&db, &config).await?;

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".into());
    let host = std::env::var("HOST").unwrap_or_else(|_| format!("http://{bind_addr}"));

    let worker_pool = WorkerPool::new(db.clone(), config.clone());
    let state = AppState {
        db,
        config,
        worker_pool,
        host,
    };

    let app = build_router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "dcm-job-processor listening");
    axum::serve(listener, app).await?;

    Ok(())
}
