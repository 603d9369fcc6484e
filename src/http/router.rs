//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Router construction: binds the three endpoints spec §6 names onto their
//! handlers, with a `tower-http` trace layer over the whole thing (as
//! `ob-poc`'s own Axum services do).

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/process",
            post(handlers::submit_process).delete(handlers::abort_process),
        )
        .route("/report", get(handlers::get_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
