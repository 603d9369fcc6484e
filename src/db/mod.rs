//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Persistence layer: connection bootstrap plus the row structs/queries
//! for the tables this service owns (spec §6).

pub mod connection;
pub mod models;

pub use connection::{bootstrap_schema, establish_connection};

pub type DbPool = sqlx::PgPool;
