//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Database connection bootstrap: pool creation plus the schema-load/
//! schema-version checks spec §6 "Schema bootstrap" describes.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::config::Configuration;

/// Package schema version compared against the database's own
/// `deployment.schema_version` row. Bumped whenever `schema.sql` changes.
pub const SCHEMA_VERSION: &str = "1";

pub async fn establish_connection(config: &Configuration) -> Result<PgPool> {
    debug!(database_url = %redact(&config.database_url), "connecting to database");
    PgPoolOptions::new()
        .max_connections(config.worker_pool_size.max(1) as u32 * 4)
        .connect(&config.database_url)
        .await
        .context("failed to establish database connection pool")
}

fn redact(uri: &str) -> String {
    match uri.rsplit_once('@') {
        Some((_, host_and_db)) => format!("postgres://***:***@{host_and_db}"),
        None => uri.to_string(),
    }
}

/// Applies `schema.sql` in a single transaction if `DB_LOAD_SCHEMA` is set
/// and the `deployment` table is absent or unloaded, then checks the
/// runtime schema version against the stored one. A mismatch is a WARNING
/// unless `DB_STRICT_SCHEMA_VERSION` is set, in which case this returns an
/// error and the caller is expected to exit non-zero.
pub async fn bootstrap_schema(pool: &PgPool, config: &Configuration) -> Result<()> {
    if config.db_load_schema {
        let loaded: Option<(bool,)> = sqlx::query_as(
            "select schema_loaded from deployment limit 1",
        )
        .fetch_optional(pool)
        .await
        .unwrap_or(None);

        if !loaded.map(|(l,)| l).unwrap_or(false) {
            debug!("applying schema.sql");
            let schema = include_str!("schema.sql");
            let mut tx = pool.begin().await.context("failed to open schema bootstrap transaction")?;
            sqlx::raw_sql(schema)
                .execute(&mut *tx)
                .await
                .context("failed to apply schema.sql")?;
            sqlx::query(
                "insert into deployment (schema_loaded, schema_version) values (true, $1) \
                 on conflict do nothing",
            )
            .bind(SCHEMA_VERSION)
            .execute(&mut *tx)
            .await
            .context("failed to record schema_version")?;
            tx.commit().await.context("failed to commit schema bootstrap")?;
        }
    }

    let stored: Option<(Option<String>,)> =
        sqlx::query_as("select schema_version from deployment limit 1")
            .fetch_optional(pool)
            .await
            .unwrap_or(None);

    match stored.and_then(|(v,)| v) {
        Some(version) if version != SCHEMA_VERSION => {
            if config.db_strict_schema_version {
                anyhow::bail!(
                    "schema version mismatch: runtime expects '{SCHEMA_VERSION}', database has '{version}'"
                );
            }
            warn!(
                runtime_version = SCHEMA_VERSION,
                database_version = %version,
                "schema version mismatch"
            );
        }
        _ => {}
    }

    Ok(())
}
