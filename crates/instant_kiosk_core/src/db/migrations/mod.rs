//! Schema steps of the descriptor cache.
//!
//! Every cache operation opens its own connection, so several connections
//! may race to migrate a fresh file. The version check therefore happens
//! under the write lock (`BEGIN IMMEDIATE`): the loser of the race sees the
//! new version and applies nothing.
//!
//! # Invariants
//! - Step versions start at 1 and increase by exactly one.
//! - `PRAGMA user_version` equals the last applied step.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "documents_and_layers",
        sql: include_str!("0001_init.sql"),
    },
    SchemaStep {
        version: 2,
        name: "unique_layer_key",
        sql: include_str!("0002_layer_key.sql"),
    },
];

/// Schema version written by this build.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.len() as u32
}

/// Brings the cache schema up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer build.
/// - `Migration` when a step fails; the whole upgrade is rolled back.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let latest = latest_version();
    // Fast path without taking the write lock.
    let seen = schema_version(conn)?;
    ensure_supported(seen, latest)?;
    if seen == latest {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let from = schema_version(&tx)?;
    ensure_supported(from, latest)?;
    for step in SCHEMA_STEPS.iter().skip(from as usize) {
        run_step(&tx, step)?;
    }
    tx.commit()?;

    if from < latest {
        info!(
            "event=db_migrate module=db status=ok from_version={} to_version={}",
            from, latest
        );
    }
    Ok(())
}

fn run_step(tx: &Transaction<'_>, step: &SchemaStep) -> DbResult<()> {
    tx.execute_batch(step.sql)
        .and_then(|()| tx.pragma_update(None, "user_version", step.version))
        .map_err(|source| DbError::Migration {
            version: step.version,
            name: step.name,
            source,
        })?;
    debug!(
        "event=db_migrate_step module=db status=ok version={} name={}",
        step.version, step.name
    );
    Ok(())
}

fn ensure_supported(db_version: u32, latest_supported: u32) -> DbResult<()> {
    if db_version > latest_supported {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        });
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
