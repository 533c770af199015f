//! Schema steps for the ledger tables.
//!
//! # Invariants
//! - Step versions start at 1 and increase by exactly one.
//! - `PRAGMA user_version` holds the last step applied.
//! - Pending steps run in a single transaction.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "ledger_tables",
        sql: include_str!("0001_init.sql"),
    },
    SchemaStep {
        version: 2,
        name: "soft_delete_indexes",
        sql: include_str!("0002_soft_delete_indexes.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Schema version recorded in `conn`.
pub fn current_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

fn pending_steps(applied: u32) -> impl Iterator<Item = &'static SchemaStep> {
    SCHEMA_STEPS.iter().skip_while(move |step| step.version <= applied)
}

/// Brings `conn` up to [`latest_version`].
///
/// Returns the number of steps applied; `0` when the schema is current.
/// Databases written by a newer build are rejected untouched.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let applied = current_version(conn)?;
    let target = latest_version();
    if applied > target {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: applied,
            latest_supported: target,
        });
    }

    let tx = conn.transaction()?;
    let mut steps = 0;
    for step in pending_steps(applied) {
        debug!(
            "event=db_migrate_step module=db version={} name={}",
            step.version, step.name
        );
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        steps += 1;
    }
    tx.commit()?;

    if steps > 0 {
        info!(
            "event=db_migrate module=db status=ok from_version={} to_version={} steps={}",
            applied, target, steps
        );
    }
    Ok(steps)
}
