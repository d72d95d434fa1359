//! Versioned schema migrations for the file store.
//!
//! The schema version lives in SQLite's `user_version` header field. Opening a store at
//! version `N` applies, in order and inside one transaction, every migration whose version
//! is greater than the stored one and at most `N`, then records `N`. Versions without an
//! entry are plain version bumps.
//!
//! The upgrade transaction holds the write lock from its first statement, so concurrent
//! openers queue on the busy timeout and the version is re-read once the lock is held.

use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::db::errors::Result;

/// A single schema step, applied once when a store first reaches `version`
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

pub static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "create files object store with unique name index",
    statements: &[
        r#"
        CREATE TABLE IF NOT EXISTS files (
            key TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            size INTEGER NOT NULL,
            mime_type TEXT NOT NULL,
            last_modified INTEGER NOT NULL,
            raw_data BLOB NOT NULL,
            annotation_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
        "CREATE UNIQUE INDEX IF NOT EXISTS files_name_idx ON files (name)",
    ],
}];

/// Migrations needed to move a store from `current` to `target`
pub fn pending(current: u32, target: u32) -> impl Iterator<Item = &'static Migration> {
    MIGRATIONS.iter().filter(move |m| m.version > current && m.version <= target)
}

/// Read the schema version recorded in the store header
pub async fn current_version(conn: &mut SqliteConnection) -> Result<u32> {
    let version = sqlx::query_scalar::<_, i64>("PRAGMA user_version").fetch_one(&mut *conn).await?;
    Ok(version.max(0) as u32)
}

/// Apply pending migrations up to `target` and record the new version.
///
/// Returns the version the store was at once the write lock was held. A value above `target`
/// means another opener moved the store past it first; nothing is changed in that case.
pub async fn upgrade(conn: &mut SqliteConnection, target: u32) -> Result<u32> {
    use sqlx::Connection;

    let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;

    // Another connection may have upgraded between the caller's read and taking the lock
    let current = current_version(&mut tx).await?;
    if current >= target {
        tx.commit().await?;
        return Ok(current);
    }

    for migration in pending(current, target) {
        debug!(version = migration.version, description = migration.description, "Applying migration");
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
    }

    // PRAGMA values cannot be bound; target is a plain integer
    sqlx::query(&format!("PRAGMA user_version = {target}")).execute(&mut *tx).await?;
    tx.commit().await?;

    info!(from = current, to = target, "Upgraded store schema");
    Ok(current)
}
