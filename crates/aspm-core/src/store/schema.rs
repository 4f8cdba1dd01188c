//! Versioned schema migrations.
//!
//! Each migration is embedded at compile time and applied at most once. The
//! applied version lives in `PRAGMA user_version`; a database written by a
//! newer build is refused rather than silently downgraded.

use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use super::StoreError;

struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/0001_initial.sql"),
}];

/// Schema version produced by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Reads the applied schema version.
///
/// # Errors
///
/// Returns an error if the pragma cannot be read.
pub fn version(conn: &Connection) -> Result<u32, StoreError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Applies every pending migration, each in its own transaction.
///
/// Each migration takes the write lock up front and re-reads the applied
/// version under it, so connections racing on a fresh file apply it once.
///
/// Returns the resulting schema version.
///
/// # Errors
///
/// Returns [`StoreError::SchemaTooNew`] if the database is ahead of this
/// build, or a database error if a migration fails (that migration is rolled
/// back).
pub fn migrate(conn: &mut Connection) -> Result<u32, StoreError> {
    let mut current = supported(version(conn)?)?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let applied = supported(version(&tx)?)?;
        if applied >= migration.version {
            current = applied;
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;

        info!(
            from = applied,
            to = migration.version,
            "Applied schema migration"
        );
        current = migration.version;
    }

    Ok(current)
}

fn supported(found: u32) -> Result<u32, StoreError> {
    if found > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    Ok(found)
}
