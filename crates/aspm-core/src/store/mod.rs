//! `SQLite`-backed provenance graph and vulnerability ledger.
//!
//! The [`Store`] handle owns one connection behind a mutex and is cheap to
//! clone. All writes go through [`Store::write`], which runs the caller's
//! closure inside an `IMMEDIATE` transaction: the closure either commits as
//! a whole or leaves no trace.
//!
//! The write operations themselves live in [`graph`] (products and links)
//! and [`ledger`] (engagements and vulnerabilities). Every insert is backed
//! by a unique constraint and uses `ON CONFLICT DO NOTHING`, so concurrent
//! submissions for the same keys converge on one row each, also when several
//! processes share the database file.
//!
//! # Example
//!
//! ```rust
//! use aspm_core::model::{ProductCandidate, ProductionMethod};
//! use aspm_core::store::{Store, StoreError, graph};
//!
//! # fn example() -> Result<(), StoreError> {
//! let store = Store::in_memory()?;
//! store.write(|tx| {
//!     graph::upsert_product(tx, &ProductCandidate::new("bin-sha"))?;
//!     graph::upsert_product(tx, &ProductCandidate::new("src-commit"))?;
//!     graph::upsert_link(tx, "bin-sha", "src-commit", ProductionMethod::Compile)?;
//!     Ok::<_, StoreError>(())
//! })?;
//! assert_eq!(store.links()?.len(), 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

// SQLite returns i64 for row ids and timestamps, but they're always
// non-negative. Nanosecond timestamps won't overflow i64 until 2262.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]

pub mod graph;
pub mod ledger;
pub mod schema;


use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OpenFlags, Row, Transaction, TransactionBehavior};
use thiserror::Error;
use tracing::debug;

pub use self::ledger::UNKNOWN_TOOL;
use crate::model::{Engagement, Link, Product, Vulnerability};

/// Errors raised by the store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`, including constraint violations other
    /// than the expected idempotent conflicts.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The database was written by a newer schema.
    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Version found in the database.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },

    /// A row that must exist after an upsert was not found.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Lookup key.
        key: String,
    },

    /// An identity key was empty.
    #[error("{entity} id must not be empty")]
    EmptyKey {
        /// Entity kind.
        entity: &'static str,
    },

    /// The connection mutex was poisoned by a panicking writer.
    #[error("store connection lock poisoned")]
    LockPoisoned,
}

/// Connection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a writer waits for a lock held by another connection.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared handle to the ASPM database.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish_non_exhaustive()
    }
}

impl Store {
    /// Opens or creates a database file and applies pending migrations.
    ///
    /// File databases run in WAL mode so projections can read while an
    /// ingestion transaction is open in another process.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(options.busy_timeout)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Self::initialize_connection(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        Self::initialize_connection(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    fn initialize_connection(conn: &mut Connection) -> Result<(), StoreError> {
        // Foreign keys are per connection and cannot change inside a
        // transaction, so they are set before migrating.
        conn.pragma_update(None, "foreign_keys", true)?;
        let version = schema::migrate(conn)?;
        debug!(schema_version = version, "Store connection initialized");
        Ok(())
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Runs `f` inside an `IMMEDIATE` transaction.
    ///
    /// The transaction commits if `f` returns `Ok` and rolls back otherwise.
    /// `IMMEDIATE` takes the write lock up front, so read-then-write
    /// sequences inside `f` cannot interleave with another writer.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a [`StoreError`] (converted into `E`)
    /// if the transaction cannot be opened or committed.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Runs a read-only closure against the connection.
    ///
    /// # Errors
    ///
    /// Returns the closure's error or [`StoreError::LockPoisoned`].
    pub fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Applied schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma cannot be read.
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        self.read(schema::version)
    }

    /// All products, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn products(&self) -> Result<Vec<Product>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM products ORDER BY created_at_ns ASC, id ASC",
                graph::PRODUCT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], graph::product_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All links in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn links(&self) -> Result<Vec<Link>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM links ORDER BY id ASC",
                graph::LINK_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], graph::link_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All engagements in insertion order, raw reports included.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn engagements(&self) -> Result<Vec<Engagement>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM engagements ORDER BY id ASC",
                ledger::ENGAGEMENT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], ledger::engagement_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All vulnerabilities in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn vulnerabilities(&self) -> Result<Vec<Vulnerability>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM vulnerabilities ORDER BY id ASC",
                ledger::VULNERABILITY_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], ledger::vulnerability_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Looks up one product.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        self.read(|conn| graph::find_product(conn, id))
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub(crate) fn get_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}
