//! `SQLite` connection pool for the alert store.
//!
//! Opening a [`Database`] applies the embedded migrations, so a fresh file is
//! ready for the `emails` and `search_results` collections. File databases
//! run in WAL mode with foreign keys enforced; the in-memory variant used by
//! tests holds a single connection, since every new connection would see an
//! empty database.
//!
//! # Example
//!
//! ```no_run
//! use alertminer_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("alertminer.db")).await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// Pool size for file databases. The pipeline is sequential, so a few
/// connections cover the store plus an occasional concurrent reader.
const MAX_CONNECTIONS: u32 = 4;

/// How long a connection waits on a locked database before `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// The parent directory of the database file could not be created.
    #[error("cannot create database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Handle to the migrated alert database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database file at `db_path`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Directory`] if the parent directory cannot be
    /// created, [`DbError::Connection`] if the connection fails, or
    /// [`DbError::Migration`] if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DbError::Directory {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    /// Opens a private in-memory database with the schema applied.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the connection fails, or
    /// [`DbError::Migration`] if migrations fail.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("database migrations applied");
        Ok(Self { pool })
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reports whether the database runs in WAL journal mode.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the query fails.
    #[instrument(skip(self))]
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;

        Ok(mode.eq_ignore_ascii_case("wal"))
    }

    /// Closes every pooled connection, checkpointing the WAL.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}
