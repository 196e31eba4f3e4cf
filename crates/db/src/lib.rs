// crates/db/src/lib.rs
//! SQLite-backed session store for the molecular pipeline.
//!
//! One row per pipeline run. The store is the durable source of truth for
//! session state: live subscribers see the same progression over the bus,
//! but anyone who reconnects late (or after a server restart) reads from
//! here.

mod migrations;
mod sessions;

pub use sessions::{SessionRecord, SessionStatus, SessionSummary};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to determine data directory")]
    NoDataDir,

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} already reached a terminal status")]
    TerminalSession(String),

    #[error("Failed to encode session payload: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Main database handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Open the database at the default platform location, honoring the
    /// `MOLECULAR_PIPELINE_DB` override.
    pub async fn open_default() -> DbResult<Self> {
        let path = match std::env::var("MOLECULAR_PIPELINE_DB") {
            Ok(p) => PathBuf::from(p),
            Err(_) => dirs::data_dir()
                .ok_or(DbError::NoDataDir)?
                .join("molecular-pipeline")
                .join("sessions.db"),
        };
        Self::new(&path).await
    }

    /// Create an in-memory database (for testing).
    ///
    /// Uses `shared_cache(true)` so all pool connections share the same
    /// in-memory database.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> DbResult<()> {
        for statement in migrations::MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
