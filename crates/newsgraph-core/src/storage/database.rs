//! SQLite connection pool for the graph and document stores

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::info;

use crate::config::DatabaseSettings;
use crate::storage::migrations::{self, MigrationStatus};

/// How long a writer waits on a locked database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    /// Private in-memory database, one connection
    Memory,
}

/// Pool options for [`Database::new`]
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub location: DatabaseLocation,
    pub max_connections: u32,
    /// Waiting longer than this for a connection surfaces as a store outage
    pub acquire_timeout: Duration,
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::from_settings(&DatabaseSettings::default())
    }
}

impl DatabaseConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(path.into()),
            ..Default::default()
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::Memory,
            max_connections: 1,
            ..Default::default()
        }
    }

    /// Pool options from the `[database]` config section
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self {
            location: DatabaseLocation::File(
                settings.path.clone().unwrap_or_else(default_database_path),
            ),
            max_connections: settings.max_connections.max(1),
            acquire_timeout: Duration::from_secs(settings.acquire_timeout_secs),
            auto_migrate: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let options = match &self.location {
            DatabaseLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")?,
            DatabaseLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                // WAL lets queries read while a maintenance pass writes
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
        };
        Ok(options.foreign_keys(true).busy_timeout(BUSY_TIMEOUT))
    }
}

/// `newsgraph/newsgraph.db` under the platform data directory
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("newsgraph"))
        .unwrap_or_default()
        .join("newsgraph.db")
}

/// An open, migrated connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        if let DatabaseLocation::File(path) = &config.location
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options()?)
            .await
            .with_context(|| format!("Failed to open database {:?}", config.location))?;

        info!(
            location = ?config.location,
            max_connections = config.max_connections,
            "Database opened"
        );

        let database = Self { pool, config };
        if database.config.auto_migrate {
            migrations::run_migrations(&database.pool)
                .await
                .context("Failed to migrate database")?;
        }
        Ok(database)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        migrations::migration_status(&self.pool).await
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database did not answer")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
