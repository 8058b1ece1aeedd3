//! SQLite storage: connection pool and versioned migrations
//!
//! ```ignore
//! use newsgraph_core::storage::{Database, DatabaseConfig};
//!
//! let db = Database::new(DatabaseConfig::with_path("graph.db")).await?;
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, DatabaseLocation, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
