//! Database layer
//!
//! SQLite (default, single file) or MySQL, selected by configuration.
//! Everything above this module talks to the `DatabasePool` trait and the
//! repository traits, never to a concrete driver.
//!
//! ```ignore
//! use mutadi::config::DatabaseConfig;
//! use mutadi::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool};
