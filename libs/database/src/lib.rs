//! Database library providing connectors for SQLite and Redis.
//!
//! # Features
//!
//! - `sqlite` (default) - SQLite support with SeaORM (WAL journal, bounded pool)
//! - `redis` (default) - Redis support (connection manager)
//! - `config` - Configuration support with `core_config::FromEnv`
//! - `all` - Everything
//!
//! # Examples
//!
//! ## SQLite
//!
//! ```ignore
//! use database::sqlite;
//! use migration::Migrator;
//!
//! let db = sqlite::connect("notifications.db").await?;
//! sqlite::run_migrations::<Migrator>(&db).await?;
//! ```
//!
//! ## Redis
//!
//! ```ignore
//! let redis = database::redis::connect("redis://127.0.0.1:6379").await?;
//! ```

pub mod common;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "redis")]
pub mod redis;

pub use common::{DatabaseError, DatabaseResult};
