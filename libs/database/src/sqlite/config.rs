#[cfg(feature = "config")]
use core_config::{env_or_default, env_parse_or_default, ConfigError, FromEnv};

/// SQLite database configuration.
///
/// The pool is deliberately bounded: the store may be shared by several
/// service instances, and SQLite's WAL mode only allows a single writer at a
/// time. Cross-request coordination happens through optimistic versioning in
/// the schema, never through in-process locks.
#[derive(Clone, Debug)]
pub struct SqliteConfig {
    /// Path to the database file
    pub path: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Busy timeout handed to SQLite, in milliseconds
    pub busy_timeout_ms: u32,

    /// Enable SQL query logging
    pub sqlx_logging: bool,
}

impl SqliteConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_connections: 25,
            min_connections: 1,
            busy_timeout_ms: 5000,
            sqlx_logging: false,
        }
    }

    pub fn with_pool_size(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Connection URL in the form SeaORM expects, creating the file on
    /// first open.
    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path)
    }
}

/// Load SqliteConfig from environment variables
///
/// Environment variables:
/// - `SQLITE_PATH` (optional, default: notifications.db)
/// - `SQLITE_MAX_CONNECTIONS` (optional, default: 25)
/// - `SQLITE_BUSY_TIMEOUT_MS` (optional, default: 5000)
#[cfg(feature = "config")]
impl FromEnv for SqliteConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            path: env_or_default("SQLITE_PATH", "notifications.db"),
            max_connections: env_parse_or_default("SQLITE_MAX_CONNECTIONS", 25)?,
            min_connections: 1,
            busy_timeout_ms: env_parse_or_default("SQLITE_BUSY_TIMEOUT_MS", 5000)?,
            sqlx_logging: false,
        })
    }
}
