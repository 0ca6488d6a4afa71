use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{info, log::LevelFilter};

use super::SqliteConfig;
use crate::common::{retry_with_backoff, DatabaseError, DatabaseResult, RetryConfig};

/// Connect to a SQLite database file with the default pool settings.
pub async fn connect(path: &str) -> DatabaseResult<DatabaseConnection> {
    connect_from_config(SqliteConfig::new(path)).await
}

/// Connect using a SqliteConfig.
///
/// Applies the journal pragmas after the pool opens: WAL so concurrent
/// readers never block the writer, NORMAL synchronous (safe under WAL), and
/// the configured busy timeout so writers queue instead of failing fast.
pub async fn connect_from_config(config: SqliteConfig) -> DatabaseResult<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.url());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(config.sqlx_logging)
        .sqlx_logging_level(LevelFilter::Debug);

    let db = Database::connect(options).await?;

    db.execute_unprepared(&format!(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA busy_timeout = {}; \
         PRAGMA foreign_keys = ON;",
        config.busy_timeout_ms
    ))
    .await?;

    info!(path = %config.path, "Connected to SQLite database");

    Ok(db)
}

/// Connect using a SqliteConfig, retrying with backoff on failure.
///
/// Pass `None` to use the default retry policy.
pub async fn connect_from_config_with_retry(
    config: SqliteConfig,
    retry: Option<RetryConfig>,
) -> DatabaseResult<DatabaseConnection> {
    let retry = retry.unwrap_or_default();
    retry_with_backoff(|| connect_from_config(config.clone()), retry).await
}

/// Connect to a fresh in-memory database.
///
/// The pool is pinned to a single connection: every pooled connection to
/// `:memory:` would otherwise see its own private database.
pub async fn connect_in_memory() -> DatabaseResult<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1);

    let db = Database::connect(options).await?;
    db.execute_unprepared("PRAGMA foreign_keys = ON;").await?;

    Ok(db)
}

/// Run pending migrations for the given migrator.
pub async fn run_migrations<M: MigratorTrait>(db: &DatabaseConnection) -> DatabaseResult<()> {
    M::up(db, None)
        .await
        .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;

    info!("Database migrations applied");
    Ok(())
}
