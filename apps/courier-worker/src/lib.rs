//! Courier Worker Service
//!
//! The delivery tier behind the event bus:
//!
//! ```text
//! Redis Stream (notifications:requested)
//!   ↓ (consumer group: notification-service)
//! EventConsumer → NotificationService → SQLite
//!                        ↓
//!                  Provider registry (smtp / sms / push)
//!                        ↑
//!                  RetryScheduler (periodic sweep, exponential backoff)
//! ```
//!
//! The consumer and the scheduler share one service instance and one store;
//! coordination between them happens entirely through the optimistic version
//! column, so additional worker processes can point at the same database.

use axum::{routing::get, Json, Router};
use core_config::{Environment, FromEnv};
use database::sqlite::{self, SqliteConfig};
use domain_notifications::{
    providers, ConsumerConfig, EventConsumer, EventHandler, HttpContactSource,
    NotificationService, RetryScheduler, SchedulerConfig, SqliteNotificationRepository,
};
use eyre::{Result, WrapErr};
use migration::Migrator;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Start the health HTTP server used by liveness probes.
async fn start_health_server(port: u16) -> Result<()> {
    let app: Router = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {addr}"))?;

    info!(port = port, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Run the worker: connect storage and the event stream, then consume until
/// SIGINT/SIGTERM.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?environment,
        "Starting courier worker"
    );

    let health_port: u16 = std::env::var("WORKER_HEALTH_PORT")
        .or_else(|_| std::env::var("HEALTH_PORT"))
        .unwrap_or_else(|_| "8081".to_string())
        .parse()
        .unwrap_or(8081);

    // Storage: SQLite with WAL journal and a bounded pool.
    let sqlite_config =
        SqliteConfig::from_env().wrap_err("Failed to load SQLite configuration")?;
    info!(path = %sqlite_config.path, "Connecting to SQLite...");
    let db = sqlite::connect_from_config_with_retry(sqlite_config, None)
        .await
        .wrap_err("Failed to connect to SQLite")?;
    sqlite::run_migrations::<Migrator>(&db)
        .await
        .wrap_err("Failed to run database migrations")?;

    // Event stream.
    let redis_config =
        core_config::redis::RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    info!("Connecting to Redis...");
    let redis = database::redis::connect_with_retry(&redis_config.uri, None)
        .await
        .wrap_err("Failed to connect to Redis")?;

    // Collaborators: provider registry and contact lookup.
    let provider_registry =
        providers::registry_from_env().wrap_err("Failed to build provider registry")?;
    for provider in &provider_registry {
        info!(provider = provider.name(), "Registered notification provider");
    }
    let contacts =
        Arc::new(HttpContactSource::from_env().wrap_err("Failed to configure contact lookup")?);

    let repository = SqliteNotificationRepository::new(db);
    let service = NotificationService::new(repository, provider_registry);

    let consumer_config = ConsumerConfig::default();
    info!(
        stream = %consumer_config.stream_name,
        consumer_group = %consumer_config.consumer_group,
        consumer_id = %consumer_config.consumer_id,
        "Consumer configuration loaded"
    );
    let handler = EventHandler::new(service.clone(), contacts);
    let consumer = EventConsumer::new(redis, handler, consumer_config);

    let scheduler = RetryScheduler::new(service, SchedulerConfig::default());

    // Shutdown propagation: one watch channel feeds the consumer loop and
    // the scheduler loop. In-flight sends are not awaited.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    let scheduler_shutdown = shutdown_rx.clone();
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run(scheduler_shutdown).await {
            error!(error = %e, "Retry scheduler failed");
        }
    });

    consumer
        .run(shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{e}"))?;

    // The consumer exits only on shutdown; give the scheduler its turn to
    // notice the same signal.
    let _ = scheduler_handle.await;

    info!("Courier worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
