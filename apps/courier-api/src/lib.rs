//! Courier API Service
//!
//! Thin HTTP facade over the notification service for callers that cannot
//! publish to the event bus. `POST /notifications` durably records the
//! request and returns immediately; delivery happens asynchronously, exactly
//! as it does for events. `GET /notifications/{id}` exposes the stored
//! record for audit.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use core_config::{server::ServerConfig, Environment, FromEnv};
use database::sqlite::{self, SqliteConfig};
use domain_notifications::{
    providers, Content, NotificationError, NotificationKind, NotificationService, Recipient,
    SqliteNotificationRepository,
};
use eyre::{Result, WrapErr};
use migration::Migrator;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

pub struct AppState {
    service: NotificationService<SqliteNotificationRepository>,
    api_key: String,
}

/// Run the API server.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?environment,
        "Starting courier api"
    );

    let sqlite_config =
        SqliteConfig::from_env().wrap_err("Failed to load SQLite configuration")?;
    let db = sqlite::connect_from_config_with_retry(sqlite_config, None)
        .await
        .wrap_err("Failed to connect to SQLite")?;
    sqlite::run_migrations::<Migrator>(&db)
        .await
        .wrap_err("Failed to run database migrations")?;

    let provider_registry =
        providers::registry_from_env().wrap_err("Failed to build provider registry")?;
    let repository = SqliteNotificationRepository::new(db);
    let service = NotificationService::new(repository, provider_registry);

    let api_key = std::env::var("API_KEY").unwrap_or_default();
    let state = Arc::new(AppState { service, api_key });

    let server_config = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let listener = TcpListener::bind(server_config.address())
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", server_config.address()))?;

    info!(address = %server_config.address(), "Courier api listening");

    axum::serve(listener, router(state))
        .await
        .wrap_err("Server failed")?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/notifications", post(create_notification))
        .route("/notifications/{id}", get(get_notification))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Reject requests without the expected `X-API-Key` header.
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.api_key.is_empty() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "API_KEY not configured on server",
        )
            .into_response();
    }

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == state.api_key => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, "unauthorized").into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RecipientBody {
    id: String,
    email: Option<String>,
    phone: Option<String>,
    device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    title: String,
    body: Option<String>,
    data: Option<serde_json::Value>,
    html: Option<String>,
    template: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateNotificationBody {
    /// Caller-supplied id; generated when absent. Reusing an id makes the
    /// request idempotent.
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    recipient: RecipientBody,
    content: ContentBody,
    max_retries: Option<i32>,
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateNotificationBody>,
) -> Result<Response, ApiError> {
    let kind: NotificationKind = body
        .kind
        .parse()
        .map_err(|_| NotificationError::Validation(format!("unknown type: {}", body.kind)))?;

    let recipient = Recipient::new(
        body.recipient.id,
        body.recipient.email,
        body.recipient.phone,
        body.recipient.device_id,
    )?;
    let content = Content::new(
        body.content.title,
        body.content.body,
        body.content.data,
        body.content.html,
        body.content.template,
    )?;

    let id = body
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let max_retries = body.max_retries.unwrap_or(-1);

    let provider = state
        .service
        .provider_for(kind)
        .map(|p| p.name())
        .ok_or(NotificationError::NoProvider(kind))?;

    state
        .service
        .process_notification(id.clone(), kind, recipient, content, max_retries)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "accepted",
            "id": id,
            "provider": provider,
        })),
    )
        .into_response())
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let notification = state.service.find_notification(&id).await?;
    Ok(Json(notification).into_response())
}

/// Maps domain errors onto HTTP statuses.
struct ApiError(NotificationError);

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NotificationError::Validation(_) | NotificationError::UnsupportedEvent(_) => {
                StatusCode::BAD_REQUEST
            }
            NotificationError::NotFound(_) => StatusCode::NOT_FOUND,
            NotificationError::Conflict(_) => StatusCode::CONFLICT,
            NotificationError::NoProvider(_) | NotificationError::NotEligible(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
