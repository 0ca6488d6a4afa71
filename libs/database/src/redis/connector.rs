use redis::aio::ConnectionManager;
use tracing::info;

use crate::common::{retry_with_backoff, DatabaseResult, RetryConfig};

/// Connect to Redis and return a ConnectionManager.
///
/// The manager re-establishes the underlying connection transparently, so
/// callers can clone it freely and hold it for the process lifetime.
pub async fn connect(uri: &str) -> DatabaseResult<ConnectionManager> {
    let client = redis::Client::open(uri)?;
    let manager = ConnectionManager::new(client).await?;

    info!("Connected to Redis");

    Ok(manager)
}

/// Connect to Redis, retrying with backoff on failure.
///
/// Pass `None` to use the default retry policy.
pub async fn connect_with_retry(
    uri: &str,
    retry: Option<RetryConfig>,
) -> DatabaseResult<ConnectionManager> {
    let retry = retry.unwrap_or_default();
    retry_with_backoff(|| connect(uri), retry).await
}
