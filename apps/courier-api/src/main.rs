//! Courier API - Entry Point
//!
//! Thin authenticated HTTP facade over the notification service.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    courier_api::run().await
}
