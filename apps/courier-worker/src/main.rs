//! Courier Worker - Entry Point
//!
//! Background worker that consumes notification-request events and drives
//! delivery with retries.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    courier_worker::run().await
}
