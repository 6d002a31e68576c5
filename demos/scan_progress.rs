//! Follows the progress of one scan over the streaming API.
//!
//! This example shows how to:
//! 1. Build a [`Client`] from environment variables
//! 2. Open the scan progress stream with closure callbacks
//! 3. Parse inbound payloads into typed events and stop on a terminal one
//!
//! Run with tracing enabled:
//! ```sh
//! TAVO_API_KEY=... RUST_LOG=info,tavo_client_sdk=debug cargo run --example scan_progress --features tracing -- <scan-id>
//! ```
//!
//! Point at another deployment with `TAVO_BASE_URL=http://localhost:8000`.

use std::env;

use tavo_client_sdk::auth::Credentials;
use tavo_client_sdk::stream::{Callbacks, Config};
use tavo_client_sdk::types::StreamEvent;
use tavo_client_sdk::{API_KEY_VAR, BASE_URL_VAR, Client, DEFAULT_BASE_URL};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let scan_id = env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: scan_progress <scan-id>"))?;
    let api_key = env::var(API_KEY_VAR)?;
    let base_url = env::var(BASE_URL_VAR).unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());

    let client = Client::new(&base_url, Credentials::api_key(api_key), Config::default())?;

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<StreamEvent>();
    let callbacks = Callbacks::new()
        .on_message(move |text| {
            let event: StreamEvent = text.parse()?;
            match &event {
                StreamEvent::ScanProgress {
                    progress, status, ..
                } => info!(progress, %status, "Scan progress"),
                StreamEvent::Heartbeat { server_time } => info!(server_time, "Server heartbeat"),
                other => info!(?other, "Stream event"),
            }
            if event.is_terminal() {
                _ = done_tx.send(event);
            }
            Ok(())
        })
        .on_error(|e| warn!(error = %e, kind = %e.kind(), "Stream error"))
        .on_connect(|| info!("Connected"))
        .on_disconnect(|| info!("Disconnected"));

    let stream = client.scan_progress(&scan_id, callbacks)?;
    stream.connect().await?;

    tokio::select! {
        event = done_rx.recv() => match event {
            Some(StreamEvent::ScanError { error_message, .. }) => error!(%error_message, "Scan failed"),
            Some(event) => info!(?event, "Scan finished"),
            None => {}
        },
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    stream.disconnect().await;
    Ok(())
}
