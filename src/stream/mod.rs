//! Real-time streaming connections.
//!
//! This module provides a single-stream connection manager with heartbeat, bounded
//! fixed-interval reconnection and serialized writes.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: owns the [`ConnectionState`] and coordinates everything below
//! - Heartbeat driver: pings on [`Config::heartbeat_interval`] while connected
//! - Receive loop: hands inbound text to the [`Handler`] and detects disconnects
//! - Reconnect supervisor: retries up to [`Config::max_reconnect_attempts`] times
//! - [`Transport`]: opens the underlying channel, [`TungsteniteTransport`] by default
//!
//! # Example
//!
//! ```rust, no_run
//! use tavo_client_sdk::auth::Credentials;
//! use tavo_client_sdk::stream::{Callbacks, Config, ConnectionManager, endpoint};
//!
//! # async fn run() -> tavo_client_sdk::Result<()> {
//! let url = endpoint::stream_url(
//!     "https://api.tavoai.net",
//!     &endpoint::scan_progress("scan-42")?,
//! )?;
//! let connection = ConnectionManager::new(
//!     url,
//!     Config::default(),
//!     &Credentials::bearer_token("jwt"),
//!     Callbacks::new().on_message(|text| {
//!         println!("progress: {text}");
//!         Ok(())
//!     }),
//! )?;
//! connection.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod transport;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState, RetryState};
#[expect(
    clippy::module_name_repetitions,
    reason = "StreamError includes module name for clarity when used outside this module"
)]
pub use error::StreamError;
pub use handler::{Callbacks, Handler, HandlerResult, NoopHandler};
pub use transport::{
    Channel, Frame, FrameSink, FrameSource, NORMAL_CLOSURE, Transport, TungsteniteTransport,
};
