#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Constant;
use bon::Builder;

const DEFAULT_RECONNECT_INTERVAL_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_WRITE_TIMEOUT_DURATION: Duration = Duration::from_secs(10);

/// Configuration for a streaming connection.
///
/// Keep `heartbeat_interval` below the server's idle timeout and below `read_timeout`;
/// neither relationship is enforced here.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Fixed delay before each reconnection attempt
    #[builder(default = DEFAULT_RECONNECT_INTERVAL_DURATION)]
    pub reconnect_interval: Duration,
    /// Reconnection attempts after an unexpected disconnect. `0` disables reconnection.
    #[builder(default = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    pub max_reconnect_attempts: u32,
    /// Interval between keepalive pings while connected
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Upper bound for a single frame read, and for the opening handshake
    #[builder(default = DEFAULT_READ_TIMEOUT_DURATION)]
    pub read_timeout: Duration,
    /// Upper bound for a single frame write
    #[builder(default = DEFAULT_WRITE_TIMEOUT_DURATION)]
    pub write_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// The backoff policy used between reconnection attempts.
    #[must_use]
    pub(crate) fn backoff(&self) -> Constant {
        Constant::new(self.reconnect_interval)
    }
}
