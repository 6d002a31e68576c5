//! Lifecycle callbacks invoked by the [`ConnectionManager`](super::ConnectionManager).

use std::error::Error as StdError;
use std::fmt;

use crate::error::Error;

/// Outcome of handling one inbound payload.
pub type HandlerResult = std::result::Result<(), Box<dyn StdError + Send + Sync + 'static>>;

/// Receives inbound payloads and lifecycle notifications for one stream.
///
/// All methods run on the connection's background tasks. `on_message` runs on the receive loop
/// itself, so it must return quickly; hand heavy work to a channel or a spawned task. An error
/// returned from `on_message`, or a panic inside it, is reported through `on_error` and the
/// next payload is still delivered.
///
/// Every method has a no-op default.
pub trait Handler: Send + Sync + 'static {
    /// A text payload, exactly as received.
    fn on_message(&self, text: &str) -> HandlerResult {
        let _ = text;
        Ok(())
    }

    /// A failure that has no synchronous caller to return to.
    fn on_error(&self, error: &Error) {
        let _ = error;
    }

    /// The stream was established, initially or after a reconnect.
    fn on_connect(&self) {}

    /// The stream ended for good: after `disconnect`, or once reconnection gave up.
    fn on_disconnect(&self) {}
}

/// A [`Handler`] that ignores everything.
#[expect(
    clippy::exhaustive_structs,
    reason = "Unit struct that callers construct by name"
)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl Handler for NoopHandler {}

type MessageFn = Box<dyn Fn(&str) -> HandlerResult + Send + Sync>;
type ErrorFn = Box<dyn Fn(&Error) + Send + Sync>;
type LifecycleFn = Box<dyn Fn() + Send + Sync>;

/// Closure-based [`Handler`], for callers that do not want to define a type.
///
/// ```rust
/// use tavo_client_sdk::stream::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_message(|text| {
///         println!("{text}");
///         Ok(())
///     })
///     .on_error(|error| eprintln!("stream error: {error}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    message: Option<MessageFn>,
    error: Option<ErrorFn>,
    connect: Option<LifecycleFn>,
    disconnect: Option<LifecycleFn>,
}

impl Callbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        self.message = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.connect = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.disconnect = Some(Box::new(f));
        self
    }
}

impl Handler for Callbacks {
    fn on_message(&self, text: &str) -> HandlerResult {
        self.message.as_ref().map_or(Ok(()), |f| f(text))
    }

    fn on_error(&self, error: &Error) {
        if let Some(f) = &self.error {
            f(error);
        }
    }

    fn on_connect(&self) {
        if let Some(f) = &self.connect {
            f();
        }
    }

    fn on_disconnect(&self) {
        if let Some(f) = &self.disconnect {
            f();
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_message", &self.message.is_some())
            .field("on_error", &self.error.is_some())
            .field("on_connect", &self.connect.is_some())
            .field("on_disconnect", &self.disconnect.is_some())
            .finish()
    }
}
