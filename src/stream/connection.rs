#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use backoff::backoff::{Backoff as _, Constant};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

use super::config::Config;
use super::error::StreamError;
use super::handler::Handler;
use super::transport::{
    Channel, Frame, FrameSink, FrameSource, NORMAL_CLOSURE, Transport, TungsteniteTransport,
};
use crate::Result;
use crate::auth::Credentials;
use crate::error::{Error, Kind};
use crate::types::OutboundMessage;

/// A write failure tagged with the generation of the channel it happened on.
type Failure = (u64, Error);

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionState {
    /// Not connected; a fresh `connect` is allowed
    Disconnected,
    /// Initial handshake in progress
    Connecting,
    /// Successfully connected
    Connected,
    /// Re-establishing the stream after an unexpected disconnect
    Reconnecting,
    /// Shut down by the caller. No automatic transition leaves this state.
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Progress of the reconnect supervisor. Reset whenever the stream is (re)established.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Reconnection attempts made since the stream was last connected
    pub attempt: u32,
    /// Delay before the most recently scheduled attempt
    pub next_delay: Option<Duration>,
}

/// Manages a single streaming connection: handshake, heartbeat, receive loop and reconnection.
///
/// Inbound text frames are handed to the [`Handler`] in arrival order. Outbound messages are
/// written one at a time, in the order [`send`](Self::send) is called. After an unexpected
/// disconnect the manager retries up to [`Config::max_reconnect_attempts`] times, waiting
/// [`Config::reconnect_interval`] before each attempt; an explicit [`connect`](Self::connect)
/// failure is returned and never retried.
///
/// The manager is cheap to clone; all clones drive the same stream. Background tasks stop once
/// [`disconnect`](Self::disconnect) is called or every clone has been dropped.
///
/// # Example
///
/// ```rust, no_run
/// use tavo_client_sdk::auth::Credentials;
/// use tavo_client_sdk::stream::{Callbacks, Config, ConnectionManager, endpoint};
///
/// # async fn run() -> tavo_client_sdk::Result<()> {
/// let url = endpoint::stream_url("https://api.tavoai.net", endpoint::GENERAL_UPDATES)?;
/// let handler = Callbacks::new().on_message(|text| {
///     println!("{text}");
///     Ok(())
/// });
/// let connection = ConnectionManager::new(
///     url,
///     Config::default(),
///     &Credentials::api_key("my-key"),
///     handler,
/// )?;
///
/// connection.connect().await?;
/// connection.send("ping", serde_json::json!({})).await?;
/// connection.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
    /// Cancels every background task once the last clone is dropped
    _shutdown: Arc<DropGuard>,
}

struct Inner {
    url: Url,
    headers: HeaderMap,
    config: Config,
    transport: Box<dyn Transport>,
    handler: Box<dyn Handler>,
    /// Single source of truth for [`ConnectionState`]; every transition goes through it
    state_tx: watch::Sender<ConnectionState>,
    retry: Mutex<RetryState>,
    /// Write half of the live channel. The async mutex serializes writers in FIFO order.
    writer: AsyncMutex<Option<Writer>>,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

struct Writer {
    sink: Box<dyn FrameSink>,
    generation: u64,
    failures: mpsc::UnboundedSender<Failure>,
}

/// One `connect` call's worth of background work.
struct Session {
    lifetime: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create a manager for `url` using the default WebSocket transport.
    ///
    /// No I/O happens until [`connect`](Self::connect) is called. Fails if a credential is not
    /// a valid header value.
    pub fn new(
        url: Url,
        config: Config,
        credentials: &Credentials,
        handler: impl Handler,
    ) -> Result<Self> {
        Self::with_transport(url, config, credentials, handler, TungsteniteTransport)
    }

    /// Create a manager that opens its channels through `transport`.
    pub fn with_transport(
        url: Url,
        config: Config,
        credentials: &Credentials,
        handler: impl Handler,
        transport: impl Transport,
    ) -> Result<Self> {
        let headers = credentials.headers()?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shutdown = CancellationToken::new();

        Ok(Self {
            _shutdown: Arc::new(shutdown.clone().drop_guard()),
            inner: Arc::new(Inner {
                url,
                headers,
                config,
                transport: Box::new(transport),
                handler: Box::new(handler),
                state_tx,
                retry: Mutex::new(RetryState::default()),
                writer: AsyncMutex::new(None),
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
                shutdown,
            }),
        })
    }

    /// Establish the stream.
    ///
    /// Allowed from [`ConnectionState::Disconnected`] and [`ConnectionState::Closed`]. On success
    /// the heartbeat driver and receive loop are running and `on_connect` has been called. On
    /// failure `on_error` is called, the state returns to `Disconnected` and the error is
    /// returned without any retry.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;

        let mut previous = ConnectionState::Disconnected;
        let began = inner.state_tx.send_if_modified(|state| {
            previous = *state;
            if matches!(
                state,
                ConnectionState::Disconnected | ConnectionState::Closed
            ) {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !began {
            return Err(Error::validation(format!(
                "cannot connect while the stream is {previous}"
            )));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %inner.url, "Connecting stream");

        let lifetime = inner.shutdown.child_token();
        if let Some(stale) = inner.session().replace(Session {
            lifetime: lifetime.clone(),
            task: None,
        }) {
            stale.lifetime.cancel();
        }

        let channel = match inner.open_channel(&lifetime).await {
            Ok(channel) => channel,
            Err(e) => {
                inner.transition_unless_closed(ConnectionState::Disconnected);
                #[cfg(feature = "tracing")]
                tracing::warn!(url = %inner.url, error = %e, "Unable to connect");
                inner.handler.on_error(&e);
                return Err(e);
            }
        };

        let Channel { sink, source } = channel;
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let generation = inner.next_generation();
        if !inner.install(sink, generation, failures_tx.clone()).await {
            let e = Error::with_source(Kind::Connect, StreamError::ClosedDuringConnect);
            inner.handler.on_error(&e);
            return Err(e);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(url = %inner.url, "Stream connected");
        inner.handler.on_connect();

        let task = tokio::spawn(Arc::clone(inner).run_session(
            source,
            generation,
            failures_tx,
            failures_rx,
            lifetime.clone(),
        ));
        if let Some(session) = inner.session().as_mut()
            && !session.lifetime.is_cancelled()
        {
            session.task = Some(task);
        }

        Ok(())
    }

    /// Send `data` wrapped in an [`OutboundMessage`] envelope of type `message_type`.
    ///
    /// Fails with a [`Kind::Send`] error, without touching the transport, unless the stream is
    /// [`ConnectionState::Connected`]. A write that fails or exceeds the write timeout is
    /// returned here and also treated as a lost connection, which starts reconnection.
    pub async fn send(&self, message_type: &str, data: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::not_connected());
        }

        let message = OutboundMessage::new(message_type, data);
        let text = serde_json::to_string(&message)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Sending stream message");

        self.inner.write(Frame::Text(text)).await
    }

    /// Shut the stream down.
    ///
    /// Moves to [`ConnectionState::Closed`], stops the heartbeat driver, the receive loop and any
    /// reconnection in progress, closes the channel with a normal-closure code and calls
    /// `on_disconnect`, whatever the previous state was, including a manager that never
    /// connected. Background tasks have finished when this returns. Calling it again is a no-op.
    /// [`connect`](Self::connect) may be used afterwards to start a new session.
    pub async fn disconnect(&self) {
        let inner = &self.inner;

        let mut previous = ConnectionState::Closed;
        inner.state_tx.send_if_modified(|state| {
            previous = *state;
            if state.is_closed() {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        });
        if previous.is_closed() {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %inner.url, %previous, "Disconnecting stream");

        let session = inner.session().take();
        if let Some(session) = &session {
            session.lifetime.cancel();
        }

        let writer = inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let closing = writer.sink.close(NORMAL_CLOSURE, "normal closure");
            match timeout(inner.config.write_timeout, closing).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %e, "Close handshake failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Close handshake timed out");
                }
            }
        }

        if let Some(Session {
            task: Some(task), ..
        }) = session
        {
            _ = task.await;
        }

        inner.handler.on_disconnect();
    }

    /// `true` while the stream is [`ConnectionState::Connected`].
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    #[must_use]
    pub fn retry_state(&self) -> RetryState {
        *self.inner.retry()
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Move to `next` unless the caller has closed the stream. Returns `false` if closed.
    fn transition_unless_closed(&self, next: ConnectionState) -> bool {
        let mut applied = false;
        self.state_tx.send_if_modified(|state| {
            if state.is_closed() {
                return false;
            }
            applied = true;
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        applied
    }

    fn retry(&self) -> MutexGuard<'_, RetryState> {
        self.retry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Perform the handshake, bounded by the read timeout and abandoned on cancellation.
    async fn open_channel(&self, lifetime: &CancellationToken) -> Result<Channel> {
        let handshake = timeout(
            self.config.read_timeout,
            self.transport.open(&self.url, &self.headers),
        );

        tokio::select! {
            biased;
            () = lifetime.cancelled() => {
                Err(Error::with_source(Kind::Connect, StreamError::ClosedDuringConnect))
            }
            opened = handshake => opened.unwrap_or_else(|_| {
                Err(Error::with_source(
                    Kind::Connect,
                    StreamError::HandshakeTimeout(self.config.read_timeout),
                ))
            }),
        }
    }

    /// Make `sink` the live writer and mark the stream connected.
    ///
    /// Both happen under the writer lock so a `send` that observes `Connected` always finds the
    /// new sink. If the stream was closed meanwhile, the sink is closed and `false` returned.
    async fn install(
        &self,
        sink: Box<dyn FrameSink>,
        generation: u64,
        failures: mpsc::UnboundedSender<Failure>,
    ) -> bool {
        let mut writer = self.writer.lock().await;
        if !self.transition_unless_closed(ConnectionState::Connected) {
            drop(writer);
            let mut sink = sink;
            _ = timeout(
                self.config.write_timeout,
                sink.close(NORMAL_CLOSURE, "normal closure"),
            )
            .await;
            return false;
        }

        *writer = Some(Writer {
            sink,
            generation,
            failures,
        });
        *self.retry() = RetryState::default();
        true
    }

    /// Write one frame through the live writer, bounded by the write timeout.
    ///
    /// On failure the writer is dropped and the session is told the channel is broken.
    async fn write(&self, frame: Frame) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(Error::not_connected());
        };

        let result = match timeout(self.config.write_timeout, writer.sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(Error::with_source(
                Kind::Send,
                StreamError::WriteTimeout(self.config.write_timeout),
            )),
        };

        if let Err(e) = &result
            && let Some(broken) = guard.take()
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, generation = broken.generation, "Stream write failed");
            let failure = Error::with_source(Kind::Send, StreamError::WriteFailed(e.to_string()));
            _ = broken.failures.send((broken.generation, failure));
        }

        result
    }

    /// Drives one `connect` call: receive loop and heartbeat per channel, then reconnection.
    async fn run_session(
        self: Arc<Self>,
        mut source: Box<dyn FrameSource>,
        mut generation: u64,
        failures_tx: mpsc::UnboundedSender<Failure>,
        mut failures_rx: mpsc::UnboundedReceiver<Failure>,
        lifetime: CancellationToken,
    ) {
        loop {
            let connection = lifetime.child_token();
            let heartbeat = tokio::spawn(Arc::clone(&self).heartbeat_loop(connection.clone()));

            let outcome = self
                .receive_loop(source.as_mut(), generation, &mut failures_rx, &connection)
                .await;

            connection.cancel();
            _ = heartbeat.await;

            let Err(error) = outcome else {
                return;
            };

            {
                let mut writer = self.writer.lock().await;
                if writer.as_ref().is_some_and(|w| w.generation == generation) {
                    writer.take();
                }
            }

            if lifetime.is_cancelled() || self.state().is_closed() {
                return;
            }

            #[cfg(feature = "tracing")]
            tracing::warn!(url = %self.url, error = %error, "Stream disconnected unexpectedly");
            self.handler.on_error(&error);

            match self.reconnect(&lifetime, &failures_tx).await {
                Some((next_source, next_generation)) => {
                    source = next_source;
                    generation = next_generation;
                }
                None => return,
            }
        }
    }

    /// Deliver frames to the handler until the channel fails or `cancel` fires.
    ///
    /// Returns `Ok(())` only on cancellation.
    async fn receive_loop(
        &self,
        source: &mut dyn FrameSource,
        generation: u64,
        failures: &mut mpsc::UnboundedReceiver<Failure>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let read_timeout = self.config.read_timeout;

        loop {
            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                Some((failed, error)) = failures.recv() => {
                    if failed == generation {
                        return Err(error);
                    }
                    continue;
                }
                read = timeout(read_timeout, source.next_frame()) => read,
            };

            let frame = match read {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) => {
                    return Err(Error::with_source(
                        Kind::Receive,
                        StreamError::ConnectionClosed {
                            code: None,
                            reason: String::new(),
                        },
                    ));
                }
                Err(_) => {
                    return Err(Error::with_source(
                        Kind::Receive,
                        StreamError::ReadTimeout(read_timeout),
                    ));
                }
            };

            match frame {
                Frame::Text(text) => self.dispatch(&text),
                Frame::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => self.dispatch(&text),
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(error = %e, "Ignoring non UTF-8 binary frame");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                    }
                },
                Frame::Close { code, reason } => {
                    return Err(Error::with_source(
                        Kind::Receive,
                        StreamError::ConnectionClosed { code, reason },
                    ));
                }
                Frame::Ping(_) | Frame::Pong(_) => {}
            }
        }
    }

    /// Hand one payload to the handler, isolating errors and panics.
    fn dispatch(&self, text: &str) {
        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Received stream message");

        let error = match catch_unwind(AssertUnwindSafe(|| self.handler.on_message(text))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => Error::handler(e.to_string()),
            Err(panic) => Error::handler(panic_message(panic.as_ref())),
        };

        #[cfg(feature = "tracing")]
        tracing::warn!(error = %error, "Message handler failed");
        self.handler.on_error(&error);
    }

    /// Send a ping every heartbeat interval while connected.
    async fn heartbeat_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.heartbeat_interval;
        let Some(start) = heartbeat_start(Instant::now(), period) else {
            return;
        };

        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !self.state().is_connected() {
                break;
            }

            // A failed ping is reported to the receive loop by `write`
            if self.write(Frame::Ping(Vec::new())).await.is_err() {
                break;
            }
        }
    }

    /// Re-establish the channel after an unexpected disconnect.
    ///
    /// Returns the new read half and its generation, or `None` when the caller closed the stream
    /// or the attempts ran out.
    async fn reconnect(
        &self,
        lifetime: &CancellationToken,
        failures: &mpsc::UnboundedSender<Failure>,
    ) -> Option<(Box<dyn FrameSource>, u64)> {
        if !self.transition_unless_closed(ConnectionState::Reconnecting) {
            return None;
        }

        let mut backoff = self.config.backoff();

        while let Some((attempt, delay)) = self.next_attempt(&mut backoff) {
            #[cfg(feature = "tracing")]
            tracing::info!(
                attempt,
                max = self.config.max_reconnect_attempts,
                ?delay,
                "Reconnecting stream"
            );
            #[cfg(not(feature = "tracing"))]
            let _ = attempt;

            tokio::select! {
                biased;
                () = lifetime.cancelled() => return None,
                () = sleep(delay) => {}
            }
            if self.state().is_closed() {
                return None;
            }

            match self.open_channel(lifetime).await {
                Ok(Channel { sink, source }) => {
                    let generation = self.next_generation();
                    if !self.install(sink, generation, failures.clone()).await {
                        return None;
                    }

                    #[cfg(feature = "tracing")]
                    tracing::info!(attempt, "Stream reconnected");
                    self.handler.on_connect();
                    return Some((source, generation));
                }
                Err(_) if lifetime.is_cancelled() => return None,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, error = %e, "Reconnection attempt failed");
                    self.handler.on_error(&e);
                }
            }
        }

        let attempts = self.retry().attempt;
        if self.transition_unless_closed(ConnectionState::Disconnected) {
            #[cfg(feature = "tracing")]
            tracing::error!(attempts, "Giving up on stream reconnection");
            self.handler.on_error(&Error::reconnect_exhausted(attempts));
            self.handler.on_disconnect();
        }

        None
    }

    /// Claim the next attempt from [`RetryState`], or `None` once the ceiling is reached.
    fn next_attempt(&self, backoff: &mut Constant) -> Option<(u32, Duration)> {
        let mut retry = self.retry();
        if retry.attempt >= self.config.max_reconnect_attempts {
            return None;
        }

        let delay = backoff
            .next_backoff()
            .unwrap_or(self.config.reconnect_interval);
        retry.attempt += 1;
        retry.next_delay = Some(delay);

        Some((retry.attempt, delay))
    }
}

/// First heartbeat tick, one `period` after `now`.
///
/// `None` disables the heartbeat: a zero period, or one too large to be represented as an
/// [`Instant`].
fn heartbeat_start(now: Instant, period: Duration) -> Option<Instant> {
    if period.is_zero() {
        return None;
    }
    now.checked_add(period)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_owned()
    }
}
