#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper in this module"
)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tavo_client_sdk::Result;
use tavo_client_sdk::auth::Credentials;
use tavo_client_sdk::error::{Error, Kind};
use tavo_client_sdk::stream::{
    Channel, Config, ConnectionManager, ConnectionState, Frame, FrameSink, FrameSource,
    Handler, HandlerResult, Transport,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use url::Url;

pub const URL: &str = "ws://mock.tavo.test/api/v1/updates";

/// Long enough that no test trips over it by accident.
pub const LONG: Duration = Duration::from_secs(3600);

/// Handler payload that is rejected with an error.
pub const BAD: &str = "bad";
/// Handler payload that makes the handler panic.
pub const PANIC: &str = "panic";

/// In-memory [`Transport`] whose behaviour is scripted by the test.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    opens: Vec<Instant>,
    headers: Vec<HeaderMap>,
    refuse: bool,
    fail_writes: bool,
    handshake_delay: Duration,
    written: Vec<Frame>,
    closes: Vec<u16>,
    peer: Option<mpsc::UnboundedSender<Result<Frame>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent handshake fail.
    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    /// Make every subsequent handshake take `delay` before it completes.
    pub fn set_handshake_delay(&self, delay: Duration) {
        self.state.lock().unwrap().handshake_delay = delay;
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Deliver `frame` on the most recently opened channel. Dropped if nobody reads it anymore.
    pub fn push(&self, frame: Frame) {
        let state = self.state.lock().unwrap();
        _ = state.peer.as_ref().unwrap().send(Ok(frame));
    }

    pub fn push_text(&self, text: &str) {
        self.push(Frame::Text(text.to_owned()));
    }

    /// Make the next read on the current channel fail.
    pub fn fail_read(&self, reason: &str) {
        let state = self.state.lock().unwrap();
        let error = Error::with_source(Kind::Receive, io::Error::other(reason.to_owned()));
        _ = state.peer.as_ref().unwrap().send(Err(error));
    }

    /// Number of handshakes attempted, successful or not.
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn headers(&self, index: usize) -> HeaderMap {
        self.state.lock().unwrap().headers[index].clone()
    }

    pub fn written(&self) -> Vec<Frame> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn written_text(&self) -> Vec<String> {
        self.written()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.written()
            .iter()
            .filter(|frame| matches!(frame, Frame::Ping(_)))
            .count()
    }

    pub fn closes(&self) -> Vec<u16> {
        self.state.lock().unwrap().closes.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &Url, headers: &HeaderMap) -> Result<Channel> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.opens.push(Instant::now());
            state.headers.push(headers.clone());
            state.handshake_delay
        };

        if !delay.is_zero() {
            sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.refuse {
            return Err(Error::with_source(
                Kind::Connect,
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.peer = Some(tx);

        Ok(Channel::new(
            MockSink {
                state: Arc::clone(&self.state),
            },
            MockSource { rx },
        ))
    }
}

struct MockSink {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(Error::with_source(
                Kind::Send,
                io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
            ));
        }
        state.written.push(frame);
        Ok(())
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<()> {
        self.state.lock().unwrap().closes.push(code);
        Ok(())
    }
}

struct MockSource {
    rx: mpsc::UnboundedReceiver<Result<Frame>>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.rx.recv().await
    }
}

/// [`Handler`] that records every callback.
///
/// Rejects the payload [`BAD`] with an error and panics on [`PANIC`].
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Events>>,
}

#[derive(Debug, Default)]
pub struct Events {
    pub messages: Vec<String>,
    pub errors: Vec<(Kind, String)>,
    pub connects: usize,
    pub disconnects: usize,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events.lock().unwrap().messages.clone()
    }

    pub fn errors(&self) -> Vec<(Kind, String)> {
        self.events.lock().unwrap().errors.clone()
    }

    pub fn error_kinds(&self) -> Vec<Kind> {
        self.errors().into_iter().map(|(kind, _)| kind).collect()
    }

    pub fn connects(&self) -> usize {
        self.events.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.events.lock().unwrap().disconnects
    }
}

impl Handler for Recorder {
    fn on_message(&self, text: &str) -> HandlerResult {
        self.events.lock().unwrap().messages.push(text.to_owned());
        match text {
            BAD => Err(format!("cannot handle {text}").into()),
            PANIC => panic!("handler blew up"),
            _ => Ok(()),
        }
    }

    fn on_error(&self, error: &Error) {
        self.events
            .lock()
            .unwrap()
            .errors
            .push((error.kind(), error.to_string()));
    }

    fn on_connect(&self) {
        self.events.lock().unwrap().connects += 1;
    }

    fn on_disconnect(&self) {
        self.events.lock().unwrap().disconnects += 1;
    }
}

/// Test configuration: one-second reconnect interval, timers that never fire on their own.
pub fn config() -> Config {
    Config::builder()
        .reconnect_interval(Duration::from_secs(1))
        .max_reconnect_attempts(3)
        .heartbeat_interval(LONG)
        .read_timeout(LONG)
        .write_timeout(Duration::from_secs(5))
        .build()
}

pub fn manager(config: Config, transport: &MockTransport, recorder: &Recorder) -> ConnectionManager {
    ConnectionManager::with_transport(
        Url::parse(URL).unwrap(),
        config,
        &Credentials::api_key("test-key"),
        recorder.clone(),
        transport.clone(),
    )
    .unwrap()
}

/// Wait until the manager reaches `expected`, failing the test after a generous bound.
pub async fn wait_for_state(manager: &ConnectionManager, expected: ConnectionState) {
    let mut rx = manager.state_receiver();
    timeout(Duration::from_secs(600), rx.wait_for(|state| *state == expected))
        .await
        .unwrap_or_else(|_| panic!("never reached {expected}, stuck in {}", manager.state()))
        .unwrap();
}

/// Poll `condition` until it holds, letting background tasks run in between.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not met in time");
}
