//! The transport channel boundary.
//!
//! A [`Transport`] opens a [`Channel`], which is already split into its write half
//! ([`FrameSink`]) and read half ([`FrameSource`]) so that the receive loop can block on a read
//! while the heartbeat driver and callers of `send` write concurrently.
//!
//! [`TungsteniteTransport`] is the production implementation. Other implementations are mostly
//! useful for testing.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::Result;
use crate::error::{Error, Kind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code for a normal, caller-initiated closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// One discrete unit exchanged over a [`Channel`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close {
        code: Option<u16>,
        reason: String,
    },
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text.to_string()),
            Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            Message::Ping(bytes) => Frame::Ping(bytes.to_vec()),
            Message::Pong(bytes) => Frame::Pong(bytes.to_vec()),
            Message::Close(Some(close)) => Frame::Close {
                code: Some(close.code.into()),
                reason: close.reason.to_string(),
            },
            Message::Close(None) | Message::Frame(_) => Frame::Close {
                code: None,
                reason: String::new(),
            },
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Ping(bytes) => Message::Ping(bytes.into()),
            Frame::Pong(bytes) => Message::Pong(bytes.into()),
            Frame::Close { code, reason } => Message::Close(code.map(|code| CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        }
    }
}

/// Write half of a [`Channel`].
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one frame. Implementations must flush before returning.
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Start the closing handshake with the given code and reason.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Read half of a [`Channel`].
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Read the next frame.
    ///
    /// Returns `None` once the stream has ended. Must be cancel-safe: it is polled inside
    /// `tokio::select!` and under a timeout.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;
}

/// An open, split, bidirectional connection.
#[non_exhaustive]
pub struct Channel {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl Channel {
    #[must_use]
    pub fn new(sink: impl FrameSink, source: impl FrameSource) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

/// Opens [`Channel`]s to a streaming endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform the opening handshake against `url` with the given extra request headers.
    async fn open(&self, url: &Url, headers: &HeaderMap) -> Result<Channel>;
}

/// [`Transport`] backed by `tokio-tungstenite`.
#[expect(
    clippy::exhaustive_structs,
    reason = "Unit struct that callers construct by name"
)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, url: &Url, headers: &HeaderMap) -> Result<Channel> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::transport(Kind::Connect, e))?;
        request
            .headers_mut()
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let (ws_stream, _response): (WsStream, _) = connect_async(request)
            .await
            .map_err(|e| Error::transport(Kind::Connect, e))?;
        let (write, read) = ws_stream.split();

        Ok(Channel::new(TungsteniteSink(write), TungsteniteSource(read)))
    }
}

struct TungsteniteSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.0
            .send(frame.into())
            .await
            .map_err(|e| Error::transport(Kind::Send, e))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = Frame::Close {
            code: Some(code),
            reason: reason.to_owned(),
        };
        self.0
            .send(frame.into())
            .await
            .map_err(|e| Error::transport(Kind::Send, e))?;
        self.0
            .close()
            .await
            .map_err(|e| Error::transport(Kind::Send, e))
    }
}

struct TungsteniteSource(SplitStream<WsStream>);

#[async_trait]
impl FrameSource for TungsteniteSource {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        let message = self.0.next().await?;
        Some(
            message
                .map(Frame::from)
                .map_err(|e| Error::transport(Kind::Receive, e)),
        )
    }
}
