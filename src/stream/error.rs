#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Kind};

/// Streaming error variants, carried as the source of a crate [`Error`].
#[non_exhaustive]
#[derive(Debug)]
pub enum StreamError {
    /// Error from the underlying WebSocket implementation
    Transport(tokio_tungstenite::tungstenite::Error),
    /// Operation requires an established connection
    NotConnected,
    /// The server closed the connection or the stream ended
    ConnectionClosed {
        /// Close code sent by the server, if any
        code: Option<u16>,
        /// Close reason sent by the server
        reason: String,
    },
    /// `disconnect` was called while the handshake was in flight
    ClosedDuringConnect,
    /// No frame arrived within the configured read timeout
    ReadTimeout(Duration),
    /// A frame could not be written within the configured write timeout
    WriteTimeout(Duration),
    /// A write on the live channel failed, so the channel is considered lost
    WriteFailed(String),
    /// The handshake did not complete within the configured read timeout
    HandshakeTimeout(Duration),
    /// All reconnection attempts failed
    ReconnectExhausted {
        /// Number of attempts made
        attempts: u32,
    },
    /// The message handler returned an error or panicked
    Handler(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "WebSocket transport error: {e}"),
            Self::NotConnected => write!(f, "stream is not connected"),
            Self::ConnectionClosed { code: Some(code), reason } => {
                write!(f, "connection closed by server ({code}): {reason}")
            }
            Self::ConnectionClosed { code: None, .. } => write!(f, "connection closed"),
            Self::ClosedDuringConnect => write!(f, "stream was closed while connecting"),
            Self::ReadTimeout(d) => write!(f, "no frame received within {d:?}"),
            Self::WriteTimeout(d) => write!(f, "write did not complete within {d:?}"),
            Self::WriteFailed(reason) => write!(f, "write failed: {reason}"),
            Self::HandshakeTimeout(d) => write!(f, "handshake did not complete within {d:?}"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "reconnect exhausted after {attempts} attempts")
            }
            Self::Handler(msg) => write!(f, "message handler failed: {msg}"),
        }
    }
}

impl StdError for StreamError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    pub(crate) fn not_connected() -> Self {
        Error::with_source(Kind::Send, StreamError::NotConnected)
    }

    pub(crate) fn reconnect_exhausted(attempts: u32) -> Self {
        Error::with_source(Kind::ReconnectExhausted, StreamError::ReconnectExhausted { attempts })
    }

    pub(crate) fn handler<S: Into<String>>(message: S) -> Self {
        Error::with_source(Kind::Handler, StreamError::Handler(message.into()))
    }

    /// Re-tags a transport failure with the phase it happened in.
    pub(crate) fn transport(kind: Kind, e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::with_source(kind, StreamError::Transport(e))
    }
}
