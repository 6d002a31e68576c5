use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

/// Broad classification of an [`Error`].
///
/// The streaming kinds line up with how a failure reaches the caller: [`Kind::Connect`] and
/// [`Kind::Send`] are returned synchronously, while [`Kind::Receive`], [`Kind::Handler`] and
/// [`Kind::ReconnectExhausted`] only ever arrive through
/// [`Handler::on_error`](crate::stream::Handler::on_error).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Kind {
    /// Opening the streaming connection failed (network, TLS or upgrade rejection)
    Connect,
    /// An outbound frame could not be written, or the stream was not connected
    Send,
    /// Reading from the stream failed, timed out, or the server closed it
    Receive,
    /// The reconnect ceiling was reached without re-establishing the stream
    ReconnectExhausted,
    /// A caller-supplied message handler failed while processing a payload
    Handler,
    /// Error related to invalid input or an invalid state transition
    Validation,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    /// `true` if this is the terminal signal emitted once reconnection gives up.
    #[must_use]
    pub fn is_reconnect_exhausted(&self) -> bool {
        self.kind == Kind::ReconnectExhausted
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue> for Error {
    fn from(e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}
