//! Static credentials attached to the streaming handshake.
//!
//! Resolution of these values (device login, token refresh, key storage) happens elsewhere;
//! this module only carries them and turns them into request headers.

use bon::Builder;
/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderName, HeaderValue};

use crate::Result;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

/// Credentials used to authenticate a streaming connection.
///
/// Any combination may be set. Every credential that is present is sent; they are not
/// mutually exclusive even though a caller typically configures only one.
#[derive(Clone, Debug, Default, Builder)]
pub struct Credentials {
    #[builder(into)]
    pub(crate) api_key: Option<SecretString>,
    #[builder(into)]
    pub(crate) bearer_token: Option<SecretString>,
    #[builder(into)]
    pub(crate) session_token: Option<SecretString>,
}

impl Credentials {
    /// Credentials carrying only an API key.
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(key.into())),
            ..Self::default()
        }
    }

    /// Credentials carrying only a bearer (JWT) token.
    #[must_use]
    pub fn bearer_token(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(SecretString::from(token.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.bearer_token.is_none() && self.session_token.is_none()
    }

    /// Builds the handshake headers in the order bearer token, API key, session token.
    ///
    /// Values are marked sensitive so they are redacted when the header map is debug-printed.
    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &self.bearer_token {
            let value = format!("Bearer {}", token.expose_secret());
            headers.insert(AUTHORIZATION, sensitive(&value)?);
        }
        if let Some(key) = &self.api_key {
            headers.insert(
                HeaderName::from_static("x-api-key"),
                sensitive(key.expose_secret())?,
            );
        }
        if let Some(token) = &self.session_token {
            headers.insert(
                HeaderName::from_static("x-session-token"),
                sensitive(token.expose_secret())?,
            );
        }

        Ok(headers)
    }
}

fn sensitive(value: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value)?;
    value.set_sensitive(true);
    Ok(value)
}
