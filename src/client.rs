use std::sync::Arc;

use async_trait::async_trait;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use url::Url;

use crate::Result;
use crate::auth::Credentials;
use crate::stream::endpoint::{self, GENERAL_UPDATES};
use crate::stream::{
    Channel, Config, ConnectionManager, Handler, Transport, TungsteniteTransport,
};

/// Entry point for the Tavo streaming API.
///
/// Holds the HTTP base URL, credentials and stream configuration shared by every stream it
/// opens. Each method returns a new, not yet connected [`ConnectionManager`].
///
/// # Examples
///
/// ```rust, no_run
/// use tavo_client_sdk::Client;
/// use tavo_client_sdk::auth::Credentials;
/// use tavo_client_sdk::stream::{Callbacks, Config};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::new(
///         "https://api.tavoai.net",
///         Credentials::api_key("my-key"),
///         Config::default(),
///     )?;
///
///     let progress = client.scan_progress(
///         "scan-42",
///         Callbacks::new().on_message(|text| {
///             println!("{text}");
///             Ok(())
///         }),
///     )?;
///     progress.connect().await?;
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: String,
    credentials: Credentials,
    config: Config,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Create a client for the API at `base_url` (an `http` or `https` URL).
    pub fn new(base_url: &str, credentials: Credentials, config: Config) -> Result<Self> {
        Self::with_transport(base_url, credentials, config, TungsteniteTransport)
    }

    /// Like [`Client::new`], but every stream opens its channel through `transport`.
    pub fn with_transport(
        base_url: &str,
        credentials: Credentials,
        config: Config,
        transport: impl Transport,
    ) -> Result<Self> {
        // Reject malformed base URLs and invalid credentials up front
        endpoint::stream_url(base_url, GENERAL_UPDATES)?;
        credentials.headers()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url: base_url.to_owned(),
                credentials,
                config,
                transport: Arc::new(transport),
            }),
        })
    }

    /// Stream of progress events for one scan.
    ///
    /// `scan_id` is sent as a single, percent-encoded path segment.
    pub fn scan_progress(&self, scan_id: &str, handler: impl Handler) -> Result<ConnectionManager> {
        let segments = endpoint::scan_progress(scan_id)?;
        let url = endpoint::stream_url(&self.inner.base_url, &segments)?;
        self.stream(url, handler)
    }

    /// Stream of account-wide updates.
    pub fn general_updates(&self, handler: impl Handler) -> Result<ConnectionManager> {
        let url = endpoint::stream_url(&self.inner.base_url, GENERAL_UPDATES)?;
        self.stream(url, handler)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    fn stream(&self, url: Url, handler: impl Handler) -> Result<ConnectionManager> {
        ConnectionManager::with_transport(
            url,
            self.inner.config.clone(),
            &self.inner.credentials,
            handler,
            SharedTransport(Arc::clone(&self.inner.transport)),
        )
    }
}

/// Lets every manager created by one [`Client`] share its transport.
struct SharedTransport(Arc<dyn Transport>);

#[async_trait]
impl Transport for SharedTransport {
    async fn open(&self, url: &Url, headers: &HeaderMap) -> Result<Channel> {
        self.0.open(url, headers).await
    }
}
