//! Outgoing HTTP transport bound to a hot-swappable cookie jar.
//!
//! The reqwest client is built once. Its cookie provider is a slot holding the
//! current [`CookieJar`]; [`HttpTransport::set_cookie_jar`] replaces the slot's
//! contents in one write, so every request after the swap reads the new jar.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::{Client, ClientBuilder, Proxy, Request, Response};
use tracing::{debug, instrument};
use url::Url;

use crate::auth::CookieJar;
use crate::site::BROWSER_USER_AGENT;

/// Per-request timeout.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 10;

/// Errors raised by the transport and the local callback listener.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The reqwest client could not be constructed.
    #[error("HTTP client construction failed: {0}")]
    Build(#[source] reqwest::Error),
    /// The configured proxy URL was rejected.
    #[error("invalid proxy {proxy}: {source}")]
    Proxy {
        /// Proxy URL as configured.
        proxy: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// A request failed before a response was received.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Request URL.
        url: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body could not be read.
    #[error("failed to read response from {url}: {source}")]
    Body {
        /// Request URL.
        url: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// A local socket operation failed.
    #[error("local listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport construction options.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// User-Agent override; `None` or empty uses the desktop Chrome identity.
    pub user_agent: Option<String>,
    /// Proxy URL applied to every scheme.
    pub proxy: Option<String>,
}

impl TransportOptions {
    fn effective_user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .unwrap_or(BROWSER_USER_AGENT)
    }
}

/// Cookie provider slot shared with the reqwest client.
struct JarSlot {
    current: RwLock<Arc<CookieJar>>,
}

impl JarSlot {
    fn load(&self) -> Arc<CookieJar> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn store(&self, jar: Arc<CookieJar>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = jar;
    }
}

impl CookieStore for JarSlot {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.load().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.load().cookies(url)
    }
}

/// HTTP client presenting a browser-like identity to the judge.
pub struct HttpTransport {
    client: Client,
    slot: Arc<JarSlot>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("cookies", &self.slot.load().len())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Builds a transport reading and recording cookies through `jar`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Proxy`] for an unusable proxy URL and
    /// [`TransportError::Build`] if the client cannot be constructed.
    pub fn new(jar: Arc<CookieJar>, options: &TransportOptions) -> Result<Self, TransportError> {
        let slot = Arc::new(JarSlot {
            current: RwLock::new(jar),
        });

        let mut builder =
            base_builder(options.effective_user_agent()).cookie_provider(Arc::clone(&slot));
        if let Some(proxy) = options
            .proxy
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let resolved = Proxy::all(proxy).map_err(|source| TransportError::Proxy {
                proxy: proxy.to_string(),
                source,
            })?;
            builder = builder.proxy(resolved);
        }
        let client = builder.build().map_err(TransportError::Build)?;

        debug!(
            user_agent = options.effective_user_agent(),
            proxied = options.proxy.is_some(),
            "built HTTP transport"
        );
        Ok(Self { client, slot })
    }

    /// Replaces the jar every subsequent request reads and writes.
    pub fn set_cookie_jar(&self, jar: Arc<CookieJar>) {
        debug!(cookies = jar.len(), "swapping transport cookie jar");
        self.slot.store(jar);
    }

    /// The jar currently bound to the transport.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<CookieJar> {
        self.slot.load()
    }

    /// Sends a prepared request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if no response was received.
    #[instrument(level = "debug", skip_all, fields(method = %request.method(), url = %request.url()))]
    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let url = request.url().to_string();
        self.client
            .execute(request)
            .await
            .map_err(|source| TransportError::Request { url, source })
    }

    /// `GET url` and returns the response body as text.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on request or body failure.
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    pub async fn get(&self, url: &Url) -> Result<String, TransportError> {
        let request = self
            .client
            .get(url.clone())
            .build()
            .map_err(|source| request_error(url, source))?;
        let response = self.execute(request).await?;
        read_body(url, response).await
    }

    /// `POST url` with an urlencoded form body and returns the response text.
    ///
    /// Field values are never logged.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on request or body failure.
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    pub async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
    ) -> Result<String, TransportError> {
        let request = self
            .client
            .post(url.clone())
            .form(form)
            .build()
            .map_err(|source| request_error(url, source))?;
        let response = self.execute(request).await?;
        read_body(url, response).await
    }
}

fn base_builder(user_agent: &str) -> ClientBuilder {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .user_agent(user_agent.to_string())
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .gzip(true)
}

fn request_error(url: &Url, source: reqwest::Error) -> TransportError {
    TransportError::Request {
        url: url.to_string(),
        source,
    }
}

async fn read_body(url: &Url, response: Response) -> Result<String, TransportError> {
    let status = response.status();
    let body = response.text().await.map_err(|source| TransportError::Body {
        url: url.to_string(),
        source,
    })?;
    debug!(status = %status, bytes = body.len(), "received response");
    Ok(body)
}
