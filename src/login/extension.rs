//! Login through the companion browser extension.

use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use url::Url;

use super::callback::CallbackServer;
use super::{LoginError, LoginResult, LoginStrategy};
use crate::auth::parse_cookie_string;
use crate::site::JudgeSite;

/// Query parameter carrying the callback port to the extension.
const PORT_QUERY_KEY: &str = "cf_port";

/// Opens a URL in the user's browser.
pub trait UrlOpener: Send + Sync {
    /// Opens `url`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when no browser could be launched.
    fn open(&self, url: &Url) -> std::io::Result<()>;
}

/// Opens URLs with the platform launcher (`open`, `xdg-open`, `start`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &Url) -> std::io::Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut command = Command::new("cmd");
            command.args(["/C", "start", ""]);
            command
        } else {
            Command::new("xdg-open")
        };

        command
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
    }
}

/// URL the extension recognizes: `{host}/enter?cf_port={port}`.
#[must_use]
pub fn extension_login_url(site: &JudgeSite, port: u16) -> Url {
    let mut url = site.login_url();
    url.query_pairs_mut()
        .append_pair(PORT_QUERY_KEY, &port.to_string());
    url
}

/// Strategy that waits for the extension to post the captured session.
pub struct ExtensionLogin {
    site: JudgeSite,
    opener: Arc<dyn UrlOpener>,
    deadline: Duration,
}

impl ExtensionLogin {
    /// Creates the strategy.
    #[must_use]
    pub fn new(site: JudgeSite, opener: Arc<dyn UrlOpener>, deadline: Duration) -> Self {
        Self {
            site,
            opener,
            deadline,
        }
    }
}

#[async_trait]
impl LoginStrategy for ExtensionLogin {
    fn name(&self) -> &'static str {
        "extension"
    }

    #[instrument(level = "info", skip_all, fields(strategy = "extension"))]
    async fn login(&self) -> Result<LoginResult, LoginError> {
        let mut server = CallbackServer::bind().await?;
        server.start();

        let url = extension_login_url(&self.site, server.port());
        info!(port = server.port(), "opening the login page; log in and let the extension send the session");
        if let Err(error) = self.opener.open(&url) {
            warn!(error = %error, url = %url, "cannot open a browser; open the URL manually");
        }

        let payload = server.wait(self.deadline).await?;

        let cookies = parse_cookie_string(&payload.cookies, self.site.cookie_domain());
        if cookies.is_empty() {
            return Err(LoginError::NoCookies);
        }

        info!(handle = %payload.handle, cookies = cookies.len(), "extension login captured a session");
        Ok(LoginResult {
            handle: payload.handle,
            cookies,
            anti_bot: None,
        })
    }
}
