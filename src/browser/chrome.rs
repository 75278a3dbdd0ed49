//! Chrome-backed [`BrowserDriver`] built on `headless_chrome`.
//!
//! `headless_chrome` is blocking, so every call runs on the blocking pool.

use std::ffi::OsStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use headless_chrome::{Browser, Tab};
use tracing::{debug, instrument};
use url::Url;

use super::{BrowserDriver, BrowserSession, DriverError, LaunchOptions};
use crate::auth::Cookie;

/// Marker in `headless_chrome` errors once the browser connection is gone.
const CONNECTION_CLOSED_MARKER: &str = "connection is closed";

/// Launches a local Chrome or Chromium install.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeDriver;

#[async_trait]
impl BrowserDriver for ChromeDriver {
    #[instrument(level = "debug", skip_all, fields(headless = options.headless))]
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>, DriverError> {
        let options = options.clone();
        let (browser, tab) = tokio::task::spawn_blocking(move || launch_blocking(&options))
            .await
            .map_err(|error| DriverError::Unavailable(error.to_string()))??;

        debug!("chrome launched");
        Ok(Box::new(ChromeSession {
            browser: Mutex::new(Some(browser)),
            tab,
        }))
    }
}

fn launch_blocking(options: &LaunchOptions) -> Result<(Browser, Arc<Tab>), DriverError> {
    let args: Vec<&OsStr> = options.args.iter().map(OsStr::new).collect();
    let suppressed: Vec<&OsStr> = options
        .suppressed_default_args
        .iter()
        .map(OsStr::new)
        .collect();

    let launch_options = headless_chrome::LaunchOptions::default_builder()
        .headless(options.headless)
        .window_size(None)
        .args(args)
        .ignore_default_args(suppressed)
        .idle_browser_timeout(options.idle_timeout)
        .build()
        .map_err(|error| DriverError::Unavailable(format!("invalid launch options: {error}")))?;

    let browser = Browser::new(launch_options)
        .map_err(|error| DriverError::Unavailable(format!("failed to launch browser: {error}")))?;
    let tab = browser
        .new_tab()
        .map_err(|error| DriverError::Unavailable(format!("failed to open a tab: {error}")))?;
    tab.set_user_agent(&options.user_agent, None, None)
        .map_err(|error| DriverError::Protocol(format!("failed to set user agent: {error}")))?;

    Ok((browser, tab))
}

struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
}

impl ChromeSession {
    async fn with_tab<T, F>(&self, call: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || call(&tab))
            .await
            .map_err(|error| DriverError::Protocol(error.to_string()))?
            .map_err(classify)
    }
}

fn classify(error: anyhow::Error) -> DriverError {
    let message = format!("{error:#}");
    if message.to_ascii_lowercase().contains(CONNECTION_CLOSED_MARKER) {
        DriverError::Unavailable(message)
    } else {
        DriverError::Protocol(message)
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &Url) -> Result<(), DriverError> {
        let url = url.to_string();
        self.with_tab(move |tab| tab.navigate_to(&url).map(drop)).await
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        let script = script.to_string();
        self.with_tab(move |tab| {
            let remote = tab.evaluate(&script, false)?;
            Ok(remote.value.unwrap_or(serde_json::Value::Null))
        })
        .await
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError> {
        self.with_tab(|tab| {
            Ok(tab
                .get_cookies()?
                .into_iter()
                .map(|cookie| Cookie::new(cookie.name, cookie.value, cookie.domain, cookie.path))
                .collect())
        })
        .await
    }

    async fn close(&self) {
        let browser = self
            .browser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(browser) = browser else {
            return;
        };
        let tab = Arc::clone(&self.tab);
        let closed = tokio::task::spawn_blocking(move || {
            if let Err(error) = tab.close(false) {
                debug!(error = %error, "tab close failed");
            }
            drop(browser);
        })
        .await;
        if let Err(error) = closed {
            debug!(error = %error, "browser shutdown task failed");
        }
        debug!("chrome closed");
    }
}
