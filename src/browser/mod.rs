//! Browser automation seam.
//!
//! Login code talks to [`BrowserDriver`] and [`BrowserSession`]; the
//! production implementation is [`ChromeDriver`].

mod chrome;

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::auth::Cookie;

pub use chrome::ChromeDriver;

/// Errors reported by a browser driver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    /// No browser could be launched, or the browser went away.
    #[error("{0}")]
    Unavailable(String),
    /// A command against a running browser failed.
    #[error("{0}")]
    Protocol(String),
}

/// How to launch the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Extra command-line switches.
    pub args: Vec<String>,
    /// Default switches the driver must not pass.
    pub suppressed_default_args: Vec<String>,
    /// User-Agent presented by every tab.
    pub user_agent: String,
    /// How long the browser may sit idle before the driver gives up on it.
    pub idle_timeout: Duration,
}

impl LaunchOptions {
    /// Visible browser that does not advertise automation.
    #[must_use]
    pub fn interactive(user_agent: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            headless: false,
            args: vec![
                "--disable-blink-features=AutomationControlled".to_string(),
                "--start-maximized".to_string(),
            ],
            suppressed_default_args: vec!["--enable-automation".to_string()],
            user_agent: user_agent.into(),
            idle_timeout,
        }
    }
}

/// Launches browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Starts a browser with one open tab.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unavailable`] when no browser can be started.
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>, DriverError>;
}

/// One running browser with a single tab.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigates the tab to `url`.
    async fn navigate(&self, url: &Url) -> Result<(), DriverError>;

    /// Evaluates `script` in the page and returns its JSON value.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError>;

    /// Returns every cookie the browser holds for the open tab.
    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError>;

    /// Closes the browser. Safe to call more than once.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_options_hide_automation() {
        let options = LaunchOptions::interactive("UA/1.0", Duration::from_secs(60));
        assert!(!options.headless);
        assert!(
            options
                .args
                .iter()
                .any(|arg| arg == "--disable-blink-features=AutomationControlled")
        );
        assert!(options.args.iter().any(|arg| arg == "--start-maximized"));
        assert_eq!(options.suppressed_default_args, vec!["--enable-automation"]);
        assert_eq!(options.user_agent, "UA/1.0");
    }
}
