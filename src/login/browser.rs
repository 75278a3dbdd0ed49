//! Login by driving a real browser and watching the page for a handle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{BROWSER_LOGIN_TIMEOUT, BROWSER_POLL_INTERVAL, LoginError, LoginResult, LoginStrategy};
use crate::auth::Cookie;
use crate::browser::{BrowserDriver, BrowserSession, DriverError, LaunchOptions};
use crate::site::{BROWSER_USER_AGENT, JudgeSite};

/// Page script returning the logged-in handle, or `""` when logged out.
pub const PROFILE_PROBE_SCRIPT: &str = r#"(() => {
    const link = document.querySelector('a[href^="/profile/"]');
    return link ? link.textContent.trim() : "";
})()"#;

/// Extra idle allowance so the browser outlives the polling deadline.
const IDLE_MARGIN: Duration = Duration::from_secs(60);

/// Strategy that lets the user log in inside a driven browser.
pub struct BrowserDriverLogin {
    site: JudgeSite,
    driver: Arc<dyn BrowserDriver>,
    cancel: CancellationToken,
    timeout: Duration,
    poll_interval: Duration,
}

impl BrowserDriverLogin {
    /// Creates the strategy with the production deadline and poll interval.
    #[must_use]
    pub fn new(site: JudgeSite, driver: Arc<dyn BrowserDriver>, cancel: CancellationToken) -> Self {
        Self {
            site,
            driver,
            cancel,
            timeout: BROWSER_LOGIN_TIMEOUT,
            poll_interval: BROWSER_POLL_INTERVAL,
        }
    }

    /// Overrides the polling deadline and interval.
    #[must_use]
    pub fn with_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    async fn drive(&self, session: &dyn BrowserSession) -> Result<LoginResult, LoginError> {
        let login_url = self.site.login_url();
        session.navigate(&login_url).await?;
        info!(url = %login_url, "log in inside the opened browser window");

        let handle = self.poll_for_handle(session).await?;
        info!(handle = %handle, "browser login detected");

        let cookies: Vec<Cookie> = session
            .cookies()
            .await?
            .into_iter()
            .filter(|cookie| self.site.owns_cookie_domain(&cookie.domain))
            .collect();
        debug!(kept = cookies.len(), "collected judge cookies from the browser");

        Ok(LoginResult {
            handle,
            cookies,
            anti_bot: None,
        })
    }

    async fn poll_for_handle(&self, session: &dyn BrowserSession) -> Result<String, LoginError> {
        let deadline = Instant::now() + self.timeout;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Err(LoginError::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Err(LoginError::Timeout(self.timeout)),
                _ = ticker.tick() => {}
            }

            let probe = tokio::select! {
                () = self.cancel.cancelled() => return Err(LoginError::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Err(LoginError::Timeout(self.timeout)),
                probe = session.evaluate(PROFILE_PROBE_SCRIPT) => probe,
            };

            match probe {
                Ok(serde_json::Value::String(handle)) if !handle.trim().is_empty() => {
                    return Ok(handle.trim().to_string());
                }
                Ok(_) => {}
                Err(DriverError::Unavailable(message)) => {
                    warn!(error = %message, "browser went away while waiting for login");
                    return Err(LoginError::DriverUnavailable(message));
                }
                Err(DriverError::Protocol(message)) => {
                    debug!(error = %message, "login probe failed; retrying");
                }
            }
        }
    }
}

#[async_trait]
impl LoginStrategy for BrowserDriverLogin {
    fn name(&self) -> &'static str {
        "browser"
    }

    #[instrument(level = "info", skip_all, fields(strategy = "browser"))]
    async fn login(&self) -> Result<LoginResult, LoginError> {
        let options = LaunchOptions::interactive(BROWSER_USER_AGENT, self.timeout + IDLE_MARGIN);
        let session = match self.driver.launch(&options).await {
            Ok(session) => session,
            Err(launch_error) => {
                error!(error = %launch_error, "could not launch a browser");
                error!("install Chrome or Chromium, or set CHROME to the browser executable");
                error!("alternatively use `login --strategy extension` or `login --strategy password`");
                return Err(match launch_error {
                    DriverError::Unavailable(message) | DriverError::Protocol(message) => {
                        LoginError::DriverUnavailable(message)
                    }
                });
            }
        };

        let outcome = self.drive(session.as_ref()).await;
        session.close().await;
        outcome
    }
}
