//! Login strategies and the coordinator that finalizes their results.
//!
//! Three strategies acquire a session:
//! - [`ExtensionLogin`] waits for the companion browser extension to post the
//!   captured cookies to a local [`CallbackServer`].
//! - [`BrowserDriverLogin`] drives a real browser and watches for the user to
//!   finish logging in.
//! - [`DirectFormLogin`] submits the login form with stored credentials.
//!
//! Each produces a [`LoginResult`]; [`LoginCoordinator`] turns it into the
//! persisted session.

mod browser;
mod callback;
mod coordinator;
mod error;
mod extension;
mod password;

use std::time::Duration;

use async_trait::async_trait;

use crate::auth::Cookie;

pub use browser::{BrowserDriverLogin, PROFILE_PROBE_SCRIPT};
pub use callback::{CallbackPayload, CallbackServer, CallbackState};
pub use coordinator::LoginCoordinator;
pub use error::LoginError;
pub use extension::{ExtensionLogin, SystemOpener, UrlOpener, extension_login_url};
pub use password::{BFAA, DirectFormLogin, extract_csrf, extract_handle, generate_ftaa};

/// How long the callback server waits for the extension.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// How long the browser strategy waits for the user to log in.
pub const BROWSER_LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Interval between DOM probes in the browser strategy.
pub const BROWSER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Anti-bot identifiers submitted with a password login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntiBotTokens {
    /// Per-attempt random token.
    pub ftaa: String,
    /// Process-constant browser fingerprint token.
    pub bfaa: String,
}

/// Outcome of one successful strategy run.
#[derive(Debug, Clone)]
pub struct LoginResult {
    /// Handle the judge reports for the logged-in user.
    pub handle: String,
    /// Session cookies to persist.
    pub cookies: Vec<Cookie>,
    /// Anti-bot tokens, when the strategy generated any.
    pub anti_bot: Option<AntiBotTokens>,
}

/// A way of acquiring an authenticated session.
#[async_trait]
pub trait LoginStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Runs the strategy to completion.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError`] describing why no session was acquired.
    async fn login(&self) -> Result<LoginResult, LoginError>;
}
