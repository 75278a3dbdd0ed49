//! Direct form login with stored credentials.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use super::{AntiBotTokens, LoginError, LoginResult, LoginStrategy};
use crate::auth::CookieJar;
use crate::site::JudgeSite;
use crate::transport::HttpTransport;

/// Browser fingerprint token the judge's front-end submits.
pub const BFAA: &str = "f1b3f18c715565b589b7823cda7448ce";

const FTAA_LEN: usize = 18;
const FTAA_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TTA: &str = "176";

#[allow(clippy::expect_used)]
static CSRF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"csrf='(.+?)'").expect("csrf regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static HANDLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"handle = "([\s\S]+?)""#).expect("handle regex is valid") // Static pattern, safe to panic
});

/// Extracts the CSRF token from a judge page.
#[must_use]
pub fn extract_csrf(body: &str) -> Option<&str> {
    CSRF_RE
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str())
}

/// Extracts the logged-in handle from a judge page.
#[must_use]
pub fn extract_handle(body: &str) -> Option<&str> {
    HANDLE_RE
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|handle| handle.as_str())
}

/// Generates a fresh `ftaa` token: 18 characters from `[a-z0-9]`.
#[must_use]
pub fn generate_ftaa() -> String {
    let mut rng = rand::thread_rng();
    (0..FTAA_LEN)
        .map(|_| char::from(FTAA_ALPHABET[rng.gen_range(0..FTAA_ALPHABET.len())]))
        .collect()
}

/// Strategy that posts the login form with stored credentials.
///
/// Runs against a fresh cookie jar swapped into the transport; the caller
/// restores the previous jar if the login fails.
pub struct DirectFormLogin<'a> {
    transport: &'a HttpTransport,
    site: &'a JudgeSite,
    handle_or_email: String,
    password: String,
}

impl<'a> DirectFormLogin<'a> {
    /// Creates the strategy. `password` is the decrypted plaintext.
    #[must_use]
    pub fn new(
        transport: &'a HttpTransport,
        site: &'a JudgeSite,
        handle_or_email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            site,
            handle_or_email: handle_or_email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for DirectFormLogin<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectFormLogin")
            .field("site", self.site)
            .field("handle_or_email", &self.handle_or_email)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<'a> LoginStrategy for DirectFormLogin<'a> {
    fn name(&self) -> &'static str {
        "password"
    }

    #[instrument(level = "info", skip_all, fields(strategy = "password", user = %self.handle_or_email))]
    async fn login(&self) -> Result<LoginResult, LoginError> {
        if self.handle_or_email.is_empty() || self.password.is_empty() {
            return Err(LoginError::Configuration(
                "no stored credentials; run `cf-session credentials` first".to_string(),
            ));
        }

        let jar = Arc::new(CookieJar::new());
        self.transport.set_cookie_jar(Arc::clone(&jar));

        let login_url = self.site.login_url();
        let page = self.transport.get(&login_url).await?;
        let csrf = extract_csrf(&page).ok_or_else(|| {
            warn!("login page has no CSRF token");
            LoginError::CsrfNotFound
        })?;
        debug!("fetched CSRF token");

        let tokens = AntiBotTokens {
            ftaa: generate_ftaa(),
            bfaa: BFAA.to_string(),
        };
        let form = [
            ("csrf_token", csrf),
            ("action", "enter"),
            ("ftaa", tokens.ftaa.as_str()),
            ("bfaa", tokens.bfaa.as_str()),
            ("handleOrEmail", self.handle_or_email.as_str()),
            ("password", self.password.as_str()),
            ("_tta", TTA),
            ("remember", "on"),
        ];
        let response = self.transport.post_form(&login_url, &form).await?;

        let handle = extract_handle(&response)
            .filter(|handle| !handle.is_empty())
            .ok_or(LoginError::NotLoggedIn)?
            .to_string();
        info!(handle = %handle, "password login succeeded");

        Ok(LoginResult {
            handle,
            cookies: jar.snapshot(),
            anti_bot: Some(tokens),
        })
    }
}
