//! Judge site settings and the browser identity presented to it.
//!
//! The judge fingerprints clients, so every outgoing request (transport and
//! driven browser alike) presents the same desktop Chrome identity.

use url::Url;

use crate::auth::domain_matches;

/// Default judge host.
pub const DEFAULT_HOST: &str = "https://codeforces.com";

/// Cookie domain stamped on cookies captured by the browser extension.
pub const CANONICAL_COOKIE_DOMAIN: &str = ".codeforces.com";

/// Desktop Chrome User-Agent presented by the transport and the driven browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Path of the judge's login page.
const LOGIN_PATH: &str = "/enter";

/// Where the judge lives and how its cookies are scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeSite {
    host: Url,
    cookie_domain: String,
}

impl Default for JudgeSite {
    fn default() -> Self {
        Self {
            host: default_host(),
            cookie_domain: CANONICAL_COOKIE_DOMAIN.to_string(),
        }
    }
}

impl JudgeSite {
    /// Creates site settings for `host` using the canonical cookie domain.
    #[must_use]
    pub fn new(host: Url) -> Self {
        Self {
            host,
            cookie_domain: CANONICAL_COOKIE_DOMAIN.to_string(),
        }
    }

    /// Base URL of the judge.
    #[must_use]
    pub fn host(&self) -> &Url {
        &self.host
    }

    /// Canonical cookie domain.
    #[must_use]
    pub fn cookie_domain(&self) -> &str {
        &self.cookie_domain
    }

    /// URL of the login page.
    #[must_use]
    pub fn login_url(&self) -> Url {
        let mut url = self.host.clone();
        url.set_path(LOGIN_PATH);
        url.set_query(None);
        url
    }

    /// Whether a cookie scoped to `domain` belongs to this judge.
    ///
    /// Matches the configured host exactly or as a suffix, or the canonical
    /// cookie domain.
    #[must_use]
    pub fn owns_cookie_domain(&self, domain: &str) -> bool {
        let canonical = self.cookie_domain.trim_start_matches('.');
        if domain.trim_start_matches('.').eq_ignore_ascii_case(canonical) {
            return true;
        }
        self.host
            .host_str()
            .is_some_and(|host| domain_matches(domain, host))
    }
}

#[allow(clippy::expect_used)]
fn default_host() -> Url {
    Url::parse(DEFAULT_HOST).expect("default host is a valid URL") // Static literal, safe to panic
}
