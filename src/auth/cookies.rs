//! Session cookies and the jar the HTTP transport reads them from.
//!
//! [`CookieJar`] is keyed by `(domain, path, name)` and implements
//! [`reqwest::cookie::CookieStore`], so the transport both sends from it and
//! records `Set-Cookie` responses into it. Every batch write happens under one
//! lock; readers never observe half of a batch.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

/// Separator between pairs in a `document.cookie` string.
const PAIR_SEPARATOR: &str = "; ";

/// A single session cookie.
///
/// The value is redacted in Debug output so a logged cookie never leaks the
/// session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value (sensitive, never log).
    value: String,
    /// Domain the cookie belongs to (e.g. `.codeforces.com`).
    pub domain: String,
    /// URL path scope.
    pub path: String,
}

impl Cookie {
    /// Creates a cookie.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: path.into(),
        }
    }

    /// Returns the cookie value. Avoid logging it.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CookieKey {
    domain: String,
    path: String,
    name: String,
}

/// Keyed cookie collection bound to the judge's base URL.
#[derive(Default)]
pub struct CookieJar {
    entries: RwLock<BTreeMap<CookieKey, String>>,
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieJar")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl CookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a jar holding `cookies`, scoped to `url`.
    #[must_use]
    pub fn with_cookies(url: &Url, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        let jar = Self::new();
        jar.set(url, cookies);
        jar
    }

    /// Merges `cookies` into the jar.
    ///
    /// A cookie with an empty domain takes the host of `url`; an empty path
    /// becomes `/`. An entry sharing `(domain, path, name)` with an existing one
    /// replaces it, and within one call the last cookie for a key wins.
    #[instrument(level = "debug", skip(self, cookies), fields(url = %url))]
    pub fn set(&self, url: &Url, cookies: impl IntoIterator<Item = Cookie>) {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let staged: Vec<(CookieKey, String)> = cookies
            .into_iter()
            .map(|cookie| {
                let domain = if cookie.domain.trim().is_empty() {
                    host.clone()
                } else {
                    cookie.domain.trim().to_ascii_lowercase()
                };
                let path = if cookie.path.starts_with('/') {
                    cookie.path
                } else {
                    "/".to_string()
                };
                (
                    CookieKey {
                        domain,
                        path,
                        name: cookie.name,
                    },
                    cookie.value,
                )
            })
            .collect();

        let count = staged.len();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.extend(staged);
        debug!(count, total = entries.len(), "stored cookies");
    }

    /// Restores previously stored cookies verbatim.
    ///
    /// Cookies without a domain cannot be scoped and are skipped.
    pub fn insert_all(&self, cookies: impl IntoIterator<Item = Cookie>) {
        let staged: Vec<(CookieKey, String)> = cookies
            .into_iter()
            .filter(|cookie| !cookie.domain.trim().is_empty())
            .map(|cookie| {
                (
                    CookieKey {
                        domain: cookie.domain,
                        path: cookie.path,
                        name: cookie.name,
                    },
                    cookie.value,
                )
            })
            .collect();

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.extend(staged);
    }

    /// Returns every cookie applicable to `url` (domain and path match),
    /// longest path first.
    #[must_use]
    pub fn get(&self, url: &Url) -> Vec<Cookie> {
        let Some(host) = url.host_str() else {
            return Vec::new();
        };
        let host = host.to_ascii_lowercase();
        let request_path = url.path();

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut matched: Vec<Cookie> = entries
            .iter()
            .filter(|(key, _)| {
                scope_matches(&key.domain, &host) && path_matches(&key.path, request_path)
            })
            .map(|(key, value)| to_cookie(key, value))
            .collect();
        drop(entries);

        matched.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        matched
    }

    /// Snapshot of every stored cookie, in key order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Cookie> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, value)| to_cookie(key, value))
            .collect()
    }

    /// Number of stored cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the jar holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };
        let host = host.to_ascii_lowercase();
        let now = unix_now();

        let mut upserts = Vec::new();
        let mut removals = Vec::new();

        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                debug!("skipping non-ASCII Set-Cookie header");
                continue;
            };
            let Ok(parsed) = ::cookie::Cookie::parse(raw) else {
                debug!("skipping unparseable Set-Cookie header");
                continue;
            };

            let domain = match parsed.domain() {
                Some(attr) => {
                    let attr = attr.trim_start_matches('.').to_ascii_lowercase();
                    if !domain_matches(&attr, &host) {
                        warn!(
                            cookie_domain = %attr,
                            host = %host,
                            name = %parsed.name(),
                            "rejecting Set-Cookie for a foreign domain"
                        );
                        continue;
                    }
                    format!(".{attr}")
                }
                None => host.clone(),
            };
            let path = parsed
                .path()
                .filter(|path| path.starts_with('/'))
                .map_or_else(|| default_path(url), str::to_string);

            let key = CookieKey {
                domain,
                path,
                name: parsed.name().to_string(),
            };

            let expired = parsed
                .max_age()
                .is_some_and(|age| age.is_zero() || age.is_negative())
                || parsed
                    .expires_datetime()
                    .is_some_and(|at| at.unix_timestamp() <= now);

            if expired {
                removals.push(key);
            } else {
                upserts.push((key, parsed.value().to_string()));
            }
        }

        if upserts.is_empty() && removals.is_empty() {
            return;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for key in &removals {
            entries.remove(key);
        }
        debug!(
            stored = upserts.len(),
            removed = removals.len(),
            host = %host,
            "recorded Set-Cookie headers"
        );
        entries.extend(upserts);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .get(url)
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join(PAIR_SEPARATOR);

        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}

/// Parses a raw `document.cookie` string into cookies stamped with `domain`
/// and path `/`.
///
/// Pairs are separated by exactly `"; "`; a bare `;` does not split. Each
/// pair is cut at its first `=`, and both sides are trimmed of spaces and
/// tabs. Pairs without `=` (or with an empty name before it) are dropped.
#[must_use]
pub fn parse_cookie_string(raw: &str, domain: &str) -> Vec<Cookie> {
    raw.split(PAIR_SEPARATOR)
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            if name.is_empty() {
                return None;
            }
            Some(Cookie::new(
                trim_blanks(name),
                trim_blanks(value),
                domain,
                "/",
            ))
        })
        .collect()
}

fn trim_blanks(text: &str) -> &str {
    text.trim_matches(|c| c == ' ' || c == '\t')
}

/// Whether a cookie for `cookie_domain` applies to `host`.
///
/// A leading `.` on the cookie domain is ignored; `host` matches on equality
/// or when it is a subdomain.
#[must_use]
pub fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let domain = cookie_domain.trim_start_matches('.');
    if domain.is_empty() {
        return false;
    }
    host.eq_ignore_ascii_case(domain)
        || (host.len() > domain.len()
            && host.to_ascii_lowercase().ends_with(&format!(".{}", domain.to_ascii_lowercase())))
}

/// Jar lookup rule: a `.`-prefixed key covers the domain and its subdomains,
/// any other key is host-only and needs an exact host.
fn scope_matches(key_domain: &str, host: &str) -> bool {
    if key_domain.starts_with('.') {
        domain_matches(key_domain, host)
    } else {
        !key_domain.is_empty() && key_domain.eq_ignore_ascii_case(host)
    }
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == request_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn to_cookie(key: &CookieKey, value: &str) -> Cookie {
    Cookie::new(&key.name, value, &key.domain, &key.path)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| {
            i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
        })
}
