//! cf-session core library
//!
//! Obtains an authenticated judge session, persists it, and keeps the HTTP
//! transport bound to its cookies.
//!
//! # Architecture
//!
//! - [`auth`] - cookie jar, persisted session snapshot, password vault
//! - [`transport`] - reqwest client bound to a hot-swappable cookie jar
//! - [`login`] - extension, browser and password strategies plus the coordinator
//! - [`browser`] - browser driver seam and the Chrome adapter
//! - [`site`] - judge host, cookie domain and browser identity

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod browser;
pub mod login;
pub mod site;
pub mod transport;

// Re-export commonly used types
pub use auth::{
    Cookie, CookieJar, Session, SessionError, VaultError, default_session_path,
    parse_cookie_string,
};
pub use browser::{BrowserDriver, BrowserSession, ChromeDriver, DriverError, LaunchOptions};
pub use login::{
    AntiBotTokens, BROWSER_LOGIN_TIMEOUT, BROWSER_POLL_INTERVAL, BrowserDriverLogin,
    CALLBACK_TIMEOUT, CallbackPayload, CallbackServer, CallbackState, DirectFormLogin,
    ExtensionLogin, LoginCoordinator, LoginError, LoginResult, LoginStrategy, SystemOpener,
    UrlOpener,
};
pub use site::JudgeSite;
pub use transport::{HttpTransport, TransportError, TransportOptions};
