//! Login failure taxonomy.

use std::time::Duration;

use crate::auth::{SessionError, VaultError};
use crate::browser::DriverError;
use crate::transport::TransportError;

/// Errors surfaced by login strategies and the coordinator.
///
/// Messages never include passwords or cookie values.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// Required settings are missing (e.g. no stored credentials).
    #[error("{0}")]
    Configuration(String),

    /// The stored password could not be decrypted.
    #[error(transparent)]
    Decryption(#[from] VaultError),

    /// Network or local listener failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The strategy did not finish before its deadline.
    #[error("login timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The extension sent a payload that is not usable.
    #[error("malformed callback payload: {0}")]
    MalformedPayload(String),

    /// The captured cookie string held no cookies.
    #[error("no cookies were captured")]
    NoCookies,

    /// The login page carried no CSRF token.
    #[error("CSRF token not found on the login page")]
    CsrfNotFound,

    /// The judge did not accept the credentials.
    #[error("login failed: check handle/e-mail and password")]
    NotLoggedIn,

    /// The browser could not be launched.
    #[error("browser unavailable: {0}")]
    DriverUnavailable(String),

    /// The browser failed after launch.
    #[error("browser error: {0}")]
    Driver(String),

    /// The user cancelled the login.
    #[error("login cancelled")]
    Cancelled,

    /// The session could not be persisted.
    #[error(transparent)]
    Persistence(#[from] SessionError),
}

impl From<DriverError> for LoginError {
    fn from(error: DriverError) -> Self {
        match error {
            DriverError::Unavailable(message) => Self::DriverUnavailable(message),
            DriverError::Protocol(message) => Self::Driver(message),
        }
    }
}
