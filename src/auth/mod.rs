//! Credential and session state.
//!
//! This module holds the cookie jar shared with the HTTP transport, the
//! persisted session snapshot, and the vault that seals the stored password.

mod cookies;
mod session;
mod vault;

pub use cookies::{Cookie, CookieJar, domain_matches, parse_cookie_string};
pub use session::{Session, SessionError, default_session_path};
pub use vault::{VaultError, decrypt, decrypt_bytes, encrypt, encrypt_bytes};
