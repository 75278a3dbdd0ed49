//! Persisted session snapshot.
//!
//! The session lives at `~/.config/cf-session/session.json` (or
//! `$XDG_CONFIG_HOME/cf-session/session.json`) unless a path is given.
//! Loading never fails: a missing or unreadable snapshot falls back to an
//! empty session. Saving is a plain overwrite; a concurrent reader may observe
//! a partially written file.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::cookies::CookieJar;

const APP_DIR_NAME: &str = "cf-session";
const SESSION_FILE_NAME: &str = "session.json";

/// Errors for session persistence.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,
    /// Filesystem I/O failed.
    #[error("cannot access session file {path}: {source}")]
    Io {
        /// Session file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Serialization/deserialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Authenticated session state shared across invocations.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    /// Cookies the transport sends to the judge.
    #[serde(with = "shared_jar", default)]
    pub cookies: Arc<CookieJar>,
    /// Handle reported by the judge after the last successful login.
    #[serde(default)]
    pub handle: String,
    /// Handle or e-mail used for password login; also keys the vault.
    #[serde(default)]
    pub handle_or_email: String,
    /// Vault ciphertext of the password (hex). Never plaintext.
    #[serde(default)]
    pub password: String,
    /// Anti-bot `ftaa` token submitted with the last password login.
    #[serde(default)]
    pub ftaa: String,
    /// Anti-bot `bfaa` token submitted with the last password login.
    #[serde(default)]
    pub bfaa: String,
    /// Opaque record of the last submission, owned by the submit flow.
    #[serde(default)]
    pub last_submission: Option<serde_json::Value>,
    /// User-Agent override for the transport; empty means the default.
    #[serde(default)]
    pub user_agent: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            cookies: Arc::new(CookieJar::new()),
            handle: String::new(),
            handle_or_email: String::new(),
            password: String::new(),
            ftaa: String::new(),
            bfaa: String::new(),
            last_submission: None,
            user_agent: String::new(),
        }
    }
}

// Custom Debug impl that redacts the password ciphertext.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookies", &self.cookies.len())
            .field("handle", &self.handle)
            .field("handle_or_email", &self.handle_or_email)
            .field(
                "password",
                &if self.password.is_empty() { "" } else { "[REDACTED]" },
            )
            .field("ftaa", &self.ftaa)
            .field("bfaa", &self.bfaa)
            .field("last_submission", &self.last_submission.is_some())
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Session {
    /// Whether a successful login has been recorded.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        !self.handle.is_empty()
    }

    /// Whether password-login credentials are stored.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.handle_or_email.is_empty() && !self.password.is_empty()
    }

    /// Loads the snapshot at `path`, falling back to an empty session.
    ///
    /// A missing file is the normal first-run case; a malformed file is
    /// reported and replaced on the next save.
    #[must_use]
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(session) => {
                debug!(handle = %session.handle, cookies = session.cookies.len(), "loaded session");
                session
            }
            Err(SessionError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                warn!(path = %path.display(), "no saved session; starting a new one");
                Self::default()
            }
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "cannot read saved session; starting a new one"
                );
                Self::default()
            }
        }
    }

    /// Loads the snapshot at `path`, surfacing failures.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the file cannot be read and
    /// [`SessionError::Json`] if it is not a valid snapshot.
    pub fn try_load(path: &Path) -> Result<Self, SessionError> {
        let raw = fs::read(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Writes the full snapshot to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if serialization or any filesystem step fails.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let data = serde_json::to_vec_pretty(self)?;
        let io_error = |source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, data).map_err(io_error)?;
        set_owner_only_permissions(path).map_err(io_error)?;
        debug!(cookies = self.cookies.len(), "saved session");
        Ok(())
    }
}

/// Returns the default session path (`~/.config/cf-session/session.json`).
///
/// # Errors
///
/// Returns [`SessionError::ConfigDirUnavailable`] if no usable config dir is found.
pub fn default_session_path() -> Result<PathBuf, SessionError> {
    Ok(default_config_dir()?.join(SESSION_FILE_NAME))
}

fn default_config_dir() -> Result<PathBuf, SessionError> {
    resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_config_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, SessionError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join(APP_DIR_NAME));
    }

    Err(SessionError::ConfigDirUnavailable)
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Serializes the shared jar as a plain cookie list.
mod shared_jar {
    use std::sync::Arc;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::auth::cookies::{Cookie, CookieJar};

    pub(super) fn serialize<S: Serializer>(
        jar: &Arc<CookieJar>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        jar.snapshot().serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Arc<CookieJar>, D::Error> {
        let cookies = Option::<Vec<Cookie>>::deserialize(deserializer)?.unwrap_or_default();
        let jar = CookieJar::new();
        jar.insert_all(cookies);
        Ok(Arc::new(jar))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use url::Url;

    use super::*;
    use crate::auth::cookies::Cookie;

    fn sample_session() -> Session {
        let base = Url::parse("https://codeforces.com/").unwrap();
        Session {
            cookies: Arc::new(CookieJar::with_cookies(
                &base,
                [
                    Cookie::new("JSESSIONID", "abc", "codeforces.com", "/"),
                    Cookie::new("39ce7", "CFx", ".codeforces.com", "/"),
                ],
            )),
            handle: "tourist".to_string(),
            handle_or_email: "tourist@example.com".to_string(),
            password: "00ff".to_string(),
            ftaa: "abcdefghij01234567".to_string(),
            bfaa: "f1b3f18c715565b589b7823cda7448ce".to_string(),
            last_submission: Some(serde_json::json!({"id": 42})),
            user_agent: String::new(),
        }
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let tempdir = TempDir::new().unwrap();
        let path = tempdir.path().join("nested").join("dir").join("session.json");
        let session = sample_session();

        session.save(&path).unwrap();
        let loaded = Session::load(&path);

        assert_eq!(loaded.handle, "tourist");
        assert_eq!(loaded.handle_or_email, "tourist@example.com");
        assert_eq!(loaded.password, "00ff");
        assert_eq!(loaded.ftaa, session.ftaa);
        assert_eq!(loaded.bfaa, session.bfaa);
        assert_eq!(loaded.last_submission, session.last_submission);
        assert_eq!(loaded.cookies.snapshot(), session.cookies.snapshot());
    }

    #[test]
    fn test_snapshot_uses_documented_field_names() {
        let value = serde_json::to_value(sample_session()).unwrap();
        for field in [
            "cookies",
            "handle",
            "handle_or_email",
            "password",
            "ftaa",
            "bfaa",
            "last_submission",
            "user_agent",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["cookies"][0]["name"], "39ce7");
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let tempdir = TempDir::new().unwrap();
        let loaded = Session::load(&tempdir.path().join("absent.json"));
        assert!(!loaded.is_logged_in());
        assert!(loaded.cookies.is_empty());
    }

    #[test]
    fn test_load_malformed_file_returns_default() {
        let tempdir = TempDir::new().unwrap();
        let path = tempdir.path().join("session.json");
        fs::write(&path, b"{ not json").unwrap();

        let loaded = Session::load(&path);
        assert!(loaded.handle.is_empty());
        assert!(matches!(Session::try_load(&path), Err(SessionError::Json(_))));
    }

    #[test]
    fn test_load_accepts_sparse_snapshot() {
        let tempdir = TempDir::new().unwrap();
        let path = tempdir.path().join("session.json");
        fs::write(&path, br#"{"cookies": null, "handle": "petr"}"#).unwrap();

        let loaded = Session::try_load(&path).unwrap();
        assert_eq!(loaded.handle, "petr");
        assert!(loaded.cookies.is_empty());
        assert!(!loaded.has_credentials());
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", sample_session());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("00ff"));
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = TempDir::new().unwrap();
        let path = tempdir.path().join("session.json");
        sample_session().save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_sanitize_env_path_rejects_blank_values() {
        assert!(sanitize_env_path(Some(OsString::from(""))).is_none());
        assert!(sanitize_env_path(Some(OsString::from("   "))).is_none());
    }

    #[test]
    fn test_resolve_config_dir_prefers_xdg_over_home() {
        let resolved = resolve_config_dir(
            Some(PathBuf::from("/tmp/xdg")),
            Some(PathBuf::from("/tmp/home")),
            None,
        )
        .unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/xdg/cf-session"));
    }

    #[test]
    fn test_resolve_config_dir_falls_back_to_home_then_appdata() {
        let resolved = resolve_config_dir(None, Some(PathBuf::from("/tmp/home")), None).unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/home/.config/cf-session"));

        let resolved = resolve_config_dir(None, None, Some(PathBuf::from("/tmp/appdata"))).unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/appdata/cf-session"));
    }

    #[test]
    fn test_resolve_config_dir_errors_when_all_sources_missing() {
        assert!(matches!(
            resolve_config_dir(None, None, None),
            Err(SessionError::ConfigDirUnavailable)
        ));
    }
}
