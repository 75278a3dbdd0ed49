//! Runs a login strategy and finalizes its result into the persisted session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::{
    BrowserDriverLogin, DirectFormLogin, ExtensionLogin, LoginError, LoginResult, LoginStrategy,
    UrlOpener,
};
use crate::auth::{self, CookieJar, Session};
use crate::browser::BrowserDriver;
use crate::site::JudgeSite;
use crate::transport::{HttpTransport, TransportOptions};

/// Owns the session, its file, and the transport bound to its cookie jar.
///
/// Every entry point takes `&mut self`, so one coordinator never runs two
/// strategies at once.
#[derive(Debug)]
pub struct LoginCoordinator {
    session: Session,
    session_path: PathBuf,
    transport: HttpTransport,
    site: JudgeSite,
}

impl LoginCoordinator {
    /// Loads the session at `session_path` and builds a transport around it.
    ///
    /// A missing or malformed session file yields an empty session.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Transport`] if the HTTP client cannot be built.
    pub fn open(
        session_path: impl Into<PathBuf>,
        site: JudgeSite,
        proxy: Option<String>,
    ) -> Result<Self, LoginError> {
        let session_path = session_path.into();
        let session = Session::load(&session_path);
        Self::with_session(session, session_path, site, proxy)
    }

    /// Builds a coordinator around an already loaded session.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Transport`] if the HTTP client cannot be built.
    pub fn with_session(
        session: Session,
        session_path: impl Into<PathBuf>,
        site: JudgeSite,
        proxy: Option<String>,
    ) -> Result<Self, LoginError> {
        let options = TransportOptions {
            user_agent: Some(session.user_agent.clone()).filter(|ua| !ua.is_empty()),
            proxy,
        };
        let transport = HttpTransport::new(Arc::clone(&session.cookies), &options)?;
        Ok(Self {
            session,
            session_path: session_path.into(),
            transport,
            site,
        })
    }

    /// Current session state.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Path the session is persisted to.
    #[must_use]
    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Transport bound to the session's cookies.
    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Site settings.
    #[must_use]
    pub fn site(&self) -> &JudgeSite {
        &self.site
    }

    /// Handle of the logged-in user, if any.
    #[must_use]
    pub fn current_handle(&self) -> Option<&str> {
        Some(self.session.handle.as_str()).filter(|handle| !handle.is_empty())
    }

    /// Logs in through the browser extension.
    ///
    /// # Errors
    ///
    /// See [`ExtensionLogin`]; also [`LoginError::Persistence`] on save failure.
    pub async fn login_with_extension(
        &mut self,
        opener: Arc<dyn UrlOpener>,
        deadline: Duration,
    ) -> Result<&Session, LoginError> {
        let strategy = ExtensionLogin::new(self.site.clone(), opener, deadline);
        self.run(&strategy).await
    }

    /// Logs in inside a driven browser window.
    ///
    /// # Errors
    ///
    /// See [`BrowserDriverLogin`]; also [`LoginError::Persistence`] on save failure.
    pub async fn login_with_browser(
        &mut self,
        driver: Arc<dyn BrowserDriver>,
        cancel: CancellationToken,
    ) -> Result<&Session, LoginError> {
        let strategy = BrowserDriverLogin::new(self.site.clone(), driver, cancel);
        self.run(&strategy).await
    }

    /// Logs in with the stored, encrypted credentials.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Configuration`] when no credentials are stored,
    /// [`LoginError::Decryption`] when the stored password cannot be opened,
    /// and the errors of [`DirectFormLogin`] otherwise.
    #[instrument(level = "info", skip_all)]
    pub async fn login_with_password(&mut self) -> Result<&Session, LoginError> {
        if !self.session.has_credentials() {
            return Err(LoginError::Configuration(
                "no stored credentials; run `cf-session credentials` first".to_string(),
            ));
        }
        let password = auth::decrypt(&self.session.handle_or_email, &self.session.password)?;

        let outcome = {
            let strategy = DirectFormLogin::new(
                &self.transport,
                &self.site,
                self.session.handle_or_email.clone(),
                password,
            );
            strategy.login().await
        };
        self.conclude("password", outcome)
    }

    /// Runs any strategy and finalizes its result.
    ///
    /// On failure the transport is re-bound to the session's jar and nothing
    /// is persisted.
    ///
    /// # Errors
    ///
    /// Returns the strategy's error, or [`LoginError::Persistence`] when the
    /// session cannot be saved.
    #[instrument(level = "info", skip_all, fields(strategy = strategy.name()))]
    pub async fn run(&mut self, strategy: &dyn LoginStrategy) -> Result<&Session, LoginError> {
        let outcome = strategy.login().await;
        self.conclude(strategy.name(), outcome)
    }

    fn conclude(
        &mut self,
        strategy: &str,
        outcome: Result<LoginResult, LoginError>,
    ) -> Result<&Session, LoginError> {
        match outcome {
            Ok(result) => self.finalize(result),
            Err(error) => {
                warn!(strategy, error = %error, "login failed; keeping the previous session");
                self.transport
                    .set_cookie_jar(Arc::clone(&self.session.cookies));
                Err(error)
            }
        }
    }

    /// Installs a login result: new jar, updated session, saved to disk.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Persistence`] if the session cannot be saved. The
    /// in-memory session is already updated at that point.
    #[instrument(level = "debug", skip_all, fields(handle = %result.handle))]
    pub fn finalize(&mut self, result: LoginResult) -> Result<&Session, LoginError> {
        let jar = Arc::new(CookieJar::with_cookies(self.site.host(), result.cookies));

        let mut next = self.session.clone();
        next.cookies = Arc::clone(&jar);
        next.handle = result.handle;
        if let Some(tokens) = result.anti_bot {
            next.ftaa = tokens.ftaa;
            next.bfaa = tokens.bfaa;
        }

        self.transport.set_cookie_jar(jar);
        self.session = next;
        self.session.save(&self.session_path)?;

        info!(
            handle = %self.session.handle,
            cookies = self.session.cookies.len(),
            "session saved"
        );
        Ok(&self.session)
    }

    /// Encrypts and stores password-login credentials.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Configuration`] for empty input,
    /// [`LoginError::Decryption`] if sealing fails, and
    /// [`LoginError::Persistence`] on save failure.
    #[instrument(level = "info", skip(self, password))]
    pub fn store_credentials(
        &mut self,
        handle_or_email: &str,
        password: &str,
    ) -> Result<(), LoginError> {
        let handle_or_email = handle_or_email.trim();
        if handle_or_email.is_empty() || password.is_empty() {
            return Err(LoginError::Configuration(
                "handle/e-mail and password must not be empty".to_string(),
            ));
        }

        let sealed = auth::encrypt(handle_or_email, password)?;
        let mut next = self.session.clone();
        next.handle_or_email = handle_or_email.to_string();
        next.password = sealed;
        next.save(&self.session_path)?;
        self.session = next;

        info!("credentials stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::auth::Cookie;
    use crate::login::{AntiBotTokens, BFAA};

    /// Succeeds with the given result, or fails with `NotLoggedIn`.
    struct Fixed(Option<LoginResult>);

    #[async_trait]
    impl LoginStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn login(&self) -> Result<LoginResult, LoginError> {
            self.0.clone().ok_or(LoginError::NotLoggedIn)
        }
    }

    fn coordinator(dir: &TempDir) -> LoginCoordinator {
        LoginCoordinator::open(dir.path().join("session.json"), JudgeSite::default(), None).unwrap()
    }

    fn result(handle: &str) -> LoginResult {
        LoginResult {
            handle: handle.to_string(),
            cookies: vec![Cookie::new("JSESSIONID", "abc", ".codeforces.com", "/")],
            anti_bot: None,
        }
    }

    #[tokio::test]
    async fn test_run_success_persists_and_swaps_jar() {
        let dir = TempDir::new().unwrap();
        let mut coordinator = coordinator(&dir);

        let session = coordinator.run(&Fixed(Some(result("tourist")))).await.unwrap();
        assert_eq!(session.handle, "tourist");

        assert_eq!(coordinator.current_handle(), Some("tourist"));
        assert!(Arc::ptr_eq(
            &coordinator.transport().cookie_jar(),
            &coordinator.session().cookies
        ));
        let saved = Session::try_load(coordinator.session_path()).unwrap();
        assert_eq!(saved.handle, "tourist");
        assert_eq!(saved.cookies.len(), 1);
    }

    #[tokio::test]
    async fn test_run_failure_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let mut coordinator = coordinator(&dir);
        coordinator.run(&Fixed(Some(result("tourist")))).await.unwrap();
        let before = std::fs::read(coordinator.session_path()).unwrap();

        coordinator
            .transport()
            .set_cookie_jar(Arc::new(CookieJar::new()));
        let error = coordinator
            .run(&Fixed(None))
            .await
            .unwrap_err();
        assert!(matches!(error, LoginError::NotLoggedIn));

        assert_eq!(std::fs::read(coordinator.session_path()).unwrap(), before);
        assert_eq!(coordinator.current_handle(), Some("tourist"));
        assert!(Arc::ptr_eq(
            &coordinator.transport().cookie_jar(),
            &coordinator.session().cookies
        ));
    }

    #[tokio::test]
    async fn test_finalize_records_anti_bot_tokens() {
        let dir = TempDir::new().unwrap();
        let mut coordinator = coordinator(&dir);
        let mut login = result("petr");
        login.anti_bot = Some(AntiBotTokens {
            ftaa: "abcdefghijklmnopqr".to_string(),
            bfaa: BFAA.to_string(),
        });

        coordinator.finalize(login).unwrap();
        assert_eq!(coordinator.session().ftaa, "abcdefghijklmnopqr");
        assert_eq!(coordinator.session().bfaa, BFAA);
    }

    #[test]
    fn test_store_credentials_encrypts_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut coordinator = coordinator(&dir);

        coordinator
            .store_credentials("tourist@example.com", "hunter2")
            .unwrap();

        let saved = Session::try_load(coordinator.session_path()).unwrap();
        assert_eq!(saved.handle_or_email, "tourist@example.com");
        assert_ne!(saved.password, "hunter2");
        assert_eq!(
            auth::decrypt("tourist@example.com", &saved.password).unwrap(),
            "hunter2"
        );
    }

    #[test]
    fn test_store_credentials_rejects_empty_input() {
        let dir = TempDir::new().unwrap();
        let mut coordinator = coordinator(&dir);
        assert!(matches!(
            coordinator.store_credentials("  ", "pw"),
            Err(LoginError::Configuration(_))
        ));
        assert!(!coordinator.session_path().exists());
    }

    #[tokio::test]
    async fn test_password_login_without_credentials_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let mut coordinator = coordinator(&dir);
        assert!(matches!(
            coordinator.login_with_password().await,
            Err(LoginError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_password_login_with_undecryptable_password() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::default();
        session.handle_or_email = "tourist".to_string();
        session.password = "not-hex".to_string();
        let mut coordinator = LoginCoordinator::with_session(
            session,
            dir.path().join("session.json"),
            JudgeSite::default(),
            None,
        )
        .unwrap();

        assert!(matches!(
            coordinator.login_with_password().await,
            Err(LoginError::Decryption(_))
        ));
        assert!(!coordinator.session_path().exists());
    }
}
