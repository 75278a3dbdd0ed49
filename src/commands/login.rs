//! Login command handler.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use cf_session::{CALLBACK_TIMEOUT, ChromeDriver, LoginCoordinator, SystemOpener};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::StrategyArg;

pub async fn run_login_command(
    coordinator: &mut LoginCoordinator,
    strategy: StrategyArg,
) -> Result<()> {
    if let Some(handle) = coordinator.current_handle() {
        info!("Current user: {handle}");
    }

    let outcome = match strategy {
        StrategyArg::Extension => {
            coordinator
                .login_with_extension(Arc::new(SystemOpener), CALLBACK_TIMEOUT)
                .await
        }
        StrategyArg::Browser => {
            let cancel = CancellationToken::new();
            let signal = cancel.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("interrupt received; cancelling browser login");
                    signal.cancel();
                }
            });
            let outcome = coordinator
                .login_with_browser(Arc::new(ChromeDriver), cancel)
                .await;
            watcher.abort();
            outcome
        }
        StrategyArg::Password => coordinator.login_with_password().await,
    };

    let session = outcome.map_err(|error| anyhow!("Login failed: {error}"))?;
    println!("Welcome {}", session.handle);
    Ok(())
}
