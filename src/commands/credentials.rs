//! Credentials command handler: encrypt and store the login password.

use std::io::{self, BufRead, IsTerminal};

use anyhow::{Result, anyhow, bail};
use cf_session::LoginCoordinator;
use tracing::info;

pub fn run_credentials_command(
    coordinator: &mut LoginCoordinator,
    handle_or_email: &str,
) -> Result<()> {
    if io::stdin().is_terminal() {
        info!("Type the password for {handle_or_email}, then press Enter:");
    }

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("No password provided on stdin");
    }

    coordinator
        .store_credentials(handle_or_email, password)
        .map_err(|error| anyhow!("Failed to store credentials: {error}"))?;

    println!("Credentials stored for {}", handle_or_email.trim());
    Ok(())
}
