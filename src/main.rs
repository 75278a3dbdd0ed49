//! CLI entry point for cf-session.

use anyhow::{Result, anyhow};
use cf_session::{JudgeSite, LoginCoordinator, default_session_path};
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let session_path = match args.session {
        Some(path) => path,
        None => default_session_path()
            .map_err(|error| anyhow!("Cannot locate the session file: {error}"))?,
    };

    if let Command::Status = args.command {
        return commands::run_status_command(&session_path);
    }

    let site = JudgeSite::new(args.host);
    let mut coordinator = LoginCoordinator::open(session_path, site, args.proxy)
        .map_err(|error| anyhow!("Cannot initialize the session: {error}"))?;

    match args.command {
        Command::Login(login) => commands::run_login_command(&mut coordinator, login.strategy).await,
        Command::Credentials(credentials) => {
            commands::run_credentials_command(&mut coordinator, &credentials.handle_or_email)
        }
        Command::Status => commands::run_status_command(coordinator.session_path()),
    }
}
