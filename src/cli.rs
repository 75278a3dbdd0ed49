//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use url::Url;

use cf_session::site::DEFAULT_HOST;

/// Obtain and keep an authenticated judge session.
///
/// The session is stored on disk and reused by every later invocation.
#[derive(Parser, Debug)]
#[command(name = "cf-session")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Session file (default: ~/.config/cf-session/session.json)
    #[arg(long, env = "CF_SESSION_PATH", global = true)]
    pub session: Option<PathBuf>,

    /// Judge base URL
    #[arg(long, env = "CF_HOST", default_value = DEFAULT_HOST, value_parser = parse_host, global = true)]
    pub host: Url,

    /// Proxy for all judge traffic (e.g. http://127.0.0.1:8080)
    #[arg(long, env = "CF_PROXY", global = true)]
    pub proxy: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in and save the session
    Login(LoginArgs),
    /// Store the handle/e-mail and password used by `login --strategy password`
    Credentials(CredentialsArgs),
    /// Show the stored session
    Status,
}

#[derive(ClapArgs, Debug)]
pub struct LoginArgs {
    /// How to obtain the session
    #[arg(long, value_enum, default_value_t = StrategyArg::Extension)]
    pub strategy: StrategyArg,
}

#[derive(ClapArgs, Debug)]
pub struct CredentialsArgs {
    /// Handle or e-mail to log in with; the password is read from stdin
    #[arg(long)]
    pub handle_or_email: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    /// Companion browser extension posts the session back
    Extension,
    /// Log in inside a browser window driven by this tool
    Browser,
    /// Submit the login form with stored credentials
    Password,
}

fn parse_host(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|error| format!("invalid URL: {error}"))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err("host must be an http(s) URL".to_string()),
    }
}
