//! CLI command handlers.

mod credentials;
mod login;
mod status;

pub use credentials::run_credentials_command;
pub use login::run_login_command;
pub use status::run_status_command;
