//! Status command handler: show the stored session.

use std::path::Path;

use anyhow::Result;
use cf_session::Session;

pub fn run_status_command(session_path: &Path) -> Result<()> {
    let session = Session::load(session_path);

    println!("session_path = {}", session_path.display());
    if session.is_logged_in() {
        println!("handle = {}", session.handle);
    } else {
        println!("handle = not logged in");
    }
    println!("cookies = {}", session.cookies.len());
    println!(
        "password = {}",
        if session.has_credentials() {
            format!("stored for {}", session.handle_or_email)
        } else {
            "not stored".to_string()
        }
    );

    Ok(())
}
