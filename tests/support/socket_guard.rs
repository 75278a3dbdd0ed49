//! Skip logic for tests that listen on loopback: the extension callback
//! server and the wiremock stand-in for the judge.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "CF_SESSION_REQUIRE_SOCKET_TESTS";

fn loopback_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Returns `true` when no `127.0.0.1` port can be bound, so the calling test
/// should return early. Panics instead when `CF_SESSION_REQUIRE_SOCKET_TESTS`
/// is set, so CI cannot silently skip login coverage.
#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let location = Location::caller();
    let message = format!(
        "[loopback] {}:{} needs an ephemeral 127.0.0.1 port for the callback server or fake judge",
        location.file(),
        location.line()
    );
    assert!(!loopback_required(), "{message}; unset {REQUIRE_ENV} to skip instead");

    eprintln!("{message}; skipping (set {REQUIRE_ENV}=1 to fail instead)");
    true
}

/// Starts the fake judge, or `None` when loopback is unavailable.
#[allow(dead_code)]
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        return None;
    }
    Some(MockServer::start().await)
}
