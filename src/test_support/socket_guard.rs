//! Starts wiremock servers, or skips the test where localhost sockets
//! cannot be bound (some sandboxes forbid it).
//!
//! Shared by the unit tests and, through a `#[path]` module, by the
//! integration tests under `tests/`.

use std::net::TcpListener;

use wiremock::MockServer;

/// Set to `1`, `true` or `yes` to turn a skipped socket test into a failure.
const REQUIRE_SOCKET_TESTS_VAR: &str = "ALERTMINER_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_SOCKET_TESTS_VAR)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Returns a running mock server, or `None` when the test should skip.
///
/// # Panics
///
/// Panics when binding fails and `ALERTMINER_REQUIRE_SOCKET_TESTS` is set.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if let Err(err) = TcpListener::bind("127.0.0.1:0") {
        assert!(
            !socket_tests_required(),
            "cannot bind a localhost socket for wiremock ({err}) and {REQUIRE_SOCKET_TESTS_VAR} is set"
        );
        eprintln!("[socket-bound-test] cannot bind a localhost socket ({err}); skipping");
        return None;
    }
    Some(MockServer::start().await)
}
