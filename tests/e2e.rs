//! End-to-end tests for sshsnare
//!
//! Every test runs a real listener on 127.0.0.1 and talks to it with the
//! probe client or a raw TCP socket; the startup test runs the binary.

use std::net::SocketAddr;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use sshsnare::config::Config;
use sshsnare::host_key::{generate, HostKeyAlgorithm};
use sshsnare::ssh::{negotiate, HandshakeError, HandshakeOutcome, ServeError, Supervisor};
use sshsnare::state::SharedState;
use sshsnare::testing::{ProbeResult, SshProbe};

// ============================================================================
// Test Helpers
// ============================================================================

fn test_state(close_after_first_attempt: bool) -> Arc<SharedState> {
    test_state_with(Config {
        close_after_first_attempt,
        ..test_config()
    })
}

fn test_config() -> Config {
    Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        handshake_timeout_secs: 10,
        inactivity_timeout_secs: 10,
        ..Default::default()
    }
}

fn test_state_with(config: Config) -> Arc<SharedState> {
    let identity = generate(config.host_key_algorithm).unwrap();
    Arc::new(SharedState::new(config, &identity))
}

/// Accept exactly one connection and run it through the decoy
async fn single_connection(
    state: Arc<SharedState>,
) -> (SocketAddr, JoinHandle<HandshakeOutcome>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        negotiate(stream, state).await
    });
    (addr, task)
}

async fn outcome(task: JoinHandle<HandshakeOutcome>) -> HandshakeOutcome {
    tokio::time::timeout(Duration::from_secs(15), task)
        .await
        .expect("connection did not finish")
        .expect("connection task panicked")
}

async fn start_supervisor(
    state: Arc<SharedState>,
) -> (
    SocketAddr,
    CancellationToken,
    JoinHandle<Result<(), ServeError>>,
) {
    let supervisor = Supervisor::bind("127.0.0.1:0".parse().unwrap(), state)
        .await
        .unwrap();
    let addr = supervisor.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(supervisor.serve(shutdown.clone()));
    (addr, shutdown, task)
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_password_denied_and_user_logged() {
    let (addr, task) = single_connection(test_state(true)).await;

    let mut probe = assert_ok!(SshProbe::connect(addr).await);
    let result = probe.password("root", "hunter2").await;
    assert!(!matches!(result, Ok(ProbeResult::Accepted)));
    let _ = probe.close().await;

    assert_eq!(
        outcome(task).await,
        HandshakeOutcome::Observed {
            user: "root".to_string(),
            attempts: 1
        }
    );
}

#[tokio::test]
async fn test_every_method_denied_with_unbounded_retries() {
    let (addr, task) = single_connection(test_state(false)).await;

    let mut probe = assert_ok!(SshProbe::connect(addr).await);
    for password in ["123456", "admin", "hunter2"] {
        let result = assert_ok!(probe.password("admin", password).await);
        assert_eq!(result, ProbeResult::Rejected);
    }
    let result = assert_ok!(probe.keyboard_interactive("admin", "letmein").await);
    assert_eq!(result, ProbeResult::Rejected);
    let result = assert_ok!(probe.publickey("admin").await);
    assert_eq!(result, ProbeResult::Rejected);
    let _ = probe.close().await;

    match outcome(task).await {
        HandshakeOutcome::Observed { user, attempts } => {
            assert_eq!(user, "admin");
            assert!(attempts >= 5, "only {} attempts counted", attempts);
        }
        other => panic!("expected observed user, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_retry_after_first_denial() {
    let (addr, task) = single_connection(test_state(true)).await;

    let mut probe = assert_ok!(SshProbe::connect(addr).await);
    let first = probe.password("oracle", "oracle").await;
    assert!(!matches!(first, Ok(ProbeResult::Accepted)));
    // Either refused outright or the connection is already gone
    let second = probe.password("oracle", "welcome1").await;
    assert!(!matches!(second, Ok(ProbeResult::Accepted)));
    let _ = probe.close().await;

    assert_eq!(
        outcome(task).await,
        HandshakeOutcome::Observed {
            user: "oracle".to_string(),
            attempts: 1
        }
    );
}

#[tokio::test]
async fn test_keyboard_interactive_denied() {
    let (addr, task) = single_connection(test_state(true)).await;

    let mut probe = assert_ok!(SshProbe::connect(addr).await);
    let result = probe.keyboard_interactive("pi", "raspberry").await;
    assert!(!matches!(result, Ok(ProbeResult::Accepted)));
    let _ = probe.close().await;

    assert_eq!(outcome(task).await.claimed_user(), Some("pi"));
}

#[tokio::test]
async fn test_host_key_is_p256_by_default() {
    let (addr, task) = single_connection(test_state(true)).await;

    let probe = assert_ok!(SshProbe::connect(addr).await);
    assert_eq!(
        probe.host_key_algorithm().as_deref(),
        Some(HostKeyAlgorithm::EcdsaP256.as_str())
    );
    let _ = probe.close().await;
    let _ = outcome(task).await;
}

#[tokio::test]
async fn test_repeated_connections_same_outcome() {
    let state = test_state(true);
    let mut outcomes = Vec::new();

    for _ in 0..3 {
        let (addr, task) = single_connection(state.clone()).await;
        let mut probe = assert_ok!(SshProbe::connect(addr).await);
        let _ = probe.password("ubuntu", "ubuntu").await;
        let _ = probe.close().await;
        outcomes.push(outcome(task).await);
    }

    assert!(outcomes.windows(2).all(|w| w[0] == w[1]), "{:?}", outcomes);
}

// ============================================================================
// Handshake failures
// ============================================================================

#[tokio::test]
async fn test_garbage_banner_fails_without_user() {
    let (addr, task) = single_connection(test_state(true)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: decoy\r\n\r\n")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();

    let outcome = outcome(task).await;
    assert!(
        matches!(outcome, HandshakeOutcome::Failed(HandshakeError::Banner(_))),
        "{:?}",
        outcome
    );
    assert_eq!(outcome.claimed_user(), None);
}

#[tokio::test]
async fn test_truncated_handshake_fails_without_user() {
    let (addr, task) = single_connection(test_state(true)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"SSH-2.0-scanner_0.1\r\n").await.unwrap();
    stream.write_all(&[0, 0, 0, 12, 4]).await.unwrap();
    stream.shutdown().await.unwrap();

    let outcome = outcome(task).await;
    assert!(matches!(outcome, HandshakeOutcome::Failed(_)), "{:?}", outcome);
    assert_eq!(outcome.claimed_user(), None);
}

#[tokio::test]
async fn test_disconnect_before_auth_is_failure() {
    let (addr, task) = single_connection(test_state(true)).await;

    let probe = assert_ok!(SshProbe::connect(addr).await);
    let _ = probe.close().await;

    let outcome = outcome(task).await;
    assert!(matches!(outcome, HandshakeOutcome::Failed(_)), "{:?}", outcome);
    assert_eq!(outcome.claimed_user(), None);
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let state = test_state_with(Config {
        handshake_timeout_secs: 1,
        ..test_config()
    });
    let (addr, task) = single_connection(state).await;

    let _stream = TcpStream::connect(addr).await.unwrap();

    assert_eq!(
        outcome(task).await,
        HandshakeOutcome::Failed(HandshakeError::Timeout)
    );
}

// ============================================================================
// Supervisor
// ============================================================================

#[tokio::test]
async fn test_stalled_client_does_not_block_accept_loop() {
    let (addr, shutdown, server) = start_supervisor(test_state(true)).await;

    // Connects and never speaks
    let _staller = TcpStream::connect(addr).await.unwrap();

    let mut probe = tokio::time::timeout(Duration::from_secs(5), SshProbe::connect(addr))
        .await
        .expect("second connection was blocked")
        .unwrap();
    let result = probe.password("root", "toor").await;
    assert!(!matches!(result, Ok(ProbeResult::Accepted)));
    let _ = probe.close().await;

    shutdown.cancel();
    assert_ok!(server.await.unwrap());
}

#[tokio::test]
async fn test_bad_connection_does_not_affect_others() {
    let (addr, shutdown, server) = start_supervisor(test_state(true)).await;

    let mut garbage = TcpStream::connect(addr).await.unwrap();
    garbage.write_all(b"\x00\xff\x00\xff not ssh\r\n").await.unwrap();
    drop(garbage);

    let mut probe = assert_ok!(SshProbe::connect(addr).await);
    let result = probe.password("admin", "admin").await;
    assert!(!matches!(result, Ok(ProbeResult::Accepted)));
    let _ = probe.close().await;

    shutdown.cancel();
    assert_ok!(server.await.unwrap());
}

#[tokio::test]
async fn test_port_in_use_is_fatal() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = occupied.local_addr().unwrap();

    match Supervisor::bind(addr, test_state(true)).await {
        Err(ServeError::Listen { addr: failed, .. }) => assert_eq!(failed, addr),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("bound an occupied port"),
    }
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn test_fatal_error_reported_once() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = occupied.local_addr().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_sshsnare"))
        .env("SSHSNARE_CONFIG", "/nonexistent/sshsnare.toml")
        .env("SSHSNARE_LISTEN", addr.to_string())
        .env_remove("RUST_LOG")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        text.matches("failed to listen for connection").count(),
        1,
        "{}",
        text
    );
    assert!(!text.contains("Error: "), "{}", text);
}
