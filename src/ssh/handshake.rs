//! Running one connection from banner exchange to close

use std::sync::Arc;
use std::time::Duration;

use russh::server::{run_stream, Handle};
use russh::Disconnect;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::handler::{ConnectionRecord, DecoyHandler, SessionError};
use crate::state::SharedState;

/// Why a connection ended without the client claiming a username
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Version exchange failed: garbage, EOF, or a non-SSH peer
    #[error("version exchange failed: {0}")]
    Banner(String),
    #[error("timed out")]
    Timeout,
    /// Session ended before any authentication request arrived
    #[error("client disconnected before authentication")]
    NoAuthRequest,
    #[error("i/o error: {0}")]
    Io(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Terminal result of one connection, used for the log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The client got far enough to claim a username
    Observed { user: String, attempts: u32 },
    Failed(HandshakeError),
}

impl HandshakeOutcome {
    fn from_session(
        record: ConnectionRecord,
        ended: Result<Result<(), SessionError>, HandshakeError>,
    ) -> Self {
        if let Some(user) = record.claimed_user {
            match &ended {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "session ended after username was claimed"),
                Err(e) => debug!(error = %e, "session ended after username was claimed"),
            }
            return Self::Observed {
                user,
                attempts: record.attempts,
            };
        }

        let error = match ended {
            Err(e) => e,
            Ok(Ok(())) => HandshakeError::NoAuthRequest,
            Ok(Err(SessionError::Ssh(russh::Error::Disconnect))) => HandshakeError::NoAuthRequest,
            Ok(Err(SessionError::Ssh(russh::Error::IO(e)))) => match e.kind() {
                std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe => HandshakeError::NoAuthRequest,
                _ => HandshakeError::Io(e.to_string()),
            },
            Ok(Err(e)) => HandshakeError::Protocol(e.to_string()),
        };
        Self::Failed(error)
    }

    pub fn claimed_user(&self) -> Option<&str> {
        match self {
            Self::Observed { user, .. } => Some(user),
            Self::Failed(_) => None,
        }
    }

    /// Emit the one log line this connection gets
    pub fn log(&self) {
        match self {
            Self::Observed { user, attempts } => {
                info!(user = %user, attempts, "handshake succeeded with user {}", user);
            }
            Self::Failed(e) => {
                warn!("failed to handshake: {}", e);
            }
        }
    }
}

/// Drive one raw stream through the SSH exchange and classify the result.
///
/// Never returns an error: every failure is contained in the outcome.
pub async fn negotiate<S>(stream: S, shared: Arc<SharedState>) -> HandshakeOutcome
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let deadline = deadline_after(shared.config.handshake_timeout());
    let (record_tx, mut record_rx) = watch::channel(ConnectionRecord::default());
    let handler = DecoyHandler::new(shared.clone(), record_tx);

    let setup = run_stream(shared.transport.clone(), stream, handler);
    let session = tokio::select! {
        setup = setup => match setup {
            Err(e) => return HandshakeOutcome::Failed(HandshakeError::Banner(e.to_string())),
            Ok(session) => session,
        },
        _ = expire(deadline) => return HandshakeOutcome::Failed(HandshakeError::Timeout),
    };
    let handle = session.handle();
    tokio::pin!(session);

    let mut closing = false;
    let ended = loop {
        tokio::select! {
            result = &mut session => break Ok(result),
            changed = record_rx.changed(), if !closing => {
                // Sender gone means the handler was dropped; the session
                // future is about to resolve.
                if changed.is_err() {
                    closing = true;
                } else if record_rx.borrow_and_update().terminated {
                    closing = true;
                    disconnect(&handle, "authentication failed").await;
                }
            }
            _ = expire(deadline) => break Err(HandshakeError::Timeout),
        }
    };

    if matches!(ended, Err(HandshakeError::Timeout)) {
        disconnect(&handle, "timeout").await;
    }

    let record = record_rx.borrow().clone();
    HandshakeOutcome::from_session(record, ended)
}

/// `None` when the timeout is too far out to represent as an instant
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn disconnect(handle: &Handle, reason: &str) {
    if handle
        .disconnect(Disconnect::ByApplication, reason.to_string(), String::new())
        .await
        .is_err()
    {
        debug!("session already closed");
    }
}
