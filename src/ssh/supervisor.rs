//! Listener ownership and the accept loop

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::backoff::Backoff;
use super::handshake::negotiate;
use crate::state::SharedState;

/// Errors that stop the whole server
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to listen for connection on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept incoming connection: {0}")]
    Accept(#[source] io::Error),
}

/// Owns the listener and spawns one task per connection
pub struct Supervisor {
    listener: TcpListener,
    shared: Arc<SharedState>,
}

impl Supervisor {
    /// Bind the listener. Failure here is fatal to startup.
    pub async fn bind(addr: SocketAddr, shared: Arc<SharedState>) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Listen { addr, source })?;
        Ok(Self { listener, shared })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires or the listener breaks.
    ///
    /// The loop never waits on a connection's work: each one runs in its
    /// own task, so a stalled or panicking client affects nobody else.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ServeError> {
        let mut backoff = Backoff::new();
        info!(
            addr = ?self.local_addr().ok(),
            host_key = %self.shared.host_fingerprint,
            "accepting connections"
        );

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutting down accept loop");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    backoff.on_success();
                    self.spawn_connection(stream, peer);
                }
                Err(e) if is_transient(&e) => {
                    let delay = backoff.on_failure();
                    warn!(
                        failures = backoff.failures(),
                        retry_in_ms = delay.as_millis() as u64,
                        "failed to accept incoming connection: {}",
                        e
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!("listener failed: {}", e);
                    return Err(ServeError::Accept(e));
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let conn_id = Uuid::now_v7();
        let span = info_span!("conn", conn.id = %conn_id, peer = %peer);
        let shared = self.shared.clone();

        tokio::spawn(
            async move {
                info!("new connection");
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("set_nodelay failed: {}", e);
                }
                let outcome = negotiate(stream, shared).await;
                outcome.log();
            }
            .instrument(span),
        );
    }
}

/// Too many open files in the system
const ENFILE: i32 = 23;
/// Too many open files in this process
const EMFILE: i32 = 24;

/// Accept errors that concern one connection or a passing resource
/// shortage, not the listener itself.
fn is_transient(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => true,
        _ => matches!(e.raw_os_error(), Some(ENFILE) | Some(EMFILE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_level_errors_are_transient() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
        ] {
            assert!(is_transient(&io::Error::from(kind)), "{:?}", kind);
        }
    }

    #[test]
    fn test_fd_exhaustion_is_transient() {
        assert!(is_transient(&io::Error::from_raw_os_error(EMFILE)));
        assert!(is_transient(&io::Error::from_raw_os_error(ENFILE)));
        // EACCES is not a resource shortage
        assert!(!is_transient(&io::Error::from_raw_os_error(13)));
    }

    #[test]
    fn test_listener_errors_are_fatal() {
        assert!(!is_transient(&io::Error::from(io::ErrorKind::InvalidInput)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
