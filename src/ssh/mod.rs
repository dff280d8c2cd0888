//! SSH side of the decoy
//!
//! The transport itself is russh; this module configures it, supplies the
//! per-connection [`DecoyHandler`], and runs the accept loop.

mod backoff;
mod handler;
mod handshake;
mod supervisor;

use russh::server;
use russh::SshId;

use crate::auth::advertised_method_set;
use crate::config::Config;
use crate::host_key::HostIdentity;

pub use backoff::Backoff;
pub use handler::{ConnectionRecord, DecoyHandler, SessionError};
pub use handshake::{negotiate, HandshakeError, HandshakeOutcome};
pub use supervisor::{ServeError, Supervisor};

/// Build the russh server config for this decoy
pub fn transport_config(config: &Config, identity: &HostIdentity) -> server::Config {
    server::Config {
        server_id: SshId::Standard(config.server_id.clone()),
        methods: advertised_method_set(),
        auth_rejection_time: config.auth_rejection_time(),
        auth_rejection_time_initial: Some(std::time::Duration::ZERO),
        keys: vec![identity.private_key().clone()],
        // Attempt limits are the negotiator's job, never russh's
        max_auth_attempts: usize::MAX,
        inactivity_timeout: Some(config.inactivity_timeout()),
        ..Default::default()
    }
}
