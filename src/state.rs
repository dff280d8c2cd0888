//! Shared server state

use std::sync::Arc;

use crate::config::Config;
use crate::host_key::HostIdentity;
use crate::ssh::transport_config;

/// Read-only state handed to every connection task.
///
/// Built once at startup; never mutated afterwards, so it needs no locks.
pub struct SharedState {
    pub config: Config,
    /// Fingerprint of the ephemeral host key, for log lines
    pub host_fingerprint: String,
    /// Transport settings including the host key
    pub transport: Arc<russh::server::Config>,
}

impl SharedState {
    pub fn new(config: Config, identity: &HostIdentity) -> Self {
        let transport = Arc::new(transport_config(&config, identity));
        Self {
            host_fingerprint: identity.fingerprint(),
            config,
            transport,
        }
    }
}
