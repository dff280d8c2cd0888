//! Server configuration
//!
//! Defaults reproduce the bare decoy: listen on `0.0.0.0:22`, fresh P-256
//! host key, close after the first rejected attempt. An optional TOML file
//! and `SSHSNARE_*` env vars override them, env winning.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::host_key::HostKeyAlgorithm;

/// Longest accepted handshake or inactivity timeout: one day
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SSH listen address
    pub listen_addr: SocketAddr,
    /// Algorithm for the ephemeral host key
    pub host_key_algorithm: HostKeyAlgorithm,
    /// Version banner sent to clients
    pub server_id: String,
    /// Upper bound on one connection's whole exchange
    pub handshake_timeout_secs: u64,
    /// Drop connections that go quiet for this long
    pub inactivity_timeout_secs: u64,
    /// Delay before each rejection is sent
    pub auth_rejection_time_ms: u64,
    /// End the connection after the first credential is denied
    pub close_after_first_attempt: bool,
    /// Include submitted passwords in log lines
    pub record_passwords: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 22)),
            host_key_algorithm: HostKeyAlgorithm::default(),
            server_id: "SSH-2.0-OpenSSH_9.6".to_string(),
            handshake_timeout_secs: 30,
            inactivity_timeout_secs: 15,
            auth_rejection_time_ms: 0,
            close_after_first_attempt: true,
            record_passwords: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, falling back to defaults if absent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        tracing::info!("loaded config from {}", path.display());

        Ok(config)
    }

    /// Apply `SSHSNARE_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_var("SSHSNARE_LISTEN") {
            self.listen_addr = addr
                .parse()
                .with_context(|| format!("SSHSNARE_LISTEN: invalid address {:?}", addr))?;
        }
        if let Some(algorithm) = env_var("SSHSNARE_HOST_KEY_ALGORITHM") {
            self.host_key_algorithm = algorithm
                .parse()
                .map_err(|e| anyhow::anyhow!("SSHSNARE_HOST_KEY_ALGORITHM: {}", e))?;
        }
        if let Some(secs) = env_var("SSHSNARE_HANDSHAKE_TIMEOUT") {
            self.handshake_timeout_secs = secs
                .parse()
                .with_context(|| format!("SSHSNARE_HANDSHAKE_TIMEOUT: invalid seconds {:?}", secs))?;
        }
        if let Some(flag) = env_var("SSHSNARE_CLOSE_AFTER_FIRST_ATTEMPT") {
            self.close_after_first_attempt = parse_flag("SSHSNARE_CLOSE_AFTER_FIRST_ATTEMPT", &flag)?;
        }
        if let Some(flag) = env_var("SSHSNARE_RECORD_PASSWORDS") {
            self.record_passwords = parse_flag("SSHSNARE_RECORD_PASSWORDS", &flag)?;
        }
        Ok(())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.handshake_timeout_secs == 0 {
            anyhow::bail!("handshake_timeout_secs must be greater than zero");
        }
        if self.inactivity_timeout_secs == 0 {
            anyhow::bail!("inactivity_timeout_secs must be greater than zero");
        }
        if self.handshake_timeout_secs > MAX_TIMEOUT_SECS {
            anyhow::bail!(
                "handshake_timeout_secs must be at most {}, got {}",
                MAX_TIMEOUT_SECS,
                self.handshake_timeout_secs
            );
        }
        if self.inactivity_timeout_secs > MAX_TIMEOUT_SECS {
            anyhow::bail!(
                "inactivity_timeout_secs must be at most {}, got {}",
                MAX_TIMEOUT_SECS,
                self.inactivity_timeout_secs
            );
        }
        if !self.server_id.starts_with("SSH-2.0-") {
            anyhow::bail!("server_id must start with \"SSH-2.0-\", got {:?}", self.server_id);
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn auth_rejection_time(&self) -> Duration {
        Duration::from_millis(self.auth_rejection_time_ms)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{}: expected a boolean, got {:?}", name, other),
    }
}
