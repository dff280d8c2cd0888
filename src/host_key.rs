//! Ephemeral server host identity
//!
//! A fresh keypair is drawn from the OS-seeded CSPRNG on every start and
//! lives only in memory. Nothing here is ever written to disk.

use std::fmt;
use std::str::FromStr;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg, PrivateKey};
use serde::Deserialize;
use thiserror::Error;

/// Host key generation failed; the server cannot run without an identity.
#[derive(Debug, Error)]
#[error("failed to generate {algorithm} host key: {source}")]
pub struct KeyGenerationError {
    pub algorithm: HostKeyAlgorithm,
    #[source]
    pub source: russh::keys::ssh_key::Error,
}

/// Supported host key algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum HostKeyAlgorithm {
    /// ECDSA over NIST P-256
    #[default]
    #[serde(rename = "ecdsa-sha2-nistp256")]
    EcdsaP256,
    #[serde(rename = "ssh-ed25519")]
    Ed25519,
}

impl HostKeyAlgorithm {
    /// SSH wire name of the algorithm
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdsaP256 => "ecdsa-sha2-nistp256",
            Self::Ed25519 => "ssh-ed25519",
        }
    }

    fn algorithm(&self) -> Algorithm {
        match self {
            Self::EcdsaP256 => Algorithm::Ecdsa {
                curve: EcdsaCurve::NistP256,
            },
            Self::Ed25519 => Algorithm::Ed25519,
        }
    }
}

impl fmt::Display for HostKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostKeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ecdsa-sha2-nistp256" | "ecdsa" | "p256" => Ok(Self::EcdsaP256),
            "ssh-ed25519" | "ed25519" => Ok(Self::Ed25519),
            other => Err(format!("unsupported host key algorithm: {}", other)),
        }
    }
}

/// The server's signing keypair for the lifetime of the process
#[derive(Clone)]
pub struct HostIdentity {
    algorithm: HostKeyAlgorithm,
    key: PrivateKey,
}

impl HostIdentity {
    pub fn algorithm(&self) -> HostKeyAlgorithm {
        self.algorithm
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.key
    }

    /// SHA-256 fingerprint of the public half, as printed by ssh-keygen
    pub fn fingerprint(&self) -> String {
        self.key.public_key().fingerprint(HashAlg::Sha256).to_string()
    }
}

impl fmt::Debug for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostIdentity")
            .field("algorithm", &self.algorithm)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Generate a fresh host identity.
pub fn generate(algorithm: HostKeyAlgorithm) -> Result<HostIdentity, KeyGenerationError> {
    let key = PrivateKey::random(&mut rand::thread_rng(), algorithm.algorithm())
        .map_err(|source| KeyGenerationError { algorithm, source })?;

    Ok(HostIdentity { algorithm, key })
}
