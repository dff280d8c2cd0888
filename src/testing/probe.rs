//! SSH probe client for exercising the decoy
//!
//! Completes key exchange against any host key, then tries credentials the
//! way a scanner would and reports what the server said.

use anyhow::{Context, Result};
use russh::client::{self, Handle, KeyboardInteractiveAuthResponse};
use russh::keys::{Algorithm, PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::Disconnect;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::ToSocketAddrs;
use tokio::sync::watch;

/// Server verdict on one authentication attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Accepted,
    Rejected,
}

impl ProbeResult {
    fn from_success(success: bool) -> Self {
        if success {
            Self::Accepted
        } else {
            Self::Rejected
        }
    }
}

/// An SSH client connection that has finished key exchange
pub struct SshProbe {
    handle: Handle<ProbeHandler>,
    server_key: watch::Receiver<Option<PublicKey>>,
}

impl SshProbe {
    /// Connect and complete key exchange, trusting whatever key is shown
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let (key_tx, server_key) = watch::channel(None);
        let handler = ProbeHandler { server_key: key_tx };

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let handle = client::connect(config, addr, handler)
            .await
            .context("failed to connect")?;

        Ok(Self { handle, server_key })
    }

    /// Algorithm name of the host key the server presented
    pub fn host_key_algorithm(&self) -> Option<String> {
        self.server_key
            .borrow()
            .as_ref()
            .map(|key| key.algorithm().as_str().to_string())
    }

    /// Try a password
    pub async fn password(&mut self, user: &str, password: &str) -> Result<ProbeResult> {
        let result = self
            .handle
            .authenticate_password(user, password)
            .await
            .context("password authentication failed")?;
        Ok(ProbeResult::from_success(result.success()))
    }

    /// Try a freshly generated Ed25519 key
    pub async fn publickey(&mut self, user: &str) -> Result<ProbeResult> {
        let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .context("failed to generate probe key")?;
        let key_with_alg = PrivateKeyWithHashAlg::new(Arc::new(key), None);
        let result = self
            .handle
            .authenticate_publickey(user, key_with_alg)
            .await
            .context("key authentication failed")?;
        Ok(ProbeResult::from_success(result.success()))
    }

    /// Start keyboard-interactive and answer every prompt with `answer`
    pub async fn keyboard_interactive(&mut self, user: &str, answer: &str) -> Result<ProbeResult> {
        let mut response = self
            .handle
            .authenticate_keyboard_interactive_start(user, None::<String>)
            .await
            .context("keyboard-interactive start failed")?;

        // Bounded so a server that keeps prompting cannot hold us forever
        for _ in 0..8 {
            match response {
                KeyboardInteractiveAuthResponse::Success => return Ok(ProbeResult::Accepted),
                KeyboardInteractiveAuthResponse::InfoRequest { ref prompts, .. } => {
                    let answers = prompts.iter().map(|_| answer.to_string()).collect();
                    response = self
                        .handle
                        .authenticate_keyboard_interactive_respond(answers)
                        .await
                        .context("keyboard-interactive response failed")?;
                }
                _ => return Ok(ProbeResult::Rejected),
            }
        }
        anyhow::bail!("server kept prompting");
    }

    /// Close the connection
    pub async fn close(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "goodbye", "en")
            .await
            .context("failed to disconnect")?;
        Ok(())
    }
}

/// Client handler that records the server key and accepts it
struct ProbeHandler {
    server_key: watch::Sender<Option<PublicKey>>,
}

impl client::Handler for ProbeHandler {
    type Error = anyhow::Error;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        let _ = self.server_key.send(Some(server_public_key.clone()));
        async { Ok(true) } // Any key: the decoy's key is new every start
    }
}
