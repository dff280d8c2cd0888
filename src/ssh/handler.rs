//! Per-connection SSH handler

use std::borrow::Cow;
use std::sync::Arc;

use russh::keys::{HashAlg, PublicKey};
use russh::server::{self, Auth};
use russh::MethodSet;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::auth::{AuthMethod, Credential, Negotiator};
use crate::state::SharedState;

/// Errors that end a session from inside the handler
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ssh(#[from] russh::Error),
    /// The client kept authenticating after the phase was closed
    #[error("authentication phase closed")]
    Closed,
}

/// What the supervisor learns about a connection once it is over
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub claimed_user: Option<String>,
    pub attempts: u32,
    pub terminated: bool,
}

/// russh handler that captures usernames and denies everything.
///
/// Channels are never granted; russh's defaults refuse them and no
/// authentication can succeed anyway.
pub struct DecoyHandler {
    state: Arc<SharedState>,
    negotiator: Negotiator,
    record_tx: watch::Sender<ConnectionRecord>,
    prompted: bool,
}

impl DecoyHandler {
    pub fn new(state: Arc<SharedState>, record_tx: watch::Sender<ConnectionRecord>) -> Self {
        let negotiator = Negotiator::new(state.config.close_after_first_attempt);
        Self {
            state,
            negotiator,
            record_tx,
            prompted: false,
        }
    }

    fn publish(&self) {
        let record = ConnectionRecord {
            claimed_user: self.negotiator.claimed_user().map(str::to_string),
            attempts: self.negotiator.attempts(),
            terminated: self.negotiator.is_terminated(),
        };
        // The supervisor may already be gone on timeout
        let _ = self.record_tx.send(record);
    }

    /// Run one attempt through the negotiator and build the reply
    fn deny(
        &mut self,
        method: AuthMethod,
        user: &str,
        credential: Credential,
    ) -> Result<Auth, SessionError> {
        let denial = self
            .negotiator
            .attempt(method, user, &credential)
            .ok_or(SessionError::Closed)?;

        match credential {
            Credential::Password(ref password) if self.state.config.record_passwords => {
                info!(auth.method = %method, user, password = %password, "{}", denial);
            }
            Credential::PublicKey {
                ref algorithm,
                ref fingerprint,
            } => {
                info!(
                    auth.method = %method,
                    user,
                    key.algorithm = %algorithm,
                    key.fingerprint = %fingerprint,
                    "{}",
                    denial
                );
            }
            _ => {
                info!(auth.method = %method, user, "{}", denial);
            }
        }

        self.publish();
        Ok(self.rejection())
    }

    fn rejection(&self) -> Auth {
        // An empty method list tells the client there is nothing left to try
        let proceed_with_methods = self
            .negotiator
            .is_terminated()
            .then(MethodSet::empty);
        Auth::Reject {
            proceed_with_methods,
            partial_success: false,
        }
    }

    fn key_credential(key: &PublicKey) -> Credential {
        Credential::PublicKey {
            algorithm: key.algorithm().as_str().to_string(),
            fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
        }
    }
}

impl server::Handler for DecoyHandler {
    type Error = SessionError;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        if self.negotiator.is_terminated() {
            return Err(SessionError::Closed);
        }
        debug!(user, "auth probe");
        self.negotiator.observe_user(user);
        self.publish();
        Ok(self.rejection())
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        self.deny(
            AuthMethod::Password,
            user,
            Credential::Password(password.to_string()),
        )
    }

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        self.deny(AuthMethod::PublicKey, user, Self::key_credential(key))
    }

    async fn auth_publickey(&mut self, user: &str, key: &PublicKey) -> Result<Auth, Self::Error> {
        self.deny(AuthMethod::PublicKey, user, Self::key_credential(key))
    }

    async fn auth_keyboard_interactive<'a>(
        &'a mut self,
        user: &str,
        _submethods: &str,
        response: Option<server::Response<'a>>,
    ) -> Result<Auth, Self::Error> {
        match response {
            // Ask once so the client has something to answer
            None if !self.prompted && !self.negotiator.is_terminated() => {
                self.prompted = true;
                self.negotiator.observe_user(user);
                self.publish();
                Ok(Auth::Partial {
                    name: Cow::Borrowed(""),
                    instructions: Cow::Borrowed(""),
                    prompts: Cow::Owned(vec![(Cow::Borrowed("Password: "), false)]),
                })
            }
            response => {
                self.prompted = false;
                let answers = response.map(|r| r.count()).unwrap_or(0);
                self.deny(
                    AuthMethod::KeyboardInteractive,
                    user,
                    Credential::Responses(answers),
                )
            }
        }
    }
}
