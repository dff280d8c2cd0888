//! Authentication policy: every attempt is denied
//!
//! The policy itself is the pure [`evaluate`] function. [`Negotiator`]
//! wraps it with the per-connection bookkeeping: first claimed username,
//! attempt count, and whether the authentication phase has been closed.

use std::fmt;

use russh::{MethodKind, MethodSet};

/// Authentication methods offered to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    Password,
    KeyboardInteractive,
    PublicKey,
}

/// Every method is advertised so clients reveal what they would try.
pub const ADVERTISED_METHODS: [AuthMethod; 3] = [
    AuthMethod::Password,
    AuthMethod::KeyboardInteractive,
    AuthMethod::PublicKey,
];

impl AuthMethod {
    /// SSH wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::KeyboardInteractive => "keyboard-interactive",
            Self::PublicKey => "publickey",
        }
    }

    fn kind(&self) -> MethodKind {
        match self {
            Self::Password => MethodKind::Password,
            Self::KeyboardInteractive => MethodKind::KeyboardInteractive,
            Self::PublicKey => MethodKind::PublicKey,
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The method set handed to the transport
pub fn advertised_method_set() -> MethodSet {
    let mut methods = MethodSet::empty();
    for method in ADVERTISED_METHODS {
        methods.push(method.kind());
    }
    methods
}

/// Credential material carried by one attempt
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    /// Keyboard-interactive answers, counted but not kept
    Responses(usize),
    PublicKey {
        algorithm: String,
        fingerprint: String,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(p) => write!(f, "Password(<{} bytes>)", p.len()),
            Self::Responses(n) => write!(f, "Responses({})", n),
            Self::PublicKey {
                algorithm,
                fingerprint,
            } => write!(f, "PublicKey({} {})", algorithm, fingerprint),
        }
    }
}

/// Result of policy evaluation. There is no accepting counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub method: AuthMethod,
    pub user: String,
    pub reason: String,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// The policy: deny, whatever the method, user, or credential.
pub fn evaluate(method: AuthMethod, user: &str, _credential: &Credential) -> Denial {
    let method_name = match method {
        AuthMethod::PublicKey => "public key",
        other => other.as_str(),
    };
    Denial {
        method,
        user: user.to_string(),
        reason: format!("{} rejected for {:?}", method_name, user),
    }
}

/// Authentication phase state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPhase {
    AwaitingAttempt,
    Terminated(Denial),
}

/// Per-connection authentication state machine
#[derive(Debug, Clone)]
pub struct Negotiator {
    close_after_first_attempt: bool,
    phase: AuthPhase,
    claimed_user: Option<String>,
    attempts: u32,
}

impl Negotiator {
    pub fn new(close_after_first_attempt: bool) -> Self {
        Self {
            close_after_first_attempt,
            phase: AuthPhase::AwaitingAttempt,
            claimed_user: None,
            attempts: 0,
        }
    }

    /// Record a username seen in any auth request; only the first sticks.
    pub fn observe_user(&mut self, user: &str) {
        if self.claimed_user.is_none() {
            self.claimed_user = Some(user.to_string());
        }
    }

    /// Evaluate one credential-bearing attempt.
    ///
    /// Returns `None` if the phase was already terminated, in which case
    /// the caller should end the connection.
    pub fn attempt(
        &mut self,
        method: AuthMethod,
        user: &str,
        credential: &Credential,
    ) -> Option<Denial> {
        if self.is_terminated() {
            return None;
        }
        self.observe_user(user);
        self.attempts = self.attempts.saturating_add(1);

        let denial = evaluate(method, user, credential);
        if self.close_after_first_attempt {
            self.phase = AuthPhase::Terminated(denial.clone());
        }
        Some(denial)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.phase, AuthPhase::Terminated(_))
    }

    pub fn claimed_user(&self) -> Option<&str> {
        self.claimed_user.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
