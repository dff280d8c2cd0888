//! sshsnare - decoy SSH listener
//!
//! Completes the SSH handshake with a throwaway host key, advertises every
//! common authentication method, denies all of them, and logs the username
//! each client claims. The main binary is in `main.rs`; the `sshprobe`
//! client lives behind the `testing` feature.

pub mod auth;
pub mod config;
pub mod host_key;
pub mod paths;
pub mod ssh;
pub mod state;
pub mod testing;
