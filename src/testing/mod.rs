//! Testing utilities for sshsnare
//!
//! Provides an SSH probe client that plays the part of a scanner against
//! the decoy.

mod probe;

pub use probe::{ProbeResult, SshProbe};
