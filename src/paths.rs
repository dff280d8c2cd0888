//! Path resolution for sshsnare
//!
//! Follows the XDG Base Directory Specification with env var overrides.
//! Only the config file has a location: host keys are ephemeral and
//! never touch the disk.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SSHSNARE_CONFIG` | Config file | `~/.config/sshsnare/sshsnare.toml` |

use std::path::PathBuf;
use tracing::info;

/// Get the XDG config directory for sshsnare
///
/// Priority: `XDG_CONFIG_HOME` > `~/.config`
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("sshsnare");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config/sshsnare");
    }

    // Last resort: current directory
    PathBuf::from(".")
}

/// Get the config file path
///
/// Priority: `SSHSNARE_CONFIG` env var > `config_dir()/sshsnare.toml`
pub fn config_path() -> PathBuf {
    std::env::var("SSHSNARE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("sshsnare.toml"))
}

/// Log resolved paths for discoverability
pub fn log_paths() {
    info!("config directory: {}", config_dir().display());
    info!("config file: {}", config_path().display());
}
