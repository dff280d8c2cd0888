//! sshsnare - decoy SSH listener
//!
//! Accepts SSH connections, rejects every login, and logs who tried.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sshsnare::config::Config;
use sshsnare::host_key;
use sshsnare::paths;
use sshsnare::ssh::Supervisor;
use sshsnare::state::SharedState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sshsnare=info".parse()?),
        )
        .init();

    // Reported once, through tracing
    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    paths::log_paths();

    let mut config = Config::load(paths::config_path()).context("failed to load config")?;
    config.apply_env().context("invalid environment override")?;
    config.validate().context("invalid config")?;

    // Fresh every start, never persisted
    let identity = host_key::generate(config.host_key_algorithm)?;
    info!(
        algorithm = %identity.algorithm(),
        fingerprint = %identity.fingerprint(),
        "generated ephemeral host key"
    );

    let listen_addr = config.listen_addr;
    info!(
        addr = %listen_addr,
        close_after_first_attempt = config.close_after_first_attempt,
        "starting sshsnare"
    );
    let state = Arc::new(SharedState::new(config, &identity));

    let supervisor = Supervisor::bind(listen_addr, state).await?;
    info!("listening on {}", listen_addr);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            signal.cancel();
        }
    });

    supervisor.serve(shutdown).await?;
    Ok(())
}
