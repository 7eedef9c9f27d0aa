//! # peerkeep
//!
//! Entry point: parse the command line, load configuration, install
//! tracing, and run one command.
//!
//! Ctrl-C cancels in-flight store lookups through a shared
//! [`CancellationToken`]; the command then fails with a cancellation error.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use peerkeep::cli::Cli;
use peerkeep::commands::{execute_command, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_tracing(&config.log_filter);
    info!(store_dir = %config.store_dir.display(), "peerkeep starting");

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    execute_command(cli.command, &config, &cancel).await
}

/// Initialize tracing subscriber with environment filter.
///
/// `RUST_LOG` takes precedence over the configured filter. Logs go to
/// stderr so command output stays machine readable.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Cancel `token` on the first Ctrl-C.
async fn cancel_on_shutdown(token: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupt received, cancelling");
            token.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
    }
}
