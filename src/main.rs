//! Crossflow - single-shot cross-chain transfer client
//!
//! Quotes, dispatches, authenticates, and tracks one transfer across
//! EVM, Solana, and Aptos chains via the aggregator API.

use anyhow::Result;
use tracing::{error, info};

mod api;
mod auth;
mod chain;
mod config;
mod error;
mod poll;
mod transfer;
mod tx;

use config::Settings;
use error::TransferError;
use transfer::TransferFlow;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting crossflow v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.chains.len()
    );

    let flow = TransferFlow::init(settings).await?;

    match flow.run().await {
        Ok(snapshot) => {
            info!("Transfer {} completed", snapshot.transaction_id);
            info!("Source tx: {}", snapshot.tx_hash);
            for step in &snapshot.steps {
                if let Some(hash) = &step.tx_hash {
                    info!("  {}: {}", step.name, hash);
                }
            }
            Ok(())
        }
        Err(e) => {
            match &e {
                TransferError::TransferFailed { message } => {
                    error!("Transfer failed on the remote side: {}", message)
                }
                TransferError::PollingTimeout { attempts } => error!(
                    "Gave up after {} status checks; transfer outcome unknown",
                    attempts
                ),
                other => error!("Transfer aborted: {}", other),
            }
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,crossflow=debug,hyper=warn,ethers=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
