//! FastAGI playback server.
//!
//! Plays back the file named by `agi_arg_1` (or `?file=` in the request URI)
//! to every caller, optionally followed by an echo test.

use anyhow::{Context, Result};
use clap::Parser;
use fastagi_tokio::{FastAgiServer, ServerArgs};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerArgs::parse().into_config();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let server = FastAgiServer::bind(&config)
        .await
        .with_context(|| format!("failed to listen on {}", config.bind_addr()))?;
    info!(
        "Serving FastAGI on {} with {} accept loops",
        server.local_addr(),
        config.accept_loops
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c()
                .await
                .is_ok()
            {
                info!("Interrupted, draining sessions");
                shutdown.cancel();
            }
        }
    });

    server
        .serve(shutdown)
        .await?;
    Ok(())
}
