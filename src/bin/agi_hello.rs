//! Embedded AGI script: one session over stdin/stdout.
//!
//! ```text
//! exten => 100,1,AGI(/usr/local/bin/agi-hello,demo-congrats)
//! ```
//!
//! stdout carries the protocol, so logs go to stderr.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use fastagi_tokio::{
    constants::DEFAULT_READ_TIMEOUT_MS, run_session, SessionOptions, SessionScript,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Blocking stdin reads cannot be cancelled; give up on them after this.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "agi-hello", about = "Embedded AGI playback script")]
struct Args {
    /// Idle read timeout in milliseconds (0 disables it).
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    timeout: u64,

    /// Run the echo test with this application after playback.
    #[arg(long)]
    echo_app: Option<String>,

    /// Print the session report as JSON on stderr.
    #[arg(long)]
    report: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let options = SessionOptions {
        read_timeout: Duration::from_millis(args.timeout),
        script: match args.echo_app {
            Some(application) => SessionScript::EchoTest { application },
            None => SessionScript::Playback,
        },
        ..SessionOptions::default()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(run_session(
        tokio::io::stdin(),
        tokio::io::stdout(),
        options,
    ));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    let outcome = outcome?;
    info!(
        "Session ended in {:?}: {}",
        outcome
            .report
            .final_state(),
        outcome.disconnect
    );
    if args.report {
        eprintln!("{}", outcome.report.to_json()?);
    }
    if !outcome
        .report
        .failures
        .is_empty()
    {
        bail!("session failed: {:?}", outcome.report.failures);
    }
    Ok(())
}
