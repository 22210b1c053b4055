//! FastAGI load generator.
//!
//! Opens many concurrent sessions against a FastAGI server, each behaving
//! like a console channel that answers every command with `200 result=0`.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use fastagi_tokio::{bench::run_bench, BenchConfig, DEFAULT_FASTAGI_PORT};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fagi-bench", about = "FastAGI load generator")]
struct Args {
    /// Host running the FastAGI server.
    #[arg(default_value = "127.0.0.1")]
    host: String,

    /// Server port.
    #[arg(long, default_value_t = DEFAULT_FASTAGI_PORT)]
    port: u16,

    /// Number of sessions to run.
    #[arg(long, default_value_t = 10_000)]
    sessions: usize,

    /// Milliseconds between session starts.
    #[arg(long, default_value_t = 5)]
    interval_ms: u64,

    /// Milliseconds to wait before each reply.
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,

    /// Value sent as agi_arg_1.
    #[arg(long, default_value = "echo-test")]
    target: String,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = BenchConfig {
        addr: format!("{}:{}", args.host, args.port),
        sessions: args.sessions,
        spawn_interval: Duration::from_millis(args.interval_ms),
        reply_delay: Duration::from_millis(args.delay_ms),
        target: args.target,
    };

    let report = run_bench(config).await;
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
