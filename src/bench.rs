//! FastAGI load generator
//!
//! Each simulated peer plays the Asterisk side of one session: it connects,
//! sends a startup block, answers every command with `200 result=0` after
//! `reply_delay`, and once `HANGUP` has been answered sends the `HANGUP`
//! sentinel and closes.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    constants::{DEFAULT_READ_TIMEOUT_MS, ENV_PREFIX, HANGUP_SENTINEL, LINE_TERMINATOR},
    error::{AgiError, AgiResult},
    variables::AgiVariable,
};

/// Load generator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// `host:port` of the server under test
    pub addr: String,
    /// Number of sessions to run
    pub sessions: usize,
    /// Delay between starting consecutive sessions
    pub spawn_interval: Duration,
    /// Delay before each reply
    pub reply_delay: Duration,
    /// Value sent as `agi_arg_1`
    pub target: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:4573".to_string(),
            sessions: 10_000,
            spawn_interval: Duration::from_millis(5),
            reply_delay: Duration::from_millis(500),
            target: "echo-test".to_string(),
        }
    }
}

/// Timing summary of a bench run. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    pub sessions: usize,
    pub completed: usize,
    pub failed: usize,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub total_ms: f64,
}

fn as_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl BenchReport {
    /// Summarize the elapsed times of completed sessions.
    pub fn from_samples(
        sessions: usize,
        mut samples: Vec<Duration>,
        failed: usize,
        total: Duration,
    ) -> Self {
        samples.sort();
        let completed = samples.len();
        let mean = if completed == 0 {
            Duration::ZERO
        } else {
            samples
                .iter()
                .sum::<Duration>()
                / completed as u32
        };

        Self {
            sessions,
            completed,
            failed,
            min_ms: as_ms(
                samples
                    .first()
                    .copied()
                    .unwrap_or_default(),
            ),
            mean_ms: as_ms(mean),
            max_ms: as_ms(
                samples
                    .last()
                    .copied()
                    .unwrap_or_default(),
            ),
            p50_ms: as_ms(percentile(&samples, 50.0)),
            p99_ms: as_ms(percentile(&samples, 99.0)),
            total_ms: as_ms(total),
        }
    }

    /// Pretty-printed JSON form.
    pub fn to_json(&self) -> AgiResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| AgiError::protocol_error(e.to_string()))
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "sessions: {} completed: {} failed: {}",
            self.sessions, self.completed, self.failed
        )?;
        writeln!(
            f,
            "latency ms: min {:.1} mean {:.1} p50 {:.1} p99 {:.1} max {:.1}",
            self.min_ms, self.mean_ms, self.p50_ms, self.p99_ms, self.max_ms
        )?;
        write!(f, "total: {:.1} ms", self.total_ms)
    }
}

/// Random nine-digit identifier.
fn random_id() -> String {
    rand::rng()
        .random_range(100_000_000u32..1_000_000_000)
        .to_string()
}

/// Startup block a simulated console channel sends.
pub fn startup_block(addr: &str, target: &str) -> String {
    let request = format!("agi://{}", addr);
    let uniqueid = random_id();
    let threadid = random_id();
    let vars = [
        (AgiVariable::Network, "yes"),
        (AgiVariable::NetworkScript, "bench"),
        (AgiVariable::Request, request.as_str()),
        (AgiVariable::Channel, "ALSA/default"),
        (AgiVariable::Language, "en"),
        (AgiVariable::Type, "Console"),
        (AgiVariable::UniqueId, uniqueid.as_str()),
        (AgiVariable::Version, "0.1"),
        (AgiVariable::CallerId, "unknown"),
        (AgiVariable::CallerIdName, "unknown"),
        (AgiVariable::CallingPres, "67"),
        (AgiVariable::CallingAni2, "0"),
        (AgiVariable::CallingTon, "0"),
        (AgiVariable::CallingTns, "0"),
        (AgiVariable::Dnid, "unknown"),
        (AgiVariable::Rdnis, "unknown"),
        (AgiVariable::Context, "default"),
        (AgiVariable::Extension, "100"),
        (AgiVariable::Priority, "1"),
        (AgiVariable::Enhanced, "0.0"),
        (AgiVariable::AccountCode, ""),
        (AgiVariable::ThreadId, threadid.as_str()),
    ];

    let mut block = String::new();
    for (var, value) in vars {
        block.push_str(&format!("{}: {}{}", var.wire_name(), value, LINE_TERMINATOR));
    }
    block.push_str(&format!("{}arg_1: {}{}", ENV_PREFIX, target, LINE_TERMINATOR));
    block.push_str(LINE_TERMINATOR);
    block
}

/// Play one session against the server. Returns its elapsed time.
pub async fn run_peer(config: &BenchConfig) -> AgiResult<Duration> {
    let started = Instant::now();
    let line_timeout = Duration::from_millis(DEFAULT_READ_TIMEOUT_MS);

    let stream = TcpStream::connect(config.addr.as_str()).await?;
    let (read, mut write) = stream.into_split();
    write
        .write_all(startup_block(&config.addr, &config.target).as_bytes())
        .await?;

    let mut lines = BufReader::new(read).lines();
    loop {
        let command = match timeout(line_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Err(AgiError::ConnectionClosed),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(AgiError::Timeout {
                    timeout_ms: DEFAULT_READ_TIMEOUT_MS,
                })
            }
        };
        debug!("[BENCH] Received {}", command);

        tokio::time::sleep(config.reply_delay).await;
        write
            .write_all(b"200 result=0\n")
            .await?;

        if command == HANGUP_SENTINEL {
            write
                .write_all(format!("{}{}", HANGUP_SENTINEL, LINE_TERMINATOR).as_bytes())
                .await?;
            let _ = write
                .shutdown()
                .await;
            return Ok(started.elapsed());
        }
    }
}

/// Start `config.sessions` peers, spaced by `spawn_interval`, and wait for
/// all of them.
pub async fn run_bench(config: BenchConfig) -> BenchReport {
    let started = Instant::now();
    let config = Arc::new(config);
    let mut peers = JoinSet::new();

    info!("[BENCH] Starting {} sessions against {}", config.sessions, config.addr);
    for i in 0..config.sessions {
        let peer_config = config.clone();
        peers.spawn(async move { run_peer(&peer_config).await });
        let last = i + 1 == config.sessions;
        if !last && !config.spawn_interval.is_zero() {
            tokio::time::sleep(config.spawn_interval).await;
        }
    }

    let mut samples = Vec::with_capacity(config.sessions);
    let mut failed = 0;
    while let Some(joined) = peers
        .join_next()
        .await
    {
        match joined {
            Ok(Ok(elapsed)) => samples.push(elapsed),
            Ok(Err(e)) => {
                warn!("[BENCH] Session failed: {}", e);
                failed += 1;
            }
            Err(e) => {
                warn!("[BENCH] Session task failed: {}", e);
                failed += 1;
            }
        }
    }

    BenchReport::from_samples(config.sessions, samples, failed, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    #[test]
    fn test_report_statistics() {
        let samples = (1..=100)
            .map(Duration::from_millis)
            .collect::<Vec<_>>();
        let report = BenchReport::from_samples(102, samples, 2, Duration::from_secs(3));

        assert_eq!(report.completed, 100);
        assert_eq!(report.failed, 2);
        assert_eq!(report.min_ms, 1.0);
        assert_eq!(report.max_ms, 100.0);
        assert_eq!(report.p50_ms, 50.0);
        assert_eq!(report.p99_ms, 99.0);
        assert!((report.mean_ms - 50.5).abs() < 1e-9);
        assert_eq!(report.total_ms, 3000.0);
    }

    #[test]
    fn test_report_without_samples() {
        let report = BenchReport::from_samples(3, Vec::new(), 3, Duration::from_millis(10));
        assert_eq!(report.completed, 0);
        assert_eq!(report.min_ms, 0.0);
        assert_eq!(report.p99_ms, 0.0);
        assert!(report
            .to_string()
            .contains("failed: 3"));
    }

    #[test]
    fn test_report_json() {
        let samples = vec![Duration::from_millis(4)];
        let report = BenchReport::from_samples(1, samples, 0, Duration::from_millis(5));
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["sessions"], 1);
        assert_eq!(json["p50_ms"], 4.0);
    }

    #[test]
    fn test_startup_block_parses() {
        let block = startup_block("127.0.0.1:4573", "demo");
        assert!(block.ends_with("\n\n"));

        let env = Environment::from_lines(block.split('\n')).unwrap();
        assert_eq!(env.len(), 23);
        assert_eq!(env.arg(1), Some("demo"));
        assert_eq!(env.request(), Some("agi://127.0.0.1:4573"));
        assert_eq!(env.variable(AgiVariable::AccountCode), Some(""));
        assert_eq!(
            env.variable(AgiVariable::UniqueId)
                .map(str::len),
            Some(9)
        );
    }
}
