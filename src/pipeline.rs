//! Per-connection session pipeline
//!
//! Each connection runs as three tasks joined by two channels:
//!
//! ```text
//! socket ─► reader ──lines──► logic ──commands──► writer ─► socket
//! ```
//!
//! The reader owns every read and the read deadline, the writer owns every
//! write, and the logic touches no I/O at all. Ending any stage cascades
//! through channel closure: the reader finishing closes `inbound`, the logic
//! finishing closes `outbound` and drops its inbound receiver, and the writer
//! shuts the write side down once `outbound` is closed.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::{
    client::AgiClient,
    constants::{CHANNEL_CAPACITY, DEFAULT_READ_TIMEOUT_MS},
    error::{AgiError, AgiResult},
    framer::LineReader,
    session::{self, SessionReport, SessionScript},
};

/// Connection status published by the reader task
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// Session is active.
    Connected,
    /// Session ended.
    Disconnected(DisconnectReason),
}

/// Reason the inbound stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Peer sent the `HANGUP` sentinel line
    PeerHangup,
    /// No data arrived within the read deadline
    ReadTimeout {
        /// Deadline that expired, in milliseconds
        timeout_ms: u64,
    },
    /// I/O error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Clean EOF
    ConnectionClosed,
    /// Inbound bytes could not be framed into lines
    ProtocolError(String),
    /// Session logic finished and released the inbound channel
    SessionFinished,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::PeerHangup => write!(f, "peer sent HANGUP"),
            DisconnectReason::ReadTimeout { timeout_ms } => {
                write!(f, "no data for {}ms", timeout_ms)
            }
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            DisconnectReason::SessionFinished => write!(f, "session finished"),
        }
    }
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Idle deadline for each read; zero disables it
    pub read_timeout: Duration,
    /// Script the logic task runs
    pub script: SessionScript,
    /// Capacity of the inbound and outbound channels
    pub channel_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            script: SessionScript::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Result of a finished pipeline.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// What the logic did
    pub report: SessionReport,
    /// Why the reader stopped
    pub disconnect: DisconnectReason,
}

/// Handles to the three tasks of one running session.
#[derive(Debug)]
pub struct SessionPipeline {
    status_rx: watch::Receiver<ConnectionStatus>,
    reader: JoinHandle<DisconnectReason>,
    writer: JoinHandle<()>,
    logic: JoinHandle<SessionReport>,
}

impl SessionPipeline {
    /// Spawn reader, writer and logic tasks over the given stream halves.
    pub fn spawn<R, W>(reader: R, writer: W, options: SessionOptions) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let capacity = options
            .channel_capacity
            .max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);

        let lines = LineReader::new(reader, options.read_timeout);
        let reader = tokio::spawn(reader_loop(lines, inbound_tx, status_tx));
        let writer = tokio::spawn(writer_loop(writer, outbound_rx));
        let logic = tokio::spawn(session::run(
            AgiClient::new(outbound_tx, inbound_rx),
            options.script,
        ));

        Self {
            status_rx,
            reader,
            writer,
            logic,
        }
    }

    /// Subscribe to connection status changes.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx
            .clone()
    }

    /// Wait for all three tasks to finish.
    pub async fn join(self) -> AgiResult<SessionOutcome> {
        let report = self
            .logic
            .await
            .map_err(|e| AgiError::TaskFailed {
                message: e.to_string(),
            })?;
        let disconnect = self
            .reader
            .await
            .unwrap_or_else(|e| DisconnectReason::IoError(e.to_string()));
        if let Err(e) = self
            .writer
            .await
        {
            warn!("[SEND] Writer task failed: {}", e);
        }

        info!(
            "[SESSION] Finished: {} commands, disconnect: {}",
            report.commands_sent, disconnect
        );
        Ok(SessionOutcome { report, disconnect })
    }
}

/// Run one session over the given stream halves to completion.
pub async fn run_session<R, W>(
    reader: R,
    writer: W,
    options: SessionOptions,
) -> AgiResult<SessionOutcome>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    SessionPipeline::spawn(reader, writer, options)
        .join()
        .await
}

async fn reader_loop<R: AsyncRead + Unpin>(
    lines: LineReader<R>,
    inbound_tx: mpsc::Sender<String>,
    status_tx: watch::Sender<ConnectionStatus>,
) -> DisconnectReason {
    let result = AssertUnwindSafe(reader_loop_inner(lines, inbound_tx));
    let reason = match futures_util::FutureExt::catch_unwind(result).await {
        Ok(reason) => reason,
        Err(_) => {
            tracing::error!("reader task panicked");
            DisconnectReason::IoError("reader task panicked".to_string())
        }
    };
    status_tx.send_replace(ConnectionStatus::Disconnected(reason.clone()));
    reason
}

async fn reader_loop_inner<R: AsyncRead + Unpin>(
    mut lines: LineReader<R>,
    inbound_tx: mpsc::Sender<String>,
) -> DisconnectReason {
    loop {
        let next = tokio::select! {
            biased;
            _ = inbound_tx.closed() => {
                debug!("[RECV] Session logic finished, stopping reader");
                return DisconnectReason::SessionFinished;
            }
            next = lines.next_line() => next,
        };

        match next {
            Ok(line) => {
                if inbound_tx
                    .send(line)
                    .await
                    .is_err()
                {
                    return DisconnectReason::SessionFinished;
                }
            }
            Err(reason) => {
                info!("[RECV] Inbound stream ended: {}", reason);
                return reason;
            }
        }
    }
}

async fn writer_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound_rx: mpsc::Receiver<String>,
) {
    while let Some(command) = outbound_rx
        .recv()
        .await
    {
        trace!("[SEND] {}", command.trim_end());
        let written = match writer
            .write_all(command.as_bytes())
            .await
        {
            Ok(()) => writer
                .flush()
                .await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("[SEND] Write failed: {}", e);
            return;
        }
    }

    debug!("[SEND] Outbound closed, shutting down write side");
    if let Err(e) = writer
        .shutdown()
        .await
    {
        debug!("[SEND] Shutdown failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionFailure, SessionState};
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};

    fn spawn_over_duplex(options: SessionOptions) -> (SessionPipeline, DuplexStream) {
        let (server_side, peer_side) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(server_side);
        (SessionPipeline::spawn(reader, writer, options), peer_side)
    }

    /// Reply `200 result=<status>` to CHANNEL STATUS and `200 result=0` to
    /// everything else; after HANGUP send the sentinel. Returns the commands.
    async fn play_peer(peer: DuplexStream, env: &str, status: i32) -> Vec<String> {
        let (read, mut write) = tokio::io::split(peer);
        write
            .write_all(env.as_bytes())
            .await
            .unwrap();

        let mut lines = BufReader::new(read).lines();
        let mut commands = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .unwrap()
        {
            let reply = if line == "CHANNEL STATUS" {
                format!("200 result={}\n", status)
            } else {
                "200 result=0\n".to_string()
            };
            write
                .write_all(reply.as_bytes())
                .await
                .unwrap();
            if line == "HANGUP" {
                write
                    .write_all(b"HANGUP\n")
                    .await
                    .unwrap();
            }
            commands.push(line);
        }
        commands
    }

    #[tokio::test]
    async fn test_full_session_over_duplex() {
        let (pipeline, peer) = spawn_over_duplex(SessionOptions::default());
        let mut status = pipeline.status();
        assert_eq!(*status.borrow(), ConnectionStatus::Connected);

        let peer = tokio::spawn(play_peer(
            peer,
            "agi_network: yes\nagi_request: agi://127.0.0.1/hello\nagi_arg_1: demo\n\n",
            6,
        ));
        let outcome = pipeline
            .join()
            .await
            .unwrap();
        let commands = peer.await.unwrap();

        assert_eq!(
            commands,
            vec![
                "CHANNEL STATUS",
                "VERBOSE \"Playing back: demo\" 1",
                "STREAM FILE demo \"1234567890#*\"",
                "HANGUP",
            ]
        );
        assert!(outcome.report.hangup_sent);
        assert_eq!(outcome.report.final_state(), SessionState::Closed);
        assert!(matches!(
            outcome.disconnect,
            DisconnectReason::PeerHangup | DisconnectReason::SessionFinished
        ));

        status
            .changed()
            .await
            .ok();
        assert!(matches!(
            *status.borrow(),
            ConnectionStatus::Disconnected(_)
        ));
    }

    #[tokio::test]
    async fn test_split_environment_across_writes() {
        let (pipeline, peer) = spawn_over_duplex(SessionOptions::default());
        let (read, mut write) = tokio::io::split(peer);
        for chunk in ["agi_arg", "_1: de", "mo\n", "\n"] {
            write
                .write_all(chunk.as_bytes())
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }

        let mut lines = BufReader::new(read).lines();
        let mut commands = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .unwrap()
        {
            // Reply in two pieces to exercise reassembly on the reply path.
            write
                .write_all(b"200 res")
                .await
                .unwrap();
            tokio::task::yield_now().await;
            write
                .write_all(b"ult=6\n")
                .await
                .unwrap();
            commands.push(line);
        }

        let outcome = pipeline
            .join()
            .await
            .unwrap();
        assert_eq!(commands.len(), 4);
        assert_eq!(outcome.report.target.as_deref(), Some("demo"));
        assert!(outcome
            .report
            .failures
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        let options = SessionOptions {
            read_timeout: Duration::from_millis(100),
            ..SessionOptions::default()
        };
        let (pipeline, _peer) = spawn_over_duplex(options);

        let outcome = pipeline
            .join()
            .await
            .unwrap();
        assert_eq!(
            outcome.disconnect,
            DisconnectReason::ReadTimeout { timeout_ms: 100 }
        );
        assert_eq!(outcome.report.commands_sent, 0);
        assert!(!outcome.report.hangup_sent);
        assert!(outcome
            .report
            .has_failure(&SessionFailure::LinkLost));
    }

    #[tokio::test]
    async fn test_peer_disconnect_mid_session() {
        let (pipeline, peer) = spawn_over_duplex(SessionOptions::default());
        let (read, mut write) = tokio::io::split(peer);
        write
            .write_all(b"agi_arg_1: demo\n\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read).lines();
        let first = lines
            .next_line()
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("CHANNEL STATUS"));
        drop(lines);
        drop(write);

        let outcome = pipeline
            .join()
            .await
            .unwrap();
        assert_eq!(outcome.disconnect, DisconnectReason::ConnectionClosed);
        assert!(!outcome.report.hangup_sent);
        assert_eq!(outcome.report.commands_sent, 1);
    }

    #[tokio::test]
    async fn test_missing_target_fast_path() {
        let (pipeline, peer) = spawn_over_duplex(SessionOptions::default());
        let peer = tokio::spawn(play_peer(peer, "agi_network: yes\n\n", 6));

        let outcome = pipeline
            .join()
            .await
            .unwrap();
        assert_eq!(peer.await.unwrap(), vec!["HANGUP"]);
        assert!(outcome
            .report
            .has_failure(&SessionFailure::MissingTarget));
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(
            DisconnectReason::ReadTimeout { timeout_ms: 250 }.to_string(),
            "no data for 250ms"
        );
        assert_eq!(DisconnectReason::PeerHangup.to_string(), "peer sent HANGUP");
    }
}
