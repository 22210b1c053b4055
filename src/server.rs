//! FastAGI TCP acceptor
//!
//! A fixed pool of accept loops shares one listener. Every accepted
//! connection gets its own [`SessionPipeline`](crate::pipeline::SessionPipeline);
//! sessions are tracked so shutdown can wait for them to close.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    error::AgiResult,
    pipeline::{run_session, SessionOptions},
};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Counts a session as active for as long as it is alive.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// FastAGI server bound to a TCP port.
#[derive(Debug)]
pub struct FastAgiServer {
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
    accept_loops: usize,
    options: SessionOptions,
    active: Arc<AtomicUsize>,
    tracker: TaskTracker,
}

impl FastAgiServer {
    /// Bind the listener described by `config`.
    pub async fn bind(config: &ServerConfig) -> AgiResult<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        info!("[ACCEPT] Listening on {}", local_addr);

        Ok(Self {
            listener: Arc::new(listener),
            local_addr,
            accept_loops: config
                .accept_loops
                .max(1),
            options: config.session_options(),
            active: Arc::new(AtomicUsize::new(0)),
            tracker: TaskTracker::new(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sessions currently running.
    pub fn active_sessions(&self) -> usize {
        self.active
            .load(Ordering::SeqCst)
    }

    /// Accept connections until `shutdown` fires, then wait for every
    /// in-flight session to close.
    pub async fn serve(&self, shutdown: CancellationToken) -> AgiResult<()> {
        let mut loops = Vec::with_capacity(self.accept_loops);
        for id in 0..self.accept_loops {
            loops.push(tokio::spawn(accept_loop(
                id,
                self.listener
                    .clone(),
                shutdown.clone(),
                self.tracker
                    .clone(),
                self.options
                    .clone(),
                self.active
                    .clone(),
            )));
        }

        for handle in loops {
            if let Err(e) = handle.await {
                warn!("[ACCEPT] Accept loop failed: {}", e);
            }
        }

        info!(
            "[ACCEPT] Stopped accepting, draining {} sessions",
            self.active_sessions()
        );
        self.tracker
            .close();
        self.tracker
            .wait()
            .await;
        info!("[ACCEPT] All sessions closed");
        Ok(())
    }
}

async fn accept_loop(
    id: usize,
    listener: Arc<TcpListener>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    options: SessionOptions,
    active: Arc<AtomicUsize>,
) {
    debug!("[ACCEPT] Loop {} started", id);
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!("[ACCEPT] Loop {} accepted {}", id, peer);
                let guard = ActiveGuard::new(active.clone());
                tracker.spawn(handle_connection(stream, peer, options.clone(), guard));
            }
            Err(e) => {
                warn!("[ACCEPT] Loop {} accept error: {}", id, e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                }
            }
        }
    }
    debug!("[ACCEPT] Loop {} stopped", id);
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    options: SessionOptions,
    _guard: ActiveGuard,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("[ACCEPT] set_nodelay failed for {}: {}", peer, e);
    }
    let (reader, writer) = stream.into_split();
    match run_session(reader, writer, options).await {
        Ok(outcome) => info!(
            "[SESSION] {} closed: {} ({} commands, hangup sent: {})",
            peer, outcome.disconnect, outcome.report.commands_sent, outcome.report.hangup_sent
        ),
        Err(e) => warn!("[SESSION] {} failed: {}", peer, e),
    }
}
