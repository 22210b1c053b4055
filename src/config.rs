//! Server configuration and its command-line form.
//!
//! ```text
//! fastagi-hello [--listen 127.0.0.1] [--port 4573] [--runs 4] [--timeout 30000]
//!               [--echo-app Echo] [--debug]
//! ```

use std::time::Duration;

use clap::Parser;

use crate::{
    constants::{
        DEFAULT_ACCEPT_LOOPS, DEFAULT_FASTAGI_PORT, DEFAULT_LISTEN_ADDR, DEFAULT_READ_TIMEOUT_MS,
        CHANNEL_CAPACITY,
    },
    pipeline::SessionOptions,
    session::SessionScript,
};

/// Settings for a [`FastAgiServer`](crate::FastAgiServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen: String,
    /// TCP port
    pub port: u16,
    /// Number of accept loops sharing the listener
    pub accept_loops: usize,
    /// Log at debug level
    pub debug: bool,
    /// Idle deadline per read; zero disables it
    pub read_timeout: Duration,
    /// Script each session runs
    pub script: SessionScript,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            port: DEFAULT_FASTAGI_PORT,
            accept_loops: DEFAULT_ACCEPT_LOOPS,
            debug: false,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            script: SessionScript::Playback,
        }
    }
}

impl ServerConfig {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn bind_addr(&self) -> String {
        if self
            .listen
            .contains(':')
            && !self
                .listen
                .starts_with('[')
        {
            format!("[{}]:{}", self.listen, self.port)
        } else {
            format!("{}:{}", self.listen, self.port)
        }
    }

    /// Per-session settings derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            read_timeout: self.read_timeout,
            script: self
                .script
                .clone(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }

    /// Default `EnvFilter` directive for the binaries.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Command-line flags of the FastAGI server binary.
#[derive(Debug, Parser)]
#[command(name = "fastagi-hello", about = "FastAGI playback server")]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// TCP port to listen on.
    #[arg(long, default_value_t = DEFAULT_FASTAGI_PORT)]
    pub port: u16,

    /// Number of accept loops.
    #[arg(long, default_value_t = DEFAULT_ACCEPT_LOOPS)]
    pub runs: usize,

    /// Idle read timeout in milliseconds (0 disables it).
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    pub timeout: u64,

    /// Run the echo test with this application after playback.
    #[arg(long)]
    pub echo_app: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

impl ServerArgs {
    /// Convert parsed flags into a [`ServerConfig`].
    pub fn into_config(self) -> ServerConfig {
        let script = match self.echo_app {
            Some(application) => SessionScript::EchoTest { application },
            None => SessionScript::Playback,
        };
        ServerConfig {
            listen: self.listen,
            port: self.port,
            accept_loops: self
                .runs
                .max(1),
            debug: self.debug,
            read_timeout: Duration::from_millis(self.timeout),
            script,
        }
    }
}
