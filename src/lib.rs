//! Asterisk Gateway Interface (AGI / FastAGI) protocol engine for tokio
//!
//! This crate implements the application side of AGI: it accepts FastAGI
//! connections from Asterisk (or reads an embedded AGI session from
//! stdin/stdout), parses the startup environment, and runs a small
//! command/reply state machine against the channel.
//!
//! # Architecture
//!
//! Every session is split into three tasks joined by two channels:
//! - a reader that frames raw bytes into lines and enforces the idle deadline
//! - a writer that owns the write half and shuts it down exactly once
//! - the session logic, which only ever talks to [`AgiClient`]
//!
//! The logic never touches a socket, so it can be driven by canned replies.
//!
//! # Examples
//!
//! ## FastAGI server
//!
//! ```rust,no_run
//! use fastagi_tokio::{AgiError, FastAgiServer, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AgiError> {
//!     let server = FastAgiServer::bind(&ServerConfig::default()).await?;
//!     let shutdown = CancellationToken::new();
//!
//!     let ctrl_c = shutdown.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         ctrl_c.cancel();
//!     });
//!
//!     server.serve(shutdown).await
//! }
//! ```
//!
//! Point a dialplan extension at it:
//! ```text
//! exten => 100,1,AGI(agi://127.0.0.1/hello,demo-congrats)
//! ```
//!
//! ## Single session over any stream
//!
//! ```rust,no_run
//! use fastagi_tokio::{run_session, SessionOptions, SessionScript};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = SessionOptions {
//!         script: SessionScript::echo_test(),
//!         ..SessionOptions::default()
//!     };
//!     let outcome = run_session(tokio::io::stdin(), tokio::io::stdout(), options).await?;
//!     eprintln!("{:?}", outcome.report.final_state());
//!     Ok(())
//! }
//! ```
//!
//! ## Parsing replies
//!
//! ```rust
//! use fastagi_tokio::{Reply, ReplyStatus};
//!
//! let reply = Reply::parse("200 result=0 endpos=8640").unwrap();
//! assert_eq!(reply.status(), ReplyStatus::Success);
//! assert_eq!(reply.result_code(), Some(0));
//! assert_eq!(reply.extra(), Some("endpos=8640"));
//! ```

#[macro_use]
mod macros;

pub mod bench;
pub mod channel;
pub mod client;
pub mod command;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod framer;
pub mod pipeline;
pub mod reply;
pub mod server;
pub mod session;
pub mod variables;

pub use bench::{BenchConfig, BenchReport};
pub use channel::ChannelStatus;
pub use client::AgiClient;
pub use command::AgiCommand;
pub use config::{ServerArgs, ServerConfig};
pub use constants::DEFAULT_FASTAGI_PORT;
pub use environment::Environment;
pub use error::{AgiError, AgiResult};
pub use framer::{LineFramer, LineReader};
pub use pipeline::{
    run_session, ConnectionStatus, DisconnectReason, SessionOptions, SessionOutcome,
    SessionPipeline,
};
pub use reply::{Classified, Reply, ReplyStatus};
pub use server::FastAgiServer;
pub use session::{SessionFailure, SessionReport, SessionScript, SessionState};
pub use variables::{AgiVariable, ParseAgiVariableError};
