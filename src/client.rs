//! Logic-side handle for exchanging commands and replies
//!
//! [`AgiClient`] owns the sending end of the outbound command channel and the
//! receiving end of the inbound line channel. It never touches a socket, so
//! session logic built on it can be driven by canned replies in tests.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    command::AgiCommand,
    constants::{DEFAULT_ESCAPE_DIGITS, USAGE_BLOCK_LAST},
    environment::Environment,
    error::{AgiError, AgiResult},
    reply::{Classified, Reply},
};

/// Half-duplex command/reply exchange over the session channels.
///
/// Each [`send_command`](Self::send_command) writes one command and waits for
/// its classified reply before returning; `&mut self` keeps a second command
/// from being issued in the meantime. Dropping the client closes the outbound
/// channel, which is the writer task's signal to finish.
#[derive(Debug)]
pub struct AgiClient {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<String>,
    commands_sent: usize,
}

impl AgiClient {
    /// Wrap the logic-side ends of the session channels.
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<String>) -> Self {
        Self {
            outbound,
            inbound,
            commands_sent: 0,
        }
    }

    /// Read the startup block. Must be called once, before any command.
    pub async fn read_environment(&mut self) -> AgiResult<Environment> {
        Environment::read(&mut self.inbound).await
    }

    /// Number of commands handed to the writer so far.
    pub fn commands_sent(&self) -> usize {
        self.commands_sent
    }

    async fn recv_line(&mut self) -> AgiResult<String> {
        self.inbound
            .recv()
            .await
            .ok_or(AgiError::ConnectionClosed)
    }

    /// Read the lines following a `520-` opener through the closing `520 `
    /// line (normally `520 End of proper usage.`). Returns the first usage
    /// line, if the block had one.
    async fn read_usage_block(&mut self) -> AgiResult<Option<String>> {
        let mut first = None;
        loop {
            let line = self
                .recv_line()
                .await?;
            let line = line.trim();
            if line.starts_with(USAGE_BLOCK_LAST) {
                return Ok(first);
            }
            if first.is_none() {
                first = Some(line.to_string());
            } else {
                trace!("[RECV] Skipping usage line: {}", line);
            }
        }
    }

    async fn read_reply(&mut self) -> AgiResult<Reply> {
        let line = self
            .recv_line()
            .await?;

        match Reply::classify(&line)? {
            Classified::Complete(reply) => Ok(reply),
            Classified::NeedsUsage(reply) => match self
                .read_usage_block()
                .await?
            {
                Some(usage) => Ok(reply.with_usage(&usage)),
                None => Ok(reply),
            },
        }
    }

    /// Send a command and wait for its reply.
    pub async fn send_command(&mut self, command: &AgiCommand) -> AgiResult<Reply> {
        let wire = command.to_wire_format()?;
        debug!("[SEND] {}", wire.trim_end());

        self.outbound
            .send(wire)
            .await
            .map_err(|_| AgiError::ConnectionClosed)?;
        self.commands_sent += 1;

        let reply = self
            .read_reply()
            .await?;
        debug!("[RECV] {} returned: {}", command.name(), reply);
        Ok(reply)
    }

    /// `ANSWER`
    pub async fn answer(&mut self) -> AgiResult<Reply> {
        self.send_command(&AgiCommand::answer())
            .await
    }

    /// `CHANNEL STATUS`
    pub async fn channel_status(&mut self) -> AgiResult<Reply> {
        self.send_command(&AgiCommand::channel_status())
            .await
    }

    /// `VERBOSE "<message>" <level>`
    pub async fn verbose(&mut self, message: &str, level: u8) -> AgiResult<Reply> {
        self.send_command(&AgiCommand::verbose(message, level))
            .await
    }

    /// `STREAM FILE <file> "<digits>"`, interruptible by any DTMF digit.
    pub async fn stream_file(&mut self, file: &str) -> AgiResult<Reply> {
        self.send_command(&AgiCommand::stream_file(file, DEFAULT_ESCAPE_DIGITS))
            .await
    }

    /// `EXEC <application>`
    pub async fn exec(&mut self, application: &str, options: Option<&str>) -> AgiResult<Reply> {
        self.send_command(&AgiCommand::exec(application, options))
            .await
    }

    /// `HANGUP`
    pub async fn hangup(&mut self) -> AgiResult<Reply> {
        self.send_command(&AgiCommand::hangup())
            .await
    }
}
