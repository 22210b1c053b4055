//! Session logic state machine
//!
//! ```text
//! Init ─► CheckingStatus ─► Answering? ─► Announcing ─► Streaming ─► Executing?
//!   │            │               │             │             │            │
//!   └────────────┴───────────────┴──────┬──────┴─────────────┴────────────┘
//!                                       ▼
//!                           HangingUp ─► Closed
//! ```
//!
//! Every failure branch funnels into [`SessionState::HangingUp`], so exactly
//! one `HANGUP` is sent per session. The only way around it is a lost link:
//! once the inbound stream has ended nothing more can be exchanged and the
//! machine goes straight to [`SessionState::Closed`].

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    channel::ChannelStatus,
    client::AgiClient,
    command::AgiCommand,
    constants::{DEFAULT_ECHO_APP, DEFAULT_ESCAPE_DIGITS},
    environment::Environment,
    error::{AgiError, AgiResult},
    reply::Reply,
};

/// Which script a session runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionScript {
    /// Announce and play back the target file
    #[default]
    Playback,
    /// Play back the target file, then run a dialplan application
    EchoTest {
        /// Application passed to `EXEC`
        application: String,
    },
}

impl SessionScript {
    /// Echo-test script running the stock `Echo` application.
    pub fn echo_test() -> Self {
        SessionScript::EchoTest {
            application: DEFAULT_ECHO_APP.to_string(),
        }
    }
}

/// States of the session logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Init,
    CheckingStatus,
    Answering,
    Announcing,
    Streaming,
    Executing,
    HangingUp,
    Closed,
}

/// Conditions recorded while a session runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum SessionFailure {
    /// The startup block was malformed
    InvalidEnvironment(String),
    /// Neither `arg_1` nor a `file` request parameter was supplied
    MissingTarget,
    /// A command came back with a non-200 status
    CommandRejected { command: &'static str, code: u16 },
    /// `ANSWER` was rejected or returned -1
    AnswerFailed,
    /// `STREAM FILE` returned -1
    PlaybackFailed,
    /// `EXEC` returned -2
    ApplicationNotFound,
    /// A reply line matched no known form, or a command could not be built
    UnexpectedReply(String),
    /// The inbound stream ended mid-session
    LinkLost,
}

/// What a finished session did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// File the session worked on
    pub target: Option<String>,
    /// Every state entered, in order
    pub states: Vec<SessionState>,
    /// Commands handed to the writer
    pub commands_sent: usize,
    /// Whether `HANGUP` was written
    pub hangup_sent: bool,
    /// Number of environment variables received
    pub environment_size: usize,
    /// Conditions recorded along the way
    pub failures: Vec<SessionFailure>,
}

impl SessionReport {
    /// Last state reached.
    pub fn final_state(&self) -> SessionState {
        self.states
            .last()
            .copied()
            .unwrap_or(SessionState::Init)
    }

    /// How many times `state` was entered.
    pub fn visits(&self, state: SessionState) -> usize {
        self.states
            .iter()
            .filter(|s| **s == state)
            .count()
    }

    /// `true` if `failure` was recorded.
    pub fn has_failure(&self, failure: &SessionFailure) -> bool {
        self.failures
            .contains(failure)
    }

    /// Serialize the report as JSON.
    pub fn to_json(&self) -> AgiResult<String> {
        serde_json::to_string(self).map_err(|e| AgiError::protocol_error(e.to_string()))
    }
}

/// Resolve the file a session works on: `arg_1`, else the `file` request
/// parameter (`agi://host/script?file=name`). Empty values do not count.
pub fn resolve_target(env: &Environment) -> Option<String> {
    env.arg(1)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .or_else(|| {
            env.request_param("file")
                .filter(|s| !s.is_empty())
        })
}

#[derive(Debug)]
struct SessionLogic {
    script: SessionScript,
    target: Option<String>,
    failures: Vec<SessionFailure>,
    hangup_sent: bool,
}

impl SessionLogic {
    fn record(&mut self, failure: SessionFailure) {
        debug!("[SESSION] Recorded {:?}", failure);
        self.failures
            .push(failure);
    }

    /// One command/reply exchange. On error the failure is recorded and the
    /// state to continue with is returned instead.
    async fn exchange(
        &mut self,
        client: &mut AgiClient,
        command: &AgiCommand,
    ) -> Result<Reply, SessionState> {
        match client
            .send_command(command)
            .await
        {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_link_lost() => {
                info!("[SESSION] Link lost during {}: {}", command.name(), e);
                self.record(SessionFailure::LinkLost);
                Err(SessionState::Closed)
            }
            Err(e) => {
                warn!("[SESSION] {} failed: {}", command.name(), e);
                self.record(SessionFailure::UnexpectedReply(e.to_string()));
                Err(SessionState::HangingUp)
            }
        }
    }

    fn rejected(&mut self, command: &AgiCommand, reply: &Reply) -> SessionState {
        warn!("[SESSION] {} rejected: {}", command.name(), reply);
        self.record(SessionFailure::CommandRejected {
            command: command.name(),
            code: reply.code(),
        });
        SessionState::HangingUp
    }

    fn target(&mut self) -> Result<String, SessionState> {
        match &self.target {
            Some(target) => Ok(target.clone()),
            None => {
                self.record(SessionFailure::MissingTarget);
                Err(SessionState::HangingUp)
            }
        }
    }

    /// Run the action of `state` and return the next state.
    async fn step(&mut self, client: &mut AgiClient, state: SessionState) -> SessionState {
        match state {
            SessionState::Init => match self.target() {
                Ok(_) => SessionState::CheckingStatus,
                Err(next) => next,
            },

            SessionState::CheckingStatus => {
                let command = AgiCommand::channel_status();
                let reply = match self
                    .exchange(client, &command)
                    .await
                {
                    Ok(reply) => reply,
                    Err(next) => return next,
                };
                if !reply.is_success() {
                    return self.rejected(&command, &reply);
                }
                match reply
                    .result_code()
                    .and_then(ChannelStatus::from_number)
                {
                    Some(status) if status.is_answered() => {
                        debug!("[SESSION] Channel already answered");
                        SessionState::Announcing
                    }
                    status => {
                        debug!("[SESSION] Channel status {:?}, answering", status);
                        SessionState::Answering
                    }
                }
            }

            SessionState::Answering => {
                let command = AgiCommand::answer();
                let reply = match self
                    .exchange(client, &command)
                    .await
                {
                    Ok(reply) => reply,
                    Err(next) => return next,
                };
                if !reply.is_success() || reply.is_failure() {
                    warn!("[SESSION] ANSWER failed: {}", reply);
                    self.record(SessionFailure::AnswerFailed);
                    return SessionState::HangingUp;
                }
                SessionState::Announcing
            }

            SessionState::Announcing => {
                let target = match self.target() {
                    Ok(target) => target,
                    Err(next) => return next,
                };
                let command = AgiCommand::verbose(format!("Playing back: {}", target), 1);
                match self
                    .exchange(client, &command)
                    .await
                {
                    Ok(reply) if reply.is_success() => SessionState::Streaming,
                    Ok(reply) => self.rejected(&command, &reply),
                    Err(next) => next,
                }
            }

            SessionState::Streaming => {
                let target = match self.target() {
                    Ok(target) => target,
                    Err(next) => return next,
                };
                let command = AgiCommand::stream_file(target, DEFAULT_ESCAPE_DIGITS);
                let reply = match self
                    .exchange(client, &command)
                    .await
                {
                    Ok(reply) => reply,
                    Err(next) => return next,
                };
                if !reply.is_success() {
                    return self.rejected(&command, &reply);
                }
                if reply.is_failure() {
                    warn!("[SESSION] Failed to play back {:?}", self.target);
                    self.record(SessionFailure::PlaybackFailed);
                }
                match self.script {
                    SessionScript::Playback => SessionState::HangingUp,
                    SessionScript::EchoTest { .. } => SessionState::Executing,
                }
            }

            SessionState::Executing => {
                let application = match &self.script {
                    SessionScript::EchoTest { application } => application.clone(),
                    SessionScript::Playback => return SessionState::HangingUp,
                };
                let command = AgiCommand::exec(application.as_str(), None);
                let reply = match self
                    .exchange(client, &command)
                    .await
                {
                    Ok(reply) => reply,
                    Err(next) => return next,
                };
                if !reply.is_success() {
                    return self.rejected(&command, &reply);
                }
                if reply.result_code() == Some(-2) {
                    warn!("[SESSION] Application {} not found", application);
                    self.record(SessionFailure::ApplicationNotFound);
                }
                SessionState::HangingUp
            }

            SessionState::HangingUp => {
                let before = client.commands_sent();
                let command = AgiCommand::hangup();
                let ack = self
                    .exchange(client, &command)
                    .await;
                self.hangup_sent = client.commands_sent() > before;
                if let Ok(reply) = ack {
                    if !reply.is_success() {
                        self.rejected(&command, &reply);
                    }
                }
                SessionState::Closed
            }

            SessionState::Closed => SessionState::Closed,
        }
    }
}

/// Drive one session to completion.
///
/// Reads the environment, then runs the state machine until
/// [`SessionState::Closed`]. The client is dropped on return, which closes
/// the outbound channel and releases the inbound receiver.
pub async fn run(mut client: AgiClient, script: SessionScript) -> SessionReport {
    let mut logic = SessionLogic {
        script,
        target: None,
        failures: Vec::new(),
        hangup_sent: false,
    };
    let mut states = vec![SessionState::Init];
    let mut environment_size = 0;

    let mut state = match client
        .read_environment()
        .await
    {
        Ok(env) => {
            environment_size = env.len();
            logic.target = resolve_target(&env);
            logic
                .step(&mut client, SessionState::Init)
                .await
        }
        Err(e) if e.is_link_lost() => {
            info!("[SESSION] Link lost before environment completed: {}", e);
            logic.record(SessionFailure::LinkLost);
            SessionState::Closed
        }
        Err(e) => {
            logic.record(SessionFailure::InvalidEnvironment(e.to_string()));
            SessionState::HangingUp
        }
    };

    loop {
        states.push(state);
        if state == SessionState::Closed {
            break;
        }
        state = logic
            .step(&mut client, state)
            .await;
    }

    info!(
        "[SESSION] Closed after {} commands (target {:?}, {} failures)",
        client.commands_sent(),
        logic.target,
        logic
            .failures
            .len()
    );

    SessionReport {
        target: logic.target,
        states,
        commands_sent: client.commands_sent(),
        hangup_sent: logic.hangup_sent,
        environment_size,
        failures: logic.failures,
    }
}
