//! Error types for the AGI protocol engine

use thiserror::Error;

/// Result alias used throughout the crate
pub type AgiResult<T> = Result<T, AgiError>;

/// Errors produced while framing, parsing or exchanging AGI messages.
///
/// Every variant is scoped to a single session; none of them is meant to
/// bring the server down.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgiError {
    /// Socket or stdio failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No data arrived within the read deadline
    #[error("read timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that expired, in milliseconds
        timeout_ms: u64,
    },

    /// The inbound stream ended (peer disconnect, HANGUP sentinel or timeout)
    #[error("connection closed")]
    ConnectionClosed,

    /// Bytes on the wire do not form valid AGI lines
    #[error("protocol error: {message}")]
    ProtocolError {
        /// Description of the violation
        message: String,
    },

    /// An environment line is not of the form `key: value`
    #[error("malformed environment line: {line:?}")]
    MalformedEnvironment {
        /// Offending line
        line: String,
    },

    /// The environment block did not terminate within the line cap
    #[error("malformed environment: more than {limit} lines")]
    EnvironmentTooLarge {
        /// Maximum number of lines accepted
        limit: usize,
    },

    /// A reply line matched none of the known status forms
    #[error("unexpected AGI response: {line:?}")]
    UnexpectedResponse {
        /// Offending line
        line: String,
    },

    /// A line exceeded the framer's length limit
    #[error("line exceeds {limit} bytes without terminator")]
    LineTooLong {
        /// Maximum line length
        limit: usize,
    },

    /// A session task panicked or was cancelled
    #[error("session task failed: {message}")]
    TaskFailed {
        /// Join error description
        message: String,
    },

    /// A command argument would break line framing
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument
        message: String,
    },
}

impl AgiError {
    /// Shorthand for [`AgiError::ProtocolError`].
    pub fn protocol_error(message: impl Into<String>) -> Self {
        AgiError::ProtocolError {
            message: message.into(),
        }
    }

    /// `true` when the error means the peer can no longer be reached.
    pub fn is_link_lost(&self) -> bool {
        matches!(
            self,
            AgiError::ConnectionClosed | AgiError::Timeout { .. } | AgiError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            AgiError::Timeout { timeout_ms: 1500 }.to_string(),
            "read timed out after 1500ms"
        );
        assert_eq!(
            AgiError::EnvironmentTooLarge { limit: 150 }.to_string(),
            "malformed environment: more than 150 lines"
        );
        assert_eq!(
            AgiError::protocol_error("bad bytes").to_string(),
            "protocol error: bad bytes"
        );
    }

    #[test]
    fn test_link_lost_classification() {
        assert!(AgiError::ConnectionClosed.is_link_lost());
        assert!(AgiError::Timeout { timeout_ms: 1 }.is_link_lost());
        assert!(!AgiError::UnexpectedResponse {
            line: "300 huh".into()
        }
        .is_link_lost());
    }
}
