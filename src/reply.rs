//! Reply classification
//!
//! Every AGI command is answered by one line of the form
//! `<status> result=<value> [extra]`, or by one of the fixed error forms:
//!
//! | status | meaning                                  |
//! |--------|------------------------------------------|
//! | `200`  | command executed, see `result=`          |
//! | `510`  | invalid or unknown command               |
//! | `511`  | command not permitted on a dead channel  |
//! | `520`  | invalid syntax (`520-` opens a usage block) |
//!
//! Anything else is [`AgiError::UnexpectedResponse`].

use std::fmt;

use crate::{
    constants::{
        RESULT_DEAD_CHANNEL, RESULT_INVALID_COMMAND, RESULT_INVALID_SYNTAX, USAGE_BLOCK_START,
        USAGE_PREFIX,
    },
    error::{AgiError, AgiResult},
};

/// Status code of an AGI reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ReplyStatus {
    /// `200`
    Success,
    /// `510`
    InvalidCommand,
    /// `511`
    DeadChannel,
    /// `520`
    InvalidSyntax,
}

impl ReplyStatus {
    /// Numeric status code as sent on the wire.
    pub fn code(&self) -> u16 {
        match self {
            ReplyStatus::Success => 200,
            ReplyStatus::InvalidCommand => 510,
            ReplyStatus::DeadChannel => 511,
            ReplyStatus::InvalidSyntax => 520,
        }
    }

    /// Status for a numeric code, if it is one the protocol defines.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(ReplyStatus::Success),
            510 => Some(ReplyStatus::InvalidCommand),
            511 => Some(ReplyStatus::DeadChannel),
            520 => Some(ReplyStatus::InvalidSyntax),
            _ => None,
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Structured result of one command exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: ReplyStatus,
    result: String,
    extra: Option<String>,
}

/// Outcome of classifying a single reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// The line is a complete reply.
    Complete(Reply),
    /// The line opened a `520-` usage block; the next line carries the usage
    /// text (see [`Reply::with_usage`]).
    NeedsUsage(Reply),
}

/// Split into at most three whitespace-delimited fields.
fn split_fields(line: &str) -> (&str, &str, Option<&str>) {
    let (status, rest) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    let rest = rest.trim_start();
    let (result, extra) = match rest.split_once(char::is_whitespace) {
        Some((result, extra)) => (result, Some(extra.trim_start())),
        None => (rest, None),
    };
    (status, result, extra.filter(|e| !e.is_empty()))
}

impl Reply {
    /// Build a reply directly.
    pub fn new(status: ReplyStatus, result: impl Into<String>, extra: Option<String>) -> Self {
        Self {
            status,
            result: result.into(),
            extra,
        }
    }

    /// Shorthand for a `200 result=<result>` reply.
    pub fn success(result: impl Into<String>) -> Self {
        Self::new(ReplyStatus::Success, result, None)
    }

    fn synthesized(status: ReplyStatus, description: &str) -> Self {
        Self::new(status, description, None)
    }

    /// Classify one reply line.
    pub fn classify(line: &str) -> AgiResult<Classified> {
        let line = line.trim();
        let (status, result, extra) = split_fields(line);

        match status {
            "200" => {
                let result = result
                    .strip_prefix("result=")
                    .unwrap_or(result);
                Ok(Classified::Complete(Reply::new(
                    ReplyStatus::Success,
                    result,
                    extra.map(str::to_string),
                )))
            }
            "510" => Ok(Classified::Complete(Reply::synthesized(
                ReplyStatus::InvalidCommand,
                RESULT_INVALID_COMMAND,
            ))),
            "511" => Ok(Classified::Complete(Reply::synthesized(
                ReplyStatus::DeadChannel,
                RESULT_DEAD_CHANNEL,
            ))),
            "520" => Ok(Classified::Complete(Reply::synthesized(
                ReplyStatus::InvalidSyntax,
                RESULT_INVALID_SYNTAX,
            ))),
            s if s.starts_with(USAGE_BLOCK_START) => Ok(Classified::NeedsUsage(
                Reply::synthesized(ReplyStatus::InvalidSyntax, RESULT_INVALID_SYNTAX),
            )),
            _ => Err(AgiError::UnexpectedResponse {
                line: line.to_string(),
            }),
        }
    }

    /// Classify a line that is known to be a single-line reply. A `520-`
    /// opener is returned without usage text.
    pub fn parse(line: &str) -> AgiResult<Self> {
        match Self::classify(line)? {
            Classified::Complete(reply) | Classified::NeedsUsage(reply) => Ok(reply),
        }
    }

    /// Attach the usage line that follows a `520-` opener.
    pub fn with_usage(mut self, usage: &str) -> Self {
        self.extra = Some(format!("{}{}", USAGE_PREFIX, usage.trim_end()));
        self
    }

    /// Reply status.
    pub fn status(&self) -> ReplyStatus {
        self.status
    }

    /// Numeric status code (200, 510, 511, 520).
    pub fn code(&self) -> u16 {
        self.status
            .code()
    }

    /// `result=` value for `200` replies, description otherwise.
    pub fn result(&self) -> &str {
        &self.result
    }

    /// Trailing payload, e.g. `(timeout)`, `endpos=12345` or usage text.
    pub fn extra(&self) -> Option<&str> {
        self.extra
            .as_deref()
    }

    /// `true` for status `200`, whatever the result value.
    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }

    /// Numeric result of a `200` reply.
    pub fn result_code(&self) -> Option<i32> {
        if !self.is_success() {
            return None;
        }
        self.result
            .parse()
            .ok()
    }

    /// `true` for `200 result=-1`: the command ran and reported failure.
    pub fn is_failure(&self) -> bool {
        self.result_code() == Some(-1)
    }
}

impl fmt::Display for Reply {
    /// Wire form of the reply (single line; usage text is not reproduced).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            ReplyStatus::Success => {
                write!(f, "200 result={}", self.result)?;
                if let Some(extra) = &self.extra {
                    write!(f, " {}", extra)?;
                }
                Ok(())
            }
            _ => write!(f, "{} {}", self.status, self.result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(line: &str) -> Reply {
        match Reply::classify(line).unwrap() {
            Classified::Complete(reply) => reply,
            other => panic!("expected complete reply, got {:?}", other),
        }
    }

    #[test]
    fn test_success_strips_result_prefix() {
        let reply = complete("200 result=6\n");
        assert_eq!(reply.status(), ReplyStatus::Success);
        assert_eq!(reply.result(), "6");
        assert_eq!(reply.result_code(), Some(6));
        assert_eq!(reply.extra(), None);
    }

    #[test]
    fn test_success_with_extra() {
        let reply = complete("200 result=0 endpos=8640");
        assert_eq!(reply.result(), "0");
        assert_eq!(reply.extra(), Some("endpos=8640"));

        let reply = complete("200 result=1 (timeout) extra words");
        assert_eq!(reply.extra(), Some("(timeout) extra words"));
    }

    #[test]
    fn test_minus_one_is_failure_not_error() {
        let reply = complete("200 result=-1");
        assert!(reply.is_success());
        assert!(reply.is_failure());
        assert_eq!(reply.result_code(), Some(-1));
    }

    #[test]
    fn test_error_statuses_are_synthesized() {
        let reply = complete("510 Invalid or unknown command");
        assert_eq!(reply.code(), 510);
        assert_eq!(reply.result(), RESULT_INVALID_COMMAND);
        assert_eq!(reply.extra(), None);
        assert_eq!(reply.result_code(), None);

        let reply = complete("511 Command Not Permitted on a dead channel or intercept routine");
        assert_eq!(reply.status(), ReplyStatus::DeadChannel);
        assert_eq!(reply.result(), RESULT_DEAD_CHANNEL);

        let reply = complete("520 Invalid command syntax.  Proper usage not available.");
        assert_eq!(reply.status(), ReplyStatus::InvalidSyntax);
        assert_eq!(reply.result(), RESULT_INVALID_SYNTAX);
        assert_eq!(reply.extra(), None);
    }

    #[test]
    fn test_usage_block_opener() {
        let classified =
            Reply::classify("520-Invalid command syntax.  Proper usage follows:").unwrap();
        let Classified::NeedsUsage(reply) = classified else {
            panic!("expected usage block opener");
        };
        let reply =
            reply.with_usage(" Usage: STREAM FILE <filename> <escape digits> [sample offset]\n");
        assert_eq!(reply.code(), 520);
        assert_eq!(
            reply.extra(),
            Some(concat!(
                "Proper usage follows:  ",
                "Usage: STREAM FILE <filename> <escape digits> [sample offset]"
            ))
        );
    }

    #[test]
    fn test_unexpected_status_is_error() {
        for line in ["", "300 result=0", "HELLO", "result=0 200"] {
            assert!(
                matches!(
                    Reply::classify(line),
                    Err(AgiError::UnexpectedResponse { .. })
                ),
                "line {:?} should be rejected",
                line
            );
        }
    }

    #[test]
    fn test_round_trip_through_display() {
        let replies = [
            Reply::success("0"),
            Reply::success("-1"),
            Reply::new(ReplyStatus::Success, "1", Some("(timeout)".into())),
            complete("510 Invalid"),
            complete("511 dead"),
            complete("520 bad"),
        ];
        for reply in replies {
            let line = reply.to_string();
            assert_eq!(complete(&line), reply, "round trip of {:?}", line);
        }
    }

    #[test]
    fn test_classification_is_idempotent() {
        let once = complete("200   result=4   ");
        let twice = complete(&once.to_string());
        assert_eq!(once, twice);
        assert_eq!(twice.result(), "4");
    }

    #[test]
    fn test_status_codes() {
        for status in [
            ReplyStatus::Success,
            ReplyStatus::InvalidCommand,
            ReplyStatus::DeadChannel,
            ReplyStatus::InvalidSyntax,
        ] {
            assert_eq!(ReplyStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ReplyStatus::from_code(404), None);
    }
}
