//! AGI command construction
//!
//! Commands are single lines: an upper-case keyword followed by
//! space-separated arguments, e.g. `STREAM FILE demo "1234567890#*"`.

use std::fmt;

use crate::{
    constants::LINE_TERMINATOR,
    error::{AgiError, AgiResult},
};

/// Validate that a user-provided string contains no newline characters.
///
/// AGI commands are line-delimited; embedded newlines would allow injection
/// of arbitrary protocol commands.
fn validate_no_newlines(s: &str, context: &str) -> AgiResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AgiError::InvalidArgument {
            message: format!("{} must not contain newlines", context),
        });
    }
    Ok(())
}

/// Validate a bare (unquoted) token such as a file or application name.
fn validate_token(s: &str, context: &str) -> AgiResult<()> {
    validate_no_newlines(s, context)?;
    if s.is_empty() || s.contains(char::is_whitespace) {
        return Err(AgiError::InvalidArgument {
            message: format!("{} must be a single non-empty word", context),
        });
    }
    Ok(())
}

/// Wrap an argument in double quotes, escaping `"` and `\`.
fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Commands the session logic issues.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AgiCommand {
    /// Answer the channel
    Answer,
    /// Query the channel state; result is a [`ChannelStatus`](crate::ChannelStatus) code
    ChannelStatus { channel: Option<String> },
    /// Log a message on the Asterisk console at the given verbosity
    Verbose { message: String, level: u8 },
    /// Play a sound file, interruptible by any of `escape_digits`
    StreamFile {
        file: String,
        escape_digits: String,
        offset: Option<u64>,
    },
    /// Run a dialplan application
    Exec {
        application: String,
        options: Option<String>,
    },
    /// Hang up the current channel, or the named one
    Hangup { channel: Option<String> },
}

impl AgiCommand {
    /// `ANSWER`
    pub fn answer() -> Self {
        AgiCommand::Answer
    }

    /// `CHANNEL STATUS` for the current channel
    pub fn channel_status() -> Self {
        AgiCommand::ChannelStatus { channel: None }
    }

    /// `VERBOSE "<message>" <level>`
    pub fn verbose(message: impl Into<String>, level: u8) -> Self {
        AgiCommand::Verbose {
            message: message.into(),
            level,
        }
    }

    /// `STREAM FILE <file> "<escape digits>"`
    pub fn stream_file(file: impl Into<String>, escape_digits: impl Into<String>) -> Self {
        AgiCommand::StreamFile {
            file: file.into(),
            escape_digits: escape_digits.into(),
            offset: None,
        }
    }

    /// `EXEC <application> ["<options>"]`
    pub fn exec(application: impl Into<String>, options: Option<&str>) -> Self {
        AgiCommand::Exec {
            application: application.into(),
            options: options.map(|s| s.to_string()),
        }
    }

    /// `HANGUP` for the current channel
    pub fn hangup() -> Self {
        AgiCommand::Hangup { channel: None }
    }

    /// Command keyword as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            AgiCommand::Answer => "ANSWER",
            AgiCommand::ChannelStatus { .. } => "CHANNEL STATUS",
            AgiCommand::Verbose { .. } => "VERBOSE",
            AgiCommand::StreamFile { .. } => "STREAM FILE",
            AgiCommand::Exec { .. } => "EXEC",
            AgiCommand::Hangup { .. } => "HANGUP",
        }
    }

    /// Format a command with optional arguments
    fn format_simple_command(cmd: &str, args: &[&str]) -> String {
        let mut result = String::from(cmd);
        for arg in args {
            result.push(' ');
            result.push_str(arg);
        }
        result.push_str(LINE_TERMINATOR);
        result
    }

    /// Validate all user-supplied fields, then convert to wire format.
    pub fn to_wire_format(&self) -> AgiResult<String> {
        match self {
            AgiCommand::Answer => Ok(Self::format_simple_command(self.name(), &[])),
            AgiCommand::ChannelStatus { channel } | AgiCommand::Hangup { channel } => {
                match channel {
                    Some(c) => {
                        validate_token(c, "channel name")?;
                        Ok(Self::format_simple_command(self.name(), &[c]))
                    }
                    None => Ok(Self::format_simple_command(self.name(), &[])),
                }
            }
            AgiCommand::Verbose { message, level } => {
                validate_no_newlines(message, "verbose message")?;
                Ok(Self::format_simple_command(
                    self.name(),
                    &[&quote(message), &level.to_string()],
                ))
            }
            AgiCommand::StreamFile {
                file,
                escape_digits,
                offset,
            } => {
                validate_token(file, "stream file name")?;
                validate_no_newlines(escape_digits, "escape digits")?;
                let digits = quote(escape_digits);
                Ok(match offset {
                    Some(o) => {
                        Self::format_simple_command(self.name(), &[file, &digits, &o.to_string()])
                    }
                    None => Self::format_simple_command(self.name(), &[file, &digits]),
                })
            }
            AgiCommand::Exec {
                application,
                options,
            } => {
                validate_token(application, "exec application")?;
                match options {
                    Some(o) => {
                        validate_no_newlines(o, "exec options")?;
                        Ok(Self::format_simple_command(self.name(), &[application, &quote(o)]))
                    }
                    None => Ok(Self::format_simple_command(self.name(), &[application])),
                }
            }
        }
    }
}

impl fmt::Display for AgiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_wire_format() {
            Ok(wire) => f.write_str(wire.trim_end()),
            Err(_) => write!(f, "{} <invalid>", self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(AgiCommand::answer().to_wire_format().unwrap(), "ANSWER\n");
        assert_eq!(
            AgiCommand::channel_status()
                .to_wire_format()
                .unwrap(),
            "CHANNEL STATUS\n"
        );
        assert_eq!(AgiCommand::hangup().to_wire_format().unwrap(), "HANGUP\n");
        assert_eq!(
            AgiCommand::Hangup {
                channel: Some("SIP/100-0001".into())
            }
            .to_wire_format()
            .unwrap(),
            "HANGUP SIP/100-0001\n"
        );
    }

    #[test]
    fn test_verbose_quotes_message() {
        let cmd = AgiCommand::verbose("Playing back: demo", 1);
        assert_eq!(cmd.to_wire_format().unwrap(), "VERBOSE \"Playing back: demo\" 1\n");

        let cmd = AgiCommand::verbose(r#"say "hi" \o/"#, 3);
        assert_eq!(
            cmd.to_wire_format().unwrap(),
            "VERBOSE \"say \\\"hi\\\" \\\\o/\" 3\n"
        );
    }

    #[test]
    fn test_stream_file() {
        let cmd = AgiCommand::stream_file("tt-monkeys", "1234567890#*");
        assert_eq!(
            cmd.to_wire_format().unwrap(),
            "STREAM FILE tt-monkeys \"1234567890#*\"\n"
        );

        let cmd = AgiCommand::stream_file("beep", "");
        assert_eq!(cmd.to_wire_format().unwrap(), "STREAM FILE beep \"\"\n");

        let cmd = AgiCommand::StreamFile {
            file: "beep".into(),
            escape_digits: "#".into(),
            offset: Some(8000),
        };
        assert_eq!(cmd.to_wire_format().unwrap(), "STREAM FILE beep \"#\" 8000\n");
    }

    #[test]
    fn test_exec() {
        assert_eq!(
            AgiCommand::exec("Echo", None)
                .to_wire_format()
                .unwrap(),
            "EXEC Echo\n"
        );
        assert_eq!(
            AgiCommand::exec("Wait", Some("2"))
                .to_wire_format()
                .unwrap(),
            "EXEC Wait \"2\"\n"
        );
    }

    #[test]
    fn test_newline_injection_rejected() {
        let cmd = AgiCommand::verbose("hello\nHANGUP", 1);
        assert!(matches!(
            cmd.to_wire_format(),
            Err(AgiError::InvalidArgument { .. })
        ));

        let cmd = AgiCommand::stream_file("a file", "");
        assert!(matches!(
            cmd.to_wire_format(),
            Err(AgiError::InvalidArgument { .. })
        ));

        let cmd = AgiCommand::exec("", None);
        assert!(cmd
            .to_wire_format()
            .is_err());
    }

    #[test]
    fn test_display_has_no_terminator() {
        assert_eq!(AgiCommand::channel_status().to_string(), "CHANNEL STATUS");
        assert_eq!(AgiCommand::verbose("a\nb", 1).to_string(), "VERBOSE <invalid>");
    }
}
