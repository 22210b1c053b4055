//! Protocol constants and configuration values

/// Default FastAGI TCP port
pub const DEFAULT_FASTAGI_PORT: u16 = 4573;

/// Default listen address for the FastAGI server
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1";

/// Default number of accept loops sharing one listener
pub const DEFAULT_ACCEPT_LOOPS: usize = 4;

/// Socket buffer size for a single physical read (4KB).
/// AGI lines are short; a read rarely carries more than one environment block.
pub const SOCKET_BUF_SIZE: usize = 4096;

/// Maximum length of a single protocol line without a terminator (8KB).
/// Anything longer means the peer is not speaking AGI.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Maximum number of environment lines accepted before the block is rejected
pub const MAX_ENV_LINES: usize = 150;

/// Prefix stripped from every environment variable name
pub const ENV_PREFIX: &str = "agi_";

/// Line sent by the peer when the channel hangs up
pub const HANGUP_SENTINEL: &str = "HANGUP";

/// Protocol line terminator
pub const LINE_TERMINATOR: &str = "\n";

/// Idle read timeout in milliseconds (30 seconds)
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

/// Capacity of the inbound line and outbound command channels.
/// The protocol is half-duplex so a handful of slots is plenty.
pub const CHANNEL_CAPACITY: usize = 16;

/// Digits that interrupt STREAM FILE playback
pub const DEFAULT_ESCAPE_DIGITS: &str = "1234567890#*";

/// Dialplan application run by the echo-test script
pub const DEFAULT_ECHO_APP: &str = "Echo";

/// Channel status result meaning the line is up (already answered)
pub const CHANNEL_STATUS_UP: i32 = 6;

/// Synthesized result text for status 510
pub const RESULT_INVALID_COMMAND: &str = "Invalid or unknown command.";
/// Synthesized result text for status 511
pub const RESULT_DEAD_CHANNEL: &str = "Command Not Permitted on a dead channel.";
/// Synthesized result text for status 520
pub const RESULT_INVALID_SYNTAX: &str = "Invalid command syntax.";

/// Prefix of the first line of a multi-line 520 reply
pub const USAGE_BLOCK_START: &str = "520-";
/// Line Asterisk sends after the usage text of a multi-line 520 reply
pub const USAGE_BLOCK_END: &str = "520 End of proper usage.";
/// Prefix of the closing line of a multi-line 520 reply, whatever its text
pub const USAGE_BLOCK_LAST: &str = "520 ";
/// Prefix placed before the usage text in [`Reply::extra`](crate::Reply::extra)
pub const USAGE_PREFIX: &str = "Proper usage follows: ";
