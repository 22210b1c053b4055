//! Line framing over a raw byte stream
//!
//! [`LineFramer`] is the synchronous core: bytes go in through
//! [`add_data`](LineFramer::add_data), complete lines come out of
//! [`next_line`](LineFramer::next_line), and whatever follows the last
//! newline stays in the pending buffer until the next read completes it.
//!
//! [`LineReader`] drives a framer from an [`AsyncRead`] source, applying a
//! deadline to every physical read and turning the peer's `HANGUP` sentinel
//! into an end-of-stream.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::trace;

use crate::{
    constants::{HANGUP_SENTINEL, MAX_LINE_LENGTH, SOCKET_BUF_SIZE},
    error::{AgiError, AgiResult},
    pipeline::DisconnectReason,
};

/// Reassembles newline-delimited lines from arbitrarily chunked input.
#[derive(Debug)]
pub struct LineFramer {
    pending: BytesMut,
    max_line_length: usize,
}

impl LineFramer {
    /// Create a framer with the default [`MAX_LINE_LENGTH`].
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a framer rejecting lines longer than `max_line_length` bytes.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(SOCKET_BUF_SIZE),
            max_line_length,
        }
    }

    /// Append freshly read bytes after the pending tail.
    pub fn add_data(&mut self, data: &[u8]) {
        self.pending
            .extend_from_slice(data);
    }

    /// Bytes received after the last complete line.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Pop the next complete line, without its `\n` (or `\r\n`).
    ///
    /// Returns `Ok(None)` when the buffer holds no full line yet.
    pub fn next_line(&mut self) -> AgiResult<Option<String>> {
        let Some(pos) = self
            .pending
            .iter()
            .position(|&b| b == b'\n')
        else {
            if self.pending.len() > self.max_line_length {
                return Err(AgiError::LineTooLong {
                    limit: self.max_line_length,
                });
            }
            return Ok(None);
        };

        if pos > self.max_line_length {
            return Err(AgiError::LineTooLong {
                limit: self.max_line_length,
            });
        }

        let mut raw = self
            .pending
            .split_to(pos + 1);
        raw.truncate(pos);
        if raw.last() == Some(&b'\r') {
            raw.truncate(pos - 1);
        }

        String::from_utf8(raw.to_vec())
            .map(Some)
            .map_err(|_| AgiError::protocol_error("Invalid UTF-8 in line"))
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy, finite sequence of lines read from an async byte source.
///
/// Once [`next_line`](Self::next_line) has returned an end reason, every
/// later call returns the same reason without touching the source again.
pub struct LineReader<R> {
    reader: R,
    framer: LineFramer,
    read_timeout: Duration,
    read_buffer: Box<[u8]>,
    finished: Option<DisconnectReason>,
}

impl<R> std::fmt::Debug for LineReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("read_timeout", &self.read_timeout)
            .field("pending", &self.framer.pending().len())
            .field("finished", &self.finished)
            .finish()
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap `reader`. A zero `read_timeout` disables the read deadline.
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            reader,
            framer: LineFramer::new(),
            read_timeout,
            read_buffer: vec![0u8; SOCKET_BUF_SIZE].into_boxed_slice(),
            finished: None,
        }
    }

    /// Why the sequence ended, if it has.
    pub fn end_reason(&self) -> Option<&DisconnectReason> {
        self.finished
            .as_ref()
    }

    fn finish(&mut self, reason: DisconnectReason) -> DisconnectReason {
        self.finished = Some(reason.clone());
        reason
    }

    /// Next complete line, or the reason the stream ended.
    pub async fn next_line(&mut self) -> Result<String, DisconnectReason> {
        if let Some(reason) = &self.finished {
            return Err(reason.clone());
        }

        loop {
            match self
                .framer
                .next_line()
            {
                Ok(Some(line)) if line == HANGUP_SENTINEL => {
                    trace!("[RECV] Peer sent HANGUP sentinel");
                    return Err(self.finish(DisconnectReason::PeerHangup));
                }
                Ok(Some(line)) => {
                    trace!("[RECV] {}", line);
                    return Ok(line);
                }
                Ok(None) => {}
                Err(e) => return Err(self.finish(DisconnectReason::ProtocolError(e.to_string()))),
            }

            let read_result = if self.read_timeout.is_zero() {
                Ok(self
                    .reader
                    .read(&mut self.read_buffer)
                    .await)
            } else {
                timeout(self.read_timeout, self.reader.read(&mut self.read_buffer)).await
            };

            match read_result {
                Ok(Ok(0)) => return Err(self.finish(DisconnectReason::ConnectionClosed)),
                Ok(Ok(n)) => {
                    trace!("[RECV] Read {} bytes", n);
                    self.framer
                        .add_data(&self.read_buffer[..n]);
                }
                Ok(Err(e)) => return Err(self.finish(DisconnectReason::IoError(e.to_string()))),
                Err(_) => {
                    let timeout_ms = self
                        .read_timeout
                        .as_millis() as u64;
                    return Err(self.finish(DisconnectReason::ReadTimeout { timeout_ms }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut LineFramer) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = framer
            .next_line()
            .unwrap()
        {
            lines.push(line);
        }
        lines
    }

    const SAMPLE: &[u8] = b"agi_request: agi://127.0.0.1/hello?file=demo\n\
agi_channel: SIP/100-00000001\n\
agi_arg_1: tt-monkeys\n\
\n\
200 result=6\n\
200 result=0\n";

    #[test]
    fn test_single_chunk() {
        let mut framer = LineFramer::new();
        framer.add_data(SAMPLE);
        let lines = drain(&mut framer);

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "agi_request: agi://127.0.0.1/hello?file=demo");
        assert_eq!(lines[3], "");
        assert_eq!(lines[5], "200 result=0");
        assert!(framer
            .pending()
            .is_empty());
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let mut whole = LineFramer::new();
        whole.add_data(SAMPLE);
        let expected = drain(&mut whole);

        for chunk_size in 1..=SAMPLE.len() {
            let mut framer = LineFramer::new();
            let mut lines = Vec::new();
            for chunk in SAMPLE.chunks(chunk_size) {
                framer.add_data(chunk);
                lines.extend(drain(&mut framer));
            }
            assert_eq!(lines, expected, "chunk size {}", chunk_size);
            assert!(framer
                .pending()
                .is_empty());
        }
    }

    #[test]
    fn test_partial_tail_is_preserved() {
        let mut framer = LineFramer::new();
        framer.add_data(b"200 res");
        assert_eq!(
            framer
                .next_line()
                .unwrap(),
            None
        );
        assert_eq!(framer.pending(), b"200 res");

        framer.add_data(b"ult=1\n510 Inv");
        assert_eq!(
            framer
                .next_line()
                .unwrap()
                .as_deref(),
            Some("200 result=1")
        );
        assert_eq!(
            framer
                .next_line()
                .unwrap(),
            None
        );
        assert_eq!(framer.pending(), b"510 Inv");
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut framer = LineFramer::new();
        framer.add_data(b"200 result=0\r\n\r\n");
        assert_eq!(drain(&mut framer), vec!["200 result=0", ""]);
    }

    #[test]
    fn test_unterminated_line_too_long() {
        let mut framer = LineFramer::with_max_line_length(8);
        framer.add_data(b"123456789");
        assert!(matches!(
            framer.next_line(),
            Err(AgiError::LineTooLong { limit: 8 })
        ));
    }

    #[test]
    fn test_terminated_line_too_long() {
        let mut framer = LineFramer::with_max_line_length(4);
        framer.add_data(b"12345\n");
        assert!(matches!(
            framer.next_line(),
            Err(AgiError::LineTooLong { limit: 4 })
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut framer = LineFramer::new();
        framer.add_data(b"agi_callerid: \xff\xfe\n");
        assert!(matches!(
            framer.next_line(),
            Err(AgiError::ProtocolError { .. })
        ));
    }

    #[tokio::test]
    async fn test_reader_reassembles_fragmented_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"agi_arg_1: de")
            .read(b"mo\n\n200 res")
            .read(b"ult=6\n")
            .build();
        let mut reader = LineReader::new(mock, Duration::from_secs(5));

        assert_eq!(reader.next_line().await.unwrap(), "agi_arg_1: demo");
        assert_eq!(reader.next_line().await.unwrap(), "");
        assert_eq!(reader.next_line().await.unwrap(), "200 result=6");
        assert_eq!(
            reader
                .next_line()
                .await,
            Err(DisconnectReason::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_reader_stops_at_hangup_sentinel() {
        let mock = tokio_test::io::Builder::new()
            .read(b"200 result=0\nHANGUP\n200 result=1\n")
            .build();
        let mut reader = LineReader::new(mock, Duration::from_secs(5));

        assert_eq!(reader.next_line().await.unwrap(), "200 result=0");
        assert_eq!(
            reader
                .next_line()
                .await,
            Err(DisconnectReason::PeerHangup)
        );
        // Finite: the line after the sentinel is never produced.
        assert_eq!(
            reader
                .next_line()
                .await,
            Err(DisconnectReason::PeerHangup)
        );
        assert_eq!(reader.end_reason(), Some(&DisconnectReason::PeerHangup));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_times_out_without_data() {
        let (client, _server) = tokio::io::duplex(64);
        let mut reader = LineReader::new(client, Duration::from_millis(250));

        assert_eq!(
            reader
                .next_line()
                .await,
            Err(DisconnectReason::ReadTimeout { timeout_ms: 250 })
        );
    }

    #[tokio::test]
    async fn test_reader_reports_protocol_error() {
        let mock = tokio_test::io::Builder::new()
            .read(b"\xff\n")
            .build();
        let mut reader = LineReader::new(mock, Duration::from_secs(5));

        assert!(matches!(
            reader
                .next_line()
                .await,
            Err(DisconnectReason::ProtocolError(_))
        ));
    }
}
