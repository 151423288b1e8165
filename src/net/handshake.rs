//! Opening-handshake header block extraction.
//!
//! The header block is read one byte at a time until the `CR LF CR LF`
//! terminator, so nothing after the blank line is consumed. Scanning is a
//! single pass over a 4-state automaton; state `n` means the last `n` bytes
//! matched the first `n` bytes of the terminator.
//!
//! A mismatching byte normally resets the automaton to state 0. A mismatching
//! `CR` instead restarts it at state 1, since that `CR` may itself open the
//! terminator; without this, `\r\r\n\r\n` would be read past its blank line.

use std::io::{self, Read};

use crate::error::{TransportError, TransportResult};

const TERMINATOR: [u8; 4] = *b"\r\n\r\n";

/// Limits applied while scanning a header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeLimits {
    /// Maximum bytes accumulated, terminator included.
    pub max_header_bytes: usize,
}

impl Default for HandshakeLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: 8 * 1024,
        }
    }
}

/// Terminator matcher.
#[derive(Debug, Default, Clone, Copy)]
struct TerminatorScan {
    state: usize,
}

impl TerminatorScan {
    /// Feed one byte; returns `true` once the full terminator has been seen.
    fn advance(&mut self, byte: u8) -> bool {
        if byte == TERMINATOR[self.state] {
            self.state += 1;
        } else if byte == TERMINATOR[0] {
            // A stray CR starts a new candidate terminator.
            self.state = 1;
        } else {
            self.state = 0;
        }
        self.state == TERMINATOR.len()
    }
}

/// Read a raw header block from `source` and split it into lines.
///
/// `source` must not be buffered beyond what it hands out, otherwise bytes
/// following the terminator would be lost to the caller.
pub fn read_header_block<R: Read + ?Sized>(
    source: &mut R,
    limits: HandshakeLimits,
) -> TransportResult<Vec<String>> {
    let mut block = Vec::with_capacity(256.min(limits.max_header_bytes));
    let mut scan = TerminatorScan::default();
    let mut byte = [0u8; 1];

    loop {
        if block.len() >= limits.max_header_bytes {
            return Err(TransportError::HandshakeTooLarge {
                limit: limits.max_header_bytes,
            });
        }

        match source.read(&mut byte) {
            Ok(0) => {
                return Err(TransportError::HandshakeFormat(format!(
                    "stream ended after {} bytes without a blank line",
                    block.len()
                )))
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Err(TransportError::HandshakeTimeout)
            }
            Err(e) => return Err(TransportError::Io(e)),
        }

        block.push(byte[0]);
        if scan.advance(byte[0]) {
            break;
        }
    }

    split_lines(block)
}

/// Decode and normalize a header block into its lines.
///
/// `CRLF` becomes `LF`, doubled `LF`s collapse, one trailing `LF` is
/// dropped, and the remainder is split on `LF`.
pub fn split_lines(block: Vec<u8>) -> TransportResult<Vec<String>> {
    let text = String::from_utf8(block)
        .map_err(|e| TransportError::HandshakeFormat(format!("header block is not UTF-8: {e}")))?;

    let normalized = text.replace("\r\n", "\n").replace("\n\n", "\n");
    let trimmed = normalized.strip_suffix('\n').unwrap_or(&normalized);

    Ok(trimmed.split('\n').map(str::to_owned).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(input: &[u8]) -> (TransportResult<Vec<String>>, u64) {
        let mut cursor = Cursor::new(input.to_vec());
        let result = read_header_block(&mut cursor, HandshakeLimits::default());
        (result, cursor.position())
    }

    #[test]
    fn request_block() {
        let input = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let (lines, consumed) = read_all(input);
        assert_eq!(lines.unwrap(), ["GET / HTTP/1.1", "Host: x"]);
        assert_eq!(consumed, input.len() as u64);
    }

    #[test]
    fn stops_at_terminator() {
        let input = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n\x81\x05hello";
        let (lines, consumed) = read_all(input);
        assert_eq!(
            lines.unwrap(),
            ["HTTP/1.1 101 Switching Protocols", "Upgrade: websocket"]
        );
        assert_eq!(&input[consumed as usize..], b"\x81\x05hello");
    }

    #[test]
    fn near_miss_is_not_a_terminator() {
        let input = b"A: 1\n\n\r\rB: 2\r\n\r\n";
        let (lines, consumed) = read_all(input);
        assert_eq!(consumed, input.len() as u64);
        assert_eq!(lines.unwrap(), ["A: 1", "\r\rB: 2"]);
    }

    #[test]
    fn near_miss_then_end_of_stream_is_format_error() {
        let (result, _) = read_all(b"A: 1\n\n\r\r");
        assert!(matches!(result, Err(TransportError::HandshakeFormat(_))));
    }

    #[test]
    fn stray_cr_restarts_match() {
        let (lines, consumed) = read_all(b"X\r\r\n\r\nrest");
        assert_eq!(consumed, 6);
        assert_eq!(lines.unwrap(), ["X\r"]);
    }

    #[test]
    fn size_limit() {
        let mut cursor = Cursor::new(b"GET / HTTP/1.1\r\nHost: a-long-host-name\r\n\r\n".to_vec());
        let result = read_header_block(&mut cursor, HandshakeLimits { max_header_bytes: 16 });
        assert!(matches!(
            result,
            Err(TransportError::HandshakeTooLarge { limit: 16 })
        ));
    }

    #[test]
    fn block_exactly_at_limit() {
        let input = b"GET / HTTP/1.1\r\n\r\n";
        let mut cursor = Cursor::new(input.to_vec());
        let limits = HandshakeLimits {
            max_header_bytes: input.len(),
        };
        assert_eq!(read_header_block(&mut cursor, limits).unwrap(), ["GET / HTTP/1.1"]);
    }

    #[test]
    fn invalid_utf8() {
        let (result, _) = read_all(b"GET /\xff HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(TransportError::HandshakeFormat(_))));
    }

    #[test]
    fn normalizes_mixed_line_endings() {
        let lines = split_lines(b"A\nB\r\n\nC\r\n\r\n".to_vec()).unwrap();
        assert_eq!(lines, ["A", "B", "C"]);
    }

    #[test]
    fn empty_block() {
        let (lines, _) = read_all(b"\r\n\r\n");
        assert_eq!(lines.unwrap(), [""]);
    }
}
