//! Contracts for the codecs that sit on top of the transport.
//!
//! The transport never interprets frame or handshake bytes. It hands an
//! inbound byte source to [`Frame::parse`] and writes whatever
//! [`Frame::to_bytes`] or [`Handshake::to_bytes`] produce.

use std::io::{self, Read};

use thiserror::Error;

/// Errors a frame codec reports while parsing.
#[derive(Debug, Error)]
pub enum FrameFormatError {
    /// The byte source failed or ended mid-frame.
    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),

    /// The bytes do not form a valid frame.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// A protocol frame with its own wire encoding.
pub trait Frame: Sized {
    /// Consume exactly one frame from `source`.
    fn parse(source: &mut dyn Read) -> Result<Self, FrameFormatError>;

    /// Encode the frame for the wire.
    fn to_bytes(&self) -> Vec<u8>;
}

/// An opening-handshake message (request or response).
pub trait Handshake {
    /// Encode the full header block, including the terminating blank line.
    fn to_bytes(&self) -> Vec<u8>;
}

/// A handshake held as raw header lines.
///
/// The first line is the request or status line; the rest are header lines
/// in order. No structure is imposed on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeLines {
    lines: Vec<String>,
}

impl HandshakeLines {
    /// Start a block with its request or status line.
    pub fn new(first_line: impl Into<String>) -> Self {
        Self {
            lines: vec![first_line.into()],
        }
    }

    /// Append a `Name: value` header line.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.lines.push(format!("{name}: {value}"));
        self
    }

    /// Append an already formatted line.
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl From<Vec<String>> for HandshakeLines {
    fn from(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

impl Handshake for HandshakeLines {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.lines.iter().map(|l| l.len() + 2).sum::<usize>() + 2);
        for line in &self.lines {
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_lines_serialize_with_blank_terminator() {
        let hs = HandshakeLines::new("GET /chat HTTP/1.1")
            .header("Host", "example.com")
            .header("Upgrade", "websocket");

        assert_eq!(
            hs.to_bytes(),
            b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn handshake_lines_from_vec_keeps_order() {
        let hs = HandshakeLines::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(hs.lines(), ["a", "b"]);
        assert_eq!(hs.into_lines(), vec!["a".to_string(), "b".to_string()]);
    }
}
