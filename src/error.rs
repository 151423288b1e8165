//! Error taxonomy for the transport layer.
//!
//! Creation-time failures are [`ConnectionError`]; everything an established
//! connection can report is a [`TransportError`]. Nothing here is retried
//! internally: every error surfaces to the caller of the operation that
//! detected it.

use std::io;

use thiserror::Error;

use crate::codec::FrameFormatError;

/// Errors raised while opening or accepting a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP connect failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The host name cannot be used as a TLS server name.
    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// The TLS handshake was rejected by either side.
    #[error("TLS handshake failed: {0}")]
    Tls(#[from] rustls::Error),

    /// Certificate or key material could not be loaded.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Socket-level failure while setting up the connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by operations on an established connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The stream ended before a fixed-length read was satisfied.
    #[error("incomplete read: expected {expected} bytes, received {received}")]
    IncompleteRead { expected: usize, received: usize },

    /// The handshake header block is malformed or was cut short.
    #[error("malformed handshake: {0}")]
    HandshakeFormat(String),

    /// The handshake header block exceeded the configured size.
    #[error("handshake header block exceeds {limit} bytes")]
    HandshakeTooLarge { limit: usize },

    /// The handshake read deadline expired.
    #[error("timed out reading handshake header block")]
    HandshakeTimeout,

    /// Propagated unchanged from the frame codec.
    #[error(transparent)]
    FrameFormat(#[from] FrameFormatError),

    /// The connection was closed before or during the operation.
    #[error("connection is closed")]
    ResourceClosed,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::IncompleteRead {
            expected: 10,
            received: 3,
        };
        assert_eq!(
            err.to_string(),
            "incomplete read: expected 10 bytes, received 3"
        );

        let err = TransportError::HandshakeTooLarge { limit: 8192 };
        assert!(err.to_string().contains("8192"));
    }

    #[test]
    fn connection_error_is_transparent() {
        let err: TransportError =
            ConnectionError::InvalidServerName("bad name".to_string()).into();
        assert_eq!(err.to_string(), "invalid TLS server name: bad name");
    }
}
