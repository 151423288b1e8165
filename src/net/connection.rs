//! Transport connection: locked read/write surface over one socket.
//!
//! # Responsibilities
//! - Own the socket (and TLS session) for the connection's whole life
//! - Serialize reads against reads and writes against writes
//! - Extract the handshake header block and hand frames to codecs
//! - Close idempotently, unblocking in-flight operations
//!
//! Reads and writes take independent locks, so a reader blocked on an idle
//! peer never delays a writer.

use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::{Frame, FrameFormatError, Handshake};
use crate::config::HandshakeConfig;
use crate::error::{TransportError, TransportResult};
use crate::net::handshake::{read_header_block, HandshakeLimits};
use crate::net::security::SecurityMode;
use crate::net::stream::{socket_has_data, Channel, ReadHalf, WriteHalf};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which end of the connection this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiated the connection.
    Client,
    /// Accepted the connection.
    Server,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// A plain or encrypted byte stream with per-direction locking.
///
/// Created only by [`ConnectionFactory`](crate::net::ConnectionFactory).
/// Dropping the connection closes it.
pub struct TransportConnection {
    id: ConnectionId,
    role: Role,
    channel: Channel,
    reader: Mutex<ReadHalf>,
    writer: Mutex<WriteHalf>,
    /// Used only by `close` to shut the socket down.
    control: TcpStream,
    closed: AtomicBool,
    limits: HandshakeLimits,
    handshake_timeout: Option<Duration>,
}

impl TransportConnection {
    pub(crate) fn new(
        role: Role,
        socket: TcpStream,
        session: Option<rustls::Connection>,
        handshake: &HandshakeConfig,
    ) -> io::Result<Self> {
        let channel = Channel::new(session);
        let read_socket = socket.try_clone()?;
        let write_socket = socket.try_clone()?;

        Ok(Self {
            id: ConnectionId::new(),
            role,
            reader: Mutex::new(ReadHalf::new(read_socket, channel.mode())),
            writer: Mutex::new(WriteHalf::new(write_socket)),
            channel,
            control: socket,
            closed: AtomicBool::new(false),
            limits: HandshakeLimits {
                max_header_bytes: handshake.max_header_bytes,
            },
            handshake_timeout: handshake.read_timeout(),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.channel.mode()
    }

    pub fn is_secure(&self) -> bool {
        self.security_mode().is_encrypted()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.control.peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.control.local_addr()
    }

    /// Set a read deadline on the underlying socket. Applies to every read.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.control.set_read_timeout(timeout)
    }

    /// Set a write deadline on the underlying socket. Applies to every write.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.control.set_write_timeout(timeout)
    }

    fn ensure_open(&self) -> TransportResult<()> {
        if self.is_closed() {
            Err(TransportError::ResourceClosed)
        } else {
            Ok(())
        }
    }

    /// Errors seen after `close` are reported as `ResourceClosed`.
    fn fail(&self, err: TransportError) -> TransportError {
        if self.is_closed() {
            TransportError::ResourceClosed
        } else {
            err
        }
    }

    /// Fill `buf` completely.
    ///
    /// Short reads from the transport are retried; only end-of-stream before
    /// the buffer is full fails, with [`TransportError::IncompleteRead`].
    pub fn read(&self, buf: &mut [u8]) -> TransportResult<usize> {
        self.ensure_open()?;
        let mut half = self.reader.lock();
        self.ensure_open()?;

        let mut inbound = half.inbound(&self.channel);
        let mut filled = 0;
        while filled < buf.len() {
            match inbound.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(self.fail(TransportError::IncompleteRead {
                        expected: buf.len(),
                        received: filled,
                    }))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(e.into())),
            }
        }
        Ok(filled)
    }

    /// Read one byte. `None` means the peer ended the stream.
    pub fn read_byte(&self) -> TransportResult<Option<u8>> {
        self.ensure_open()?;
        let mut half = self.reader.lock();
        self.ensure_open()?;

        let mut inbound = half.inbound(&self.channel);
        let mut byte = [0u8; 1];
        loop {
            match inbound.read(&mut byte) {
                Ok(0) => {
                    self.ensure_open()?;
                    return Ok(None);
                }
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(e.into())),
            }
        }
    }

    /// Read the opening-handshake header block as ordered lines.
    ///
    /// The stream is left positioned at the first byte after the blank line.
    pub fn read_handshake_lines(&self) -> TransportResult<Vec<String>> {
        self.ensure_open()?;
        let mut half = self.reader.lock();
        self.ensure_open()?;

        let previous_timeout = match self.handshake_timeout {
            Some(timeout) => {
                let previous = half.socket.read_timeout()?;
                half.socket.set_read_timeout(Some(timeout))?;
                Some(previous)
            }
            None => None,
        };

        let result = read_header_block(&mut half.inbound(&self.channel), self.limits);

        if let Some(previous) = previous_timeout {
            if let Err(e) = half.socket.set_read_timeout(previous) {
                tracing::warn!(connection_id = %self.id, error = %e, "Failed to restore read timeout");
            }
        }

        match result {
            Ok(lines) => {
                tracing::debug!(
                    connection_id = %self.id,
                    role = %self.role,
                    lines = lines.len(),
                    "Handshake header block read"
                );
                Ok(lines)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Parse one frame from the stream with `F`'s codec.
    pub fn read_frame<F: Frame>(&self) -> TransportResult<F> {
        self.ensure_open()?;
        let mut half = self.reader.lock();
        self.ensure_open()?;

        let mut inbound = half.inbound(&self.channel);
        F::parse(&mut inbound).map_err(|e: FrameFormatError| self.fail(e.into()))
    }

    /// Write all of `buf`.
    pub fn write(&self, buf: &[u8]) -> TransportResult<()> {
        self.ensure_open()?;
        let mut half = self.writer.lock();
        self.ensure_open()?;

        half.write_all(&self.channel, buf)
            .map_err(|e| self.fail(e.into()))
    }

    pub fn write_byte(&self, byte: u8) -> TransportResult<()> {
        self.write(&[byte])
    }

    pub fn write_frame<F: Frame>(&self, frame: &F) -> TransportResult<()> {
        self.write(&frame.to_bytes())
    }

    pub fn write_handshake<H: Handshake + ?Sized>(&self, handshake: &H) -> TransportResult<()> {
        self.write(&handshake.to_bytes())
    }

    /// Whether bytes can be read right now without blocking.
    ///
    /// Never waits: returns `false` while another caller holds either
    /// direction, since probing the socket must not race their I/O. On
    /// encrypted channels only decrypted application data counts.
    pub fn data_available(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.channel.has_buffered_plaintext() {
            return true;
        }
        let Some(mut half) = self.reader.try_lock() else {
            return false;
        };
        let Some(_writer) = self.writer.try_lock() else {
            return false;
        };
        match &self.channel {
            Channel::Plain => socket_has_data(&half.socket),
            Channel::Encrypted(session) => half.poll_encrypted(session),
        }
    }

    /// Close the connection. Repeated calls are no-ops.
    ///
    /// Safe to call while another thread is blocked in a read or write; that
    /// operation returns [`TransportError::ResourceClosed`].
    pub fn close(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Channel::Encrypted(session) = &self.channel {
            // Skip close_notify rather than wait behind an in-flight write.
            if let Some(mut half) = self.writer.try_lock() {
                if let Err(e) = half.send_close_notify(session) {
                    tracing::debug!(connection_id = %self.id, error = %e, "close_notify not delivered");
                }
            }
        }

        match self.control.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => return Err(TransportError::Io(e)),
        }

        tracing::trace!(connection_id = %self.id, role = %self.role, "Connection closed");
        Ok(())
    }
}

impl Drop for TransportConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConnection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("mode", &self.security_mode())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn connection_id_display() {
        let id = ConnectionId(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::Client.to_string(), "client");
        assert_eq!(Role::Server.to_string(), "server");
    }
}
