//! Per-direction halves of a transport connection.
//!
//! The socket is cloned so that reading and writing never share a handle.
//! On encrypted channels the rustls session is shared between the halves,
//! but the session lock is only taken to move bytes in and out of rustls,
//! never across a blocking socket call.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use parking_lot::Mutex;

use crate::net::security::SecurityMode;

/// Size of a single ciphertext read from the socket.
const TLS_READ_CHUNK: usize = 16 * 1024;

/// The transport variant, fixed at construction.
pub(crate) enum Channel {
    Plain,
    Encrypted(Mutex<rustls::Connection>),
}

impl Channel {
    pub(crate) fn new(session: Option<rustls::Connection>) -> Self {
        match session {
            Some(conn) => Channel::Encrypted(Mutex::new(conn)),
            None => Channel::Plain,
        }
    }

    pub(crate) fn mode(&self) -> SecurityMode {
        match self {
            Channel::Plain => SecurityMode::Plain,
            Channel::Encrypted(_) => SecurityMode::Encrypted,
        }
    }

    /// Whether the session already holds decrypted bytes.
    pub(crate) fn has_buffered_plaintext(&self) -> bool {
        match self {
            Channel::Plain => false,
            Channel::Encrypted(session) => plaintext_ready(&mut session.lock()),
        }
    }
}

/// Reading side: owns the socket clone used for reads.
///
/// On encrypted channels `scratch[pos..end]` is ciphertext already taken off
/// the socket but not yet handed to rustls. It is fed one `read_tls` at a
/// time so the session's plaintext buffer never overflows.
pub(crate) struct ReadHalf {
    pub(crate) socket: TcpStream,
    scratch: Box<[u8]>,
    pos: usize,
    end: usize,
}

impl ReadHalf {
    pub(crate) fn new(socket: TcpStream, mode: SecurityMode) -> Self {
        let scratch = match mode {
            SecurityMode::Plain => Box::default(),
            SecurityMode::Encrypted => vec![0u8; TLS_READ_CHUNK].into_boxed_slice(),
        };
        Self {
            socket,
            scratch,
            pos: 0,
            end: 0,
        }
    }

    /// Borrow the half as an unbuffered byte source.
    pub(crate) fn inbound<'a>(&'a mut self, channel: &'a Channel) -> Inbound<'a> {
        Inbound {
            half: self,
            channel,
        }
    }

    fn has_pending_ciphertext(&self) -> bool {
        self.pos < self.end
    }

    /// Hand one slice of saved ciphertext to rustls and decrypt it.
    ///
    /// Only called while the session holds no plaintext.
    fn feed_pending(&mut self, conn: &mut rustls::Connection) -> io::Result<()> {
        let mut incoming = &self.scratch[self.pos..self.end];
        let consumed = conn.read_tls(&mut incoming)?;
        self.pos += consumed;
        process(conn)
    }

    /// Tell rustls the socket reached end-of-stream.
    fn feed_eof(conn: &mut rustls::Connection) -> io::Result<()> {
        let mut empty: &[u8] = &[];
        conn.read_tls(&mut empty)?;
        process(conn)
    }

    fn read_encrypted(
        &mut self,
        session: &Mutex<rustls::Connection>,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        loop {
            {
                let mut conn = session.lock();
                match conn.reader().read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    // Peer dropped TCP without close_notify.
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(0),
                    Err(e) => return Err(e),
                }
                if self.has_pending_ciphertext() {
                    self.feed_pending(&mut conn)?;
                    continue;
                }
            }

            let n = loop {
                match self.socket.read(&mut self.scratch) {
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    other => break other?,
                }
            };

            if n == 0 {
                Self::feed_eof(&mut session.lock())?;
            } else {
                self.pos = 0;
                self.end = n;
            }
        }
    }

    /// Whether application data can be read from an encrypted channel
    /// without blocking.
    ///
    /// Drains whatever ciphertext the socket already holds, so records that
    /// carry no application data (session tickets, key updates) are not
    /// mistaken for readable bytes. Toggles the shared non-blocking flag;
    /// callers must hold both halves.
    pub(crate) fn poll_encrypted(&mut self, session: &Mutex<rustls::Connection>) -> bool {
        if self.socket.set_nonblocking(true).is_err() {
            return false;
        }
        let ready = self.drain_ready(session).unwrap_or(false);
        if let Err(e) = self.socket.set_nonblocking(false) {
            tracing::warn!(error = %e, "Failed to restore blocking mode after probe");
        }
        ready
    }

    fn drain_ready(&mut self, session: &Mutex<rustls::Connection>) -> io::Result<bool> {
        loop {
            {
                let mut conn = session.lock();
                if plaintext_ready(&mut conn) {
                    return Ok(true);
                }
                if self.has_pending_ciphertext() {
                    self.feed_pending(&mut conn)?;
                    continue;
                }
            }

            match self.socket.read(&mut self.scratch) {
                Ok(0) => {
                    Self::feed_eof(&mut session.lock())?;
                    return Ok(false);
                }
                Ok(n) => {
                    self.pos = 0;
                    self.end = n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
    }
}

fn process(conn: &mut rustls::Connection) -> io::Result<()> {
    conn.process_new_packets()
        .map(|_| ())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn plaintext_ready(conn: &mut rustls::Connection) -> bool {
    conn.process_new_packets()
        .map(|state| state.plaintext_bytes_to_read() > 0)
        .unwrap_or(false)
}

/// Unbuffered inbound byte source handed to the handshake reader and frame codecs.
pub(crate) struct Inbound<'a> {
    half: &'a mut ReadHalf,
    channel: &'a Channel,
}

impl Read for Inbound<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.channel {
            Channel::Plain => self.half.socket.read(buf),
            Channel::Encrypted(session) => self.half.read_encrypted(session, buf),
        }
    }
}

/// Writing side: owns the socket clone used for writes.
///
/// Only this half ever writes to the socket, which keeps TLS records in order.
pub(crate) struct WriteHalf {
    pub(crate) socket: TcpStream,
}

impl WriteHalf {
    pub(crate) fn new(socket: TcpStream) -> Self {
        Self { socket }
    }

    /// Blocking full write followed by a flush.
    pub(crate) fn write_all(&mut self, channel: &Channel, data: &[u8]) -> io::Result<()> {
        match channel {
            Channel::Plain => self.socket.write_all(data)?,
            Channel::Encrypted(session) => {
                let records = {
                    let mut conn = session.lock();
                    encrypt(&mut conn, data)?
                };
                self.socket.write_all(&records)?;
            }
        }
        self.socket.flush()
    }

    /// Queue and send a TLS close_notify alert.
    pub(crate) fn send_close_notify(&mut self, session: &Mutex<rustls::Connection>) -> io::Result<()> {
        let records = {
            let mut conn = session.lock();
            conn.send_close_notify();
            drain_records(&mut conn)?
        };
        self.socket.write_all(&records)
    }
}

/// Encrypt `data` and return every record the session wants to send.
fn encrypt(conn: &mut rustls::Connection, data: &[u8]) -> io::Result<Vec<u8>> {
    let mut records = Vec::with_capacity(data.len() + 64);
    let mut rest = data;
    while !rest.is_empty() {
        let n = conn.writer().write(rest)?;
        rest = &rest[n..];
        if n == 0 && !conn.wants_write() {
            return Err(io::ErrorKind::WriteZero.into());
        }
        while conn.wants_write() {
            conn.write_tls(&mut records)?;
        }
    }
    // Also drains records queued by the read side (alerts, key updates).
    while conn.wants_write() {
        conn.write_tls(&mut records)?;
    }
    Ok(records)
}

fn drain_records(conn: &mut rustls::Connection) -> io::Result<Vec<u8>> {
    let mut records = Vec::new();
    while conn.wants_write() {
        conn.write_tls(&mut records)?;
    }
    Ok(records)
}

/// Non-blocking check for bytes waiting on the socket.
///
/// Toggles the socket's non-blocking flag, which is shared by every clone;
/// callers must hold both halves so no other operation observes it.
pub(crate) fn socket_has_data(socket: &TcpStream) -> bool {
    if socket.set_nonblocking(true).is_err() {
        return false;
    }
    let mut probe = [0u8; 1];
    let ready = matches!(socket.peek(&mut probe), Ok(n) if n > 0);
    if let Err(e) = socket.set_nonblocking(false) {
        tracing::warn!(error = %e, "Failed to restore blocking mode after probe");
    }
    ready
}
