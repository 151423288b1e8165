//! Connection establishment.
//!
//! # Responsibilities
//! - Open outbound TCP connections and accept inbound ones
//! - Pick plain vs. encrypted via the [`SecurityModeSelector`]
//! - Run the TLS client or server handshake when encrypted
//! - Wrap streams an upstream listener already secured
//!
//! No retries: the first failure is returned to the caller.

use std::io;
use std::net::TcpStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustls::{ClientConfig, ClientConnection, ConnectionCommon, ServerConfig, ServerConnection, StreamOwned};

use crate::config::{SecurityModeSetting, TransportConfig, VerificationMode};
use crate::error::{ConnectionError, TransportError, TransportResult};
use crate::net::connection::{Role, TransportConnection};
use crate::net::security::{ModeDecision, ModeSource, SecurityContext, SecurityMode, SecurityModeSelector};
use crate::net::tls::{self, CertificatePolicy};

/// A server-side stream whose TLS state was settled by an upstream listener.
pub enum ResolvedStream {
    Plain(TcpStream),
    Tls(StreamOwned<ServerConnection, TcpStream>),
}

impl ResolvedStream {
    pub fn security_mode(&self) -> SecurityMode {
        match self {
            ResolvedStream::Plain(_) => SecurityMode::Plain,
            ResolvedStream::Tls(_) => SecurityMode::Encrypted,
        }
    }
}

/// Produces [`TransportConnection`]s.
///
/// TLS configurations are built on first use and cached, so a missing or
/// broken server certificate only fails connections that need it.
pub struct ConnectionFactory {
    config: Arc<TransportConfig>,
    selector: SecurityModeSelector,
    policy: CertificatePolicy,
    client_tls: Mutex<Option<Arc<ClientConfig>>>,
    server_tls: Mutex<Option<Arc<ServerConfig>>>,
    heuristic_warned: AtomicBool,
}

impl ConnectionFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<TransportConfig>) -> Self {
        if config.security.mode == SecurityModeSetting::Encrypted
            && config.tls.verification == VerificationMode::AcceptAllCertificates
        {
            tracing::warn!("Encrypted mode configured without server certificate validation");
        }
        Self {
            selector: SecurityModeSelector::from_config(&config.security),
            policy: CertificatePolicy::from(config.tls.verification),
            config,
            client_tls: Mutex::new(None),
            server_tls: Mutex::new(None),
            heuristic_warned: AtomicBool::new(false),
        }
    }

    /// Replace the certificate validation policy used by clients.
    pub fn with_certificate_policy(mut self, policy: CertificatePolicy) -> Self {
        self.policy = policy;
        *self.client_tls.get_mut() = None;
        self
    }

    /// Use a prebuilt server TLS configuration instead of the configured PEM files.
    pub fn with_server_tls(mut self, server: Arc<ServerConfig>) -> Self {
        *self.server_tls.get_mut() = Some(server);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn selector(&self) -> SecurityModeSelector {
        self.selector
    }

    /// Connect to `host:port`, upgrading to TLS when the selector says so.
    pub fn connect_as_client(&self, host: &str, port: u16) -> Result<TransportConnection, ConnectionError> {
        self.connect(host, port, None)
    }

    /// Connect with a mode the caller already decided.
    pub fn connect_as_client_with_mode(
        &self,
        host: &str,
        port: u16,
        mode: SecurityMode,
    ) -> Result<TransportConnection, ConnectionError> {
        self.connect(host, port, Some(mode))
    }

    fn connect(
        &self,
        host: &str,
        port: u16,
        resolved: Option<SecurityMode>,
    ) -> Result<TransportConnection, ConnectionError> {
        let decision = self.decide(SecurityContext { port, resolved });
        let addr = format!("{}:{}", host, port);

        let mut tcp = TcpStream::connect((host, port)).map_err(|source| ConnectionError::Connect {
            addr: addr.clone(),
            source,
        })?;
        self.apply_socket_options(&tcp)?;

        let session = match decision.mode {
            SecurityMode::Plain => None,
            SecurityMode::Encrypted => {
                let mut conn = ClientConnection::new(self.client_config()?, tls::server_name(host)?)?;
                drive_handshake(&mut *conn, &mut tcp)?;
                Some(rustls::Connection::from(conn))
            }
        };

        let connection = TransportConnection::new(Role::Client, tcp, session, &self.config.handshake)?;
        tracing::info!(
            connection_id = %connection.id(),
            peer_addr = %addr,
            mode = %decision.mode,
            role = %Role::Client,
            "Connection established"
        );
        Ok(connection)
    }

    /// Wrap an accepted socket, running the TLS server handshake if the
    /// local port calls for encryption.
    pub fn accept_as_server(&self, stream: TcpStream) -> Result<TransportConnection, ConnectionError> {
        let mut tcp = stream;
        let local_port = tcp.local_addr()?.port();
        let decision = self.decide(SecurityContext::port(local_port));
        self.apply_socket_options(&tcp)?;

        let session = match decision.mode {
            SecurityMode::Plain => None,
            SecurityMode::Encrypted => {
                let mut conn = ServerConnection::new(self.server_config()?)?;
                drive_handshake(&mut *conn, &mut tcp)?;
                Some(rustls::Connection::from(conn))
            }
        };

        let connection = TransportConnection::new(Role::Server, tcp, session, &self.config.handshake)?;
        self.log_accepted(&connection);
        Ok(connection)
    }

    /// Wrap a stream an upstream listener already accepted and secured.
    ///
    /// Fails with [`TransportError::InvalidArgument`] when `is_secure`
    /// disagrees with the stream's actual kind. No handshake is performed.
    pub fn accept_from_resolved_context(
        &self,
        stream: ResolvedStream,
        is_secure: bool,
    ) -> TransportResult<TransportConnection> {
        let reported = SecurityMode::from_secure_flag(is_secure);
        let actual = stream.security_mode();
        if reported != actual {
            return Err(TransportError::InvalidArgument(format!(
                "listener reported a {} connection but the stream is {}",
                reported, actual
            )));
        }

        let (tcp, session) = match stream {
            ResolvedStream::Plain(tcp) => (tcp, None),
            ResolvedStream::Tls(StreamOwned { conn, sock }) => (sock, Some(rustls::Connection::from(conn))),
        };
        self.apply_socket_options(&tcp)?;

        let connection = TransportConnection::new(Role::Server, tcp, session, &self.config.handshake)?;
        self.log_accepted(&connection);
        Ok(connection)
    }

    fn decide(&self, context: SecurityContext) -> ModeDecision {
        let decision = self.selector.decide(context);
        if decision.source == ModeSource::PortHeuristic && !self.heuristic_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                port = context.port,
                mode = %decision.mode,
                "Security mode inferred from port number; set security.mode explicitly"
            );
        }
        decision
    }

    fn apply_socket_options(&self, tcp: &TcpStream) -> io::Result<()> {
        tcp.set_nodelay(self.config.socket.nodelay)
    }

    fn log_accepted(&self, connection: &TransportConnection) {
        let peer = connection
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        tracing::info!(
            connection_id = %connection.id(),
            peer_addr = %peer,
            mode = %connection.security_mode(),
            role = %Role::Server,
            "Connection established"
        );
    }

    fn client_config(&self) -> Result<Arc<ClientConfig>, ConnectionError> {
        let mut cached = self.client_tls.lock();
        if let Some(config) = cached.as_ref() {
            return Ok(Arc::clone(config));
        }
        let extra_roots = self.config.tls.extra_roots_path.as_deref().map(Path::new);
        let config = tls::build_client_config(&self.policy, extra_roots)?;
        *cached = Some(Arc::clone(&config));
        Ok(config)
    }

    fn server_config(&self) -> Result<Arc<ServerConfig>, ConnectionError> {
        let mut cached = self.server_tls.lock();
        if let Some(config) = cached.as_ref() {
            return Ok(Arc::clone(config));
        }
        let server = self.config.tls.server.as_ref().ok_or_else(|| {
            ConnectionError::Certificate("no server certificate configured (tls.server)".to_string())
        })?;
        let config = tls::load_server_config(server)?;
        *cached = Some(Arc::clone(&config));
        Ok(config)
    }
}

/// Run the TLS handshake to completion over `tcp`.
fn drive_handshake<D>(conn: &mut ConnectionCommon<D>, tcp: &mut TcpStream) -> Result<(), ConnectionError> {
    while conn.is_handshaking() {
        conn.complete_io(tcp).map_err(handshake_error)?;
    }
    while conn.wants_write() {
        conn.write_tls(tcp)?;
    }
    Ok(())
}

/// Recover the rustls error rustls wraps in an `io::Error` during `complete_io`.
fn handshake_error(err: io::Error) -> ConnectionError {
    match err.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()) {
        Some(tls_err) => ConnectionError::Tls(tls_err.clone()),
        None => ConnectionError::Io(err),
    }
}
