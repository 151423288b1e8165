//! Shared utilities for transport integration tests.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread;

use ws_transport::config::{SecurityModeSetting, ServerTlsConfig};
use ws_transport::{ConnectionFactory, Frame, FrameFormatError, TransportConfig, TransportConnection};

/// Bind an ephemeral loopback listener.
pub fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

pub fn plain_config() -> TransportConfig {
    let mut config = TransportConfig::default();
    config.security.mode = SecurityModeSetting::Plain;
    config
}

/// A connected client/server pair over plain TCP.
pub fn plain_pair() -> (TransportConnection, TransportConnection) {
    let factory = ConnectionFactory::new(plain_config());
    let (listener, port) = listener();

    let client = factory.connect_as_client("127.0.0.1", port).unwrap();
    let (stream, _) = listener.accept().unwrap();
    let server = factory.accept_as_server(stream).unwrap();
    (client, server)
}

/// A raw peer socket connected to a server-side transport connection.
#[allow(dead_code)]
pub fn raw_peer(config: TransportConfig) -> (TcpStream, TransportConnection) {
    let factory = ConnectionFactory::new(config);
    let (listener, port) = listener();

    let peer = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let (stream, _) = listener.accept().unwrap();
    let server = factory.accept_as_server(stream).unwrap();
    (peer, server)
}

/// Throwaway self-signed certificate for `localhost`, written as PEM files.
#[allow(dead_code)]
pub struct TestCert {
    _dir: tempfile::TempDir,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[allow(dead_code)]
impl TestCert {
    pub fn generate() -> Self {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("server.pem");
        let key_path = dir.path().join("server.key");
        std::fs::write(&cert_path, generated.cert.pem()).unwrap();
        std::fs::write(&key_path, generated.key_pair.serialize_pem()).unwrap();
        Self {
            _dir: dir,
            cert_path,
            key_path,
        }
    }

    pub fn server_tls(&self) -> ServerTlsConfig {
        ServerTlsConfig {
            cert_path: self.cert_path.to_string_lossy().into_owned(),
            key_path: self.key_path.to_string_lossy().into_owned(),
        }
    }

    /// Encrypted config that serves this cert and trusts it as a root.
    pub fn config(&self) -> TransportConfig {
        let mut config = TransportConfig::default();
        config.security.mode = SecurityModeSetting::Encrypted;
        config.tls.server = Some(self.server_tls());
        config.tls.extra_roots_path = Some(self.cert_path.to_string_lossy().into_owned());
        config
    }
}

/// A connected client/server pair over TLS.
///
/// The server handshake runs on a helper thread while the client connects.
#[allow(dead_code)]
pub fn tls_pair(
    server_factory: ConnectionFactory,
    client_factory: &ConnectionFactory,
) -> (TransportConnection, TransportConnection) {
    let (listener, port) = listener();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        server_factory.accept_as_server(stream).unwrap()
    });

    let client = client_factory.connect_as_client("localhost", port).unwrap();
    let server = server.join().unwrap();
    (client, server)
}

/// Minimal length-prefixed frame: 2-byte big-endian length, then payload.
/// A length of `0xFFFF` is rejected as malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub struct TestFrame(pub Vec<u8>);

impl Frame for TestFrame {
    fn parse(source: &mut dyn Read) -> Result<Self, FrameFormatError> {
        let mut len = [0u8; 2];
        source.read_exact(&mut len)?;
        let len = u16::from_be_bytes(len);
        if len == u16::MAX {
            return Err(FrameFormatError::Malformed("reserved length".to_string()));
        }
        let mut payload = vec![0u8; len as usize];
        source.read_exact(&mut payload)?;
        Ok(TestFrame(payload))
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = (self.0.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(&self.0);
        out
    }
}
