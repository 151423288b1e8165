//! TLS configuration and certificate loading.
//!
//! Server material is read from PEM files. Client-side server certificate
//! validation is chosen through [`CertificatePolicy`]; the default verifies the
//! full chain and the host name.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};

use crate::config::{ServerTlsConfig, VerificationMode};
use crate::error::ConnectionError;

/// How a client validates the server's certificate.
#[derive(Debug, Clone, Default)]
pub enum CertificatePolicy {
    /// Chain to a trusted root and match the host name.
    #[default]
    WebPki,
    /// Accept any certificate. Only for testing against throwaway certs.
    AcceptAllCertificates,
    /// Caller-supplied verifier.
    Custom(Arc<dyn ServerCertVerifier>),
}

impl From<VerificationMode> for CertificatePolicy {
    fn from(mode: VerificationMode) -> Self {
        match mode {
            VerificationMode::WebPki => CertificatePolicy::WebPki,
            VerificationMode::AcceptAllCertificates => CertificatePolicy::AcceptAllCertificates,
        }
    }
}

fn open_pem(path: &Path, what: &str) -> Result<BufReader<File>, ConnectionError> {
    if !path.exists() {
        return Err(ConnectionError::Certificate(format!(
            "{} file not found: {:?}",
            what, path
        )));
    }
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ConnectionError::Certificate(format!("cannot open {:?}: {}", path, e)))
}

/// Load every certificate in a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConnectionError> {
    let mut reader = open_pem(path, "Certificate")?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectionError::Certificate(format!("invalid PEM in {:?}: {}", path, e)))?;

    if certs.is_empty() {
        return Err(ConnectionError::Certificate(format!(
            "no certificates found in {:?}",
            path
        )));
    }
    Ok(certs)
}

/// Load the first private key in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConnectionError> {
    let mut reader = open_pem(path, "Private key")?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ConnectionError::Certificate(format!("invalid PEM in {:?}: {}", path, e)))?
        .ok_or_else(|| ConnectionError::Certificate(format!("no private key found in {:?}", path)))
}

/// Build the server-side TLS configuration from certificate and key files.
pub fn load_server_config(config: &ServerTlsConfig) -> Result<Arc<ServerConfig>, ConnectionError> {
    let certs = load_certs(Path::new(&config.cert_path))?;
    let key = load_private_key(Path::new(&config.key_path))?;

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ConnectionError::Certificate(format!("certificate/key mismatch: {}", e)))?;

    tracing::debug!(cert_path = %config.cert_path, "Server certificate loaded");
    Ok(Arc::new(server_config))
}

/// Build the client-side TLS configuration for a validation policy.
///
/// `extra_roots` is only consulted by [`CertificatePolicy::WebPki`].
pub fn build_client_config(
    policy: &CertificatePolicy,
    extra_roots: Option<&Path>,
) -> Result<Arc<ClientConfig>, ConnectionError> {
    let config = match policy {
        CertificatePolicy::WebPki => {
            let mut roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            if let Some(path) = extra_roots {
                for cert in load_certs(path)? {
                    roots.add(cert).map_err(|e| {
                        ConnectionError::Certificate(format!("invalid trust root in {:?}: {}", path, e))
                    })?;
                }
            }
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        }
        CertificatePolicy::AcceptAllCertificates => {
            tracing::warn!("Server certificate validation is disabled (accept_all_certificates)");
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAllCertificates))
                .with_no_client_auth()
        }
        CertificatePolicy::Custom(verifier) => ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::clone(verifier))
            .with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

/// Parse a host name or IP literal into a TLS server name.
pub fn server_name(host: &str) -> Result<ServerName<'static>, ConnectionError> {
    ServerName::try_from(host.to_string())
        .map_err(|_| ConnectionError::InvalidServerName(host.to_string()))
}

/// A `ServerCertVerifier` that accepts any certificate without validation.
///
/// Handshake signatures are still verified, so the session is encrypted and
/// bound to the presented key; only the identity check is skipped.
#[derive(Debug)]
pub struct AcceptAllCertificates;

impl ServerCertVerifier for AcceptAllCertificates {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_certificate_file() {
        let err = load_certs(Path::new("/nonexistent/server.pem")).unwrap_err();
        assert!(err.to_string().contains("Certificate file not found"));
    }

    #[test]
    fn file_without_certificates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let err = load_certs(file.path()).unwrap_err();
        assert!(matches!(err, ConnectionError::Certificate(_)));
    }

    #[test]
    fn loads_generated_material() {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, generated.cert.pem()).unwrap();
        std::fs::write(&key_path, generated.key_pair.serialize_pem()).unwrap();

        let config = ServerTlsConfig {
            cert_path: cert_path.to_string_lossy().into_owned(),
            key_path: key_path.to_string_lossy().into_owned(),
        };
        assert!(load_server_config(&config).is_ok());
        assert!(build_client_config(&CertificatePolicy::WebPki, Some(&cert_path)).is_ok());
    }

    #[test]
    fn policy_from_verification_mode() {
        assert!(matches!(
            CertificatePolicy::from(VerificationMode::AcceptAllCertificates),
            CertificatePolicy::AcceptAllCertificates
        ));
        assert!(matches!(
            CertificatePolicy::from(VerificationMode::WebPki),
            CertificatePolicy::WebPki
        ));
    }

    #[test]
    fn rejects_invalid_server_name() {
        assert!(server_name("localhost").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(matches!(
            server_name("not a host"),
            Err(ConnectionError::InvalidServerName(_))
        ));
    }
}
