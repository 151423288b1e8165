//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the transport.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::security::SecurityMode;

/// Root configuration for the transport layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    /// Plain vs. encrypted selection.
    pub security: SecurityConfig,

    /// Certificates and peer validation.
    pub tls: TlsConfig,

    /// Handshake header block limits.
    pub handshake: HandshakeConfig,

    /// Socket options applied to every connection.
    pub socket: SocketConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// How the security mode of a connection is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityModeSetting {
    /// Fall back to the port heuristic (`secure_port` ⇒ encrypted).
    #[default]
    Auto,
    Plain,
    Encrypted,
}

impl SecurityModeSetting {
    /// The explicitly configured mode, if any.
    pub fn explicit(self) -> Option<SecurityMode> {
        match self {
            SecurityModeSetting::Auto => None,
            SecurityModeSetting::Plain => Some(SecurityMode::Plain),
            SecurityModeSetting::Encrypted => Some(SecurityMode::Encrypted),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub mode: SecurityModeSetting,

    /// Port treated as encrypted when `mode = "auto"`.
    pub secure_port: u16,
}

impl SecurityConfig {
    pub fn explicit_mode(&self) -> Option<SecurityMode> {
        self.mode.explicit()
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            mode: SecurityModeSetting::Auto,
            secure_port: 443,
        }
    }
}

/// Server certificate validation applied by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum VerificationMode {
    /// Full chain and hostname verification.
    #[default]
    #[serde(rename = "webpki")]
    WebPki,

    /// Accept any server certificate. Testing only.
    #[serde(rename = "accept_all_certificates")]
    AcceptAllCertificates,
}

/// TLS configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    pub verification: VerificationMode,

    /// Additional trust roots (PEM), appended to the bundled web roots.
    pub extra_roots_path: Option<String>,

    /// Certificate used when acting as a secure server.
    pub server: Option<ServerTlsConfig>,
}

/// Server certificate and key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerTlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Handshake header block limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Maximum size of the header block, terminator included.
    pub max_header_bytes: usize,

    /// Read deadline for the header block in milliseconds. Unset means no deadline.
    pub read_timeout_ms: Option<u64>,
}

impl HandshakeConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 8 * 1024,
            read_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
