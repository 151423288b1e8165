//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, limits, deadlines)
//! - Reject empty certificate paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TransportConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::TransportConfig;

/// The smallest header block that can hold the terminator.
const MIN_HEADER_BYTES: usize = 4;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &TransportConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.security.secure_port == 0 {
        errors.push(ValidationError::new("security.secure_port", "must be non-zero"));
    }

    if config.handshake.max_header_bytes < MIN_HEADER_BYTES {
        errors.push(ValidationError::new(
            "handshake.max_header_bytes",
            format!("must be at least {MIN_HEADER_BYTES}"),
        ));
    }

    if config.handshake.read_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            "handshake.read_timeout_ms",
            "must be non-zero when set",
        ));
    }

    if let Some(path) = &config.tls.extra_roots_path {
        if path.trim().is_empty() {
            errors.push(ValidationError::new("tls.extra_roots_path", "must not be empty"));
        }
    }

    if let Some(server) = &config.tls.server {
        if server.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("tls.server.cert_path", "must not be empty"));
        }
        if server.key_path.trim().is_empty() {
            errors.push(ValidationError::new("tls.server.key_path", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
