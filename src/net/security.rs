//! Security mode selection.
//!
//! Decides whether a connection attempt runs over plain TCP or TLS. Rules, in
//! order of precedence:
//! 1. a mode already resolved by the caller (e.g. a listener that performed the upgrade)
//! 2. the mode set in configuration
//! 3. the port heuristic: the configured secure port is encrypted, anything else is plain
//!
//! The port heuristic is kept as a fallback for `mode = "auto"` only.

use crate::config::SecurityConfig;

/// Whether a connection's bytes are encrypted in transit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityMode {
    Plain,
    Encrypted,
}

impl SecurityMode {
    pub fn from_secure_flag(is_secure: bool) -> Self {
        if is_secure {
            SecurityMode::Encrypted
        } else {
            SecurityMode::Plain
        }
    }

    pub fn is_encrypted(self) -> bool {
        self == SecurityMode::Encrypted
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityMode::Plain => f.write_str("plain"),
            SecurityMode::Encrypted => f.write_str("encrypted"),
        }
    }
}

/// Inputs to a single selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityContext {
    /// Destination port (outbound) or local accept port (inbound).
    pub port: u16,
    /// Mode already decided upstream, if any.
    pub resolved: Option<SecurityMode>,
}

impl SecurityContext {
    pub fn port(port: u16) -> Self {
        Self { port, resolved: None }
    }

    pub fn resolved(port: u16, mode: SecurityMode) -> Self {
        Self {
            port,
            resolved: Some(mode),
        }
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSource {
    Resolved,
    Configured,
    PortHeuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDecision {
    pub mode: SecurityMode,
    pub source: ModeSource,
}

/// Pure plain/encrypted selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityModeSelector {
    configured: Option<SecurityMode>,
    secure_port: u16,
}

impl SecurityModeSelector {
    /// Default secure port for the heuristic.
    pub const DEFAULT_SECURE_PORT: u16 = 443;

    pub fn new(configured: Option<SecurityMode>, secure_port: u16) -> Self {
        Self {
            configured,
            secure_port,
        }
    }

    /// Selector that only ever applies the port heuristic.
    pub fn port_heuristic() -> Self {
        Self::new(None, Self::DEFAULT_SECURE_PORT)
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.explicit_mode(), config.secure_port)
    }

    pub fn select(&self, context: SecurityContext) -> SecurityMode {
        self.decide(context).mode
    }

    pub fn decide(&self, context: SecurityContext) -> ModeDecision {
        if let Some(mode) = context.resolved {
            return ModeDecision {
                mode,
                source: ModeSource::Resolved,
            };
        }
        if let Some(mode) = self.configured {
            return ModeDecision {
                mode,
                source: ModeSource::Configured,
            };
        }
        ModeDecision {
            mode: SecurityMode::from_secure_flag(context.port == self.secure_port),
            source: ModeSource::PortHeuristic,
        }
    }
}

impl Default for SecurityModeSelector {
    fn default() -> Self {
        Self::port_heuristic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_443_is_encrypted() {
        let selector = SecurityModeSelector::default();
        assert_eq!(selector.select(SecurityContext::port(443)), SecurityMode::Encrypted);
    }

    #[test]
    fn other_ports_are_plain() {
        let selector = SecurityModeSelector::default();
        for port in [80, 8080, 8443, 0, 65535] {
            assert_eq!(selector.select(SecurityContext::port(port)), SecurityMode::Plain);
        }
    }

    #[test]
    fn resolved_flag_always_wins() {
        let selectors = [
            SecurityModeSelector::default(),
            SecurityModeSelector::new(Some(SecurityMode::Plain), 443),
            SecurityModeSelector::new(Some(SecurityMode::Encrypted), 443),
        ];
        for selector in selectors {
            for port in [443, 80] {
                for mode in [SecurityMode::Plain, SecurityMode::Encrypted] {
                    let decision = selector.decide(SecurityContext::resolved(port, mode));
                    assert_eq!(decision.mode, mode);
                    assert_eq!(decision.source, ModeSource::Resolved);
                }
            }
        }
    }

    #[test]
    fn configured_mode_beats_port() {
        let selector = SecurityModeSelector::new(Some(SecurityMode::Plain), 443);
        let decision = selector.decide(SecurityContext::port(443));
        assert_eq!(decision.mode, SecurityMode::Plain);
        assert_eq!(decision.source, ModeSource::Configured);
    }

    #[test]
    fn custom_secure_port() {
        let selector = SecurityModeSelector::new(None, 8443);
        assert_eq!(selector.select(SecurityContext::port(8443)), SecurityMode::Encrypted);
        assert_eq!(selector.select(SecurityContext::port(443)), SecurityMode::Plain);
    }
}
