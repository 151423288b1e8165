//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound (host, port) / accepted TcpStream / listener-resolved stream
//!     → security.rs (plain vs. encrypted decision)
//!     → tls.rs (client/server TLS configuration, certificate loading)
//!     → factory.rs (connect/accept, optional TLS handshake)
//!     → connection.rs (locked read/write surface)
//!         → handshake.rs (header block extraction)
//!         → stream.rs (per-direction halves over plain or TLS)
//! ```
//!
//! # Design Decisions
//! - Security mode is an enum fixed at construction, never inspected at runtime
//! - One lock per direction; a read never blocks a write
//! - Close is idempotent and unblocks in-flight operations

pub mod connection;
pub mod factory;
pub mod handshake;
pub mod security;
pub(crate) mod stream;
pub mod tls;

pub use connection::{ConnectionId, Role, TransportConnection};
pub use factory::{ConnectionFactory, ResolvedStream};
pub use security::{SecurityContext, SecurityMode, SecurityModeSelector};
pub use tls::CertificatePolicy;
