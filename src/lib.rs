//! Transport layer for WebSocket-style connections.
//!
//! Opens plain or TLS byte streams, extracts the opening-handshake header
//! block, and exposes a read/write surface with one lock per direction.
//! Frame and handshake encoding are left to the [`codec`] traits.

pub mod codec;
pub mod config;
pub mod error;
pub mod net;
pub mod observability;

pub use codec::{Frame, FrameFormatError, Handshake, HandshakeLines};
pub use config::TransportConfig;
pub use error::{ConnectionError, TransportError, TransportResult};
pub use net::{ConnectionFactory, Role, SecurityMode, TransportConnection};
