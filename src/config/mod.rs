//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TransportConfig (validated, immutable)
//!     → shared via Arc with the ConnectionFactory
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Security mode is an explicit setting; the port heuristic is opt-in via `auto`

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::HandshakeConfig;
pub use schema::SecurityConfig;
pub use schema::SecurityModeSetting;
pub use schema::ServerTlsConfig;
pub use schema::TlsConfig;
pub use schema::TransportConfig;
pub use schema::VerificationMode;
