//! Observability subsystem.
//!
//! All subsystems emit structured `tracing` events; the `connection_id`
//! field ties every event to one transport connection.

pub mod logging;
