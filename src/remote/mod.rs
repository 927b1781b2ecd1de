//! Reverse-call connections to event processors running outside the runtime.
//!
//! The remote side connects in, registers, and is then sent processing
//! requests over the same connection. Transport framing lives elsewhere;
//! this module works on typed messages over channels.

pub mod connection;
pub mod error;
pub mod messages;
pub mod processor;

// Re-export commonly used types
pub use connection::ConnectionState;
pub use error::RemoteError;
pub use messages::{CallId, ClientMessage, RemoteRequest, ServerMessage};
pub use processor::RemoteProcessor;
