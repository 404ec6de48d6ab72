//! # Crucible RPC
//!
//! The wire layer of the plugin host: JSON-RPC 2.0 framing ([`message`]),
//! the stable error-code table ([`codes`]), method routing ([`router`]),
//! shutdown coordination ([`shutdown`]), and the stdio transport
//! ([`stdio`]).
//!
//! The protocol is newline-delimited JSON-RPC 2.0 over stdin/stdout: each
//! inbound line is one request object, each outbound line one response
//! object, and stdout carries nothing else. Notifications (requests without
//! an id) are executed but never answered.

pub mod codes;
pub mod message;
pub mod router;
pub mod shutdown;
pub mod stdio;

#[cfg(test)]
mod testing;

pub use message::{InvalidRequest, Request, RequestId, Response, RpcError};
pub use router::{HOST_METHODS, Router};
pub use shutdown::{ShutdownCoordinator, ShutdownReason};
