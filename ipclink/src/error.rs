//! Error types for connection operations.
//!
//! All application-facing failures are return-value based. Transient
//! transport errors during steady-state operation are handled inside the
//! worker and never surface here; only setup failures at open time do.

use std::io;

use thiserror::Error;

use crate::mode::Mode;

/// Errors surfaced by the connection API.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Host or channel was empty or malformed for the transport.
    #[error("invalid endpoint: {reason}")]
    InvalidEndpoint {
        /// Why the endpoint was rejected.
        reason: String,
    },

    /// Message payload exceeds the fixed maximum length.
    #[error("message length {length} exceeds maximum {maximum}")]
    MessageTooLong {
        /// Length of the rejected payload.
        length: usize,
        /// Maximum allowed length.
        maximum: usize,
    },

    /// The connection's mode never permits sending.
    #[error("mode {mode} does not permit sending")]
    SendNotPermitted {
        /// Mode of the rejecting connection.
        mode: Mode,
    },

    /// A replier tried to send with no received request awaiting a reply.
    #[error("no pending request to reply to")]
    ReplyWithoutRequest,

    /// A requester tried to send before the previous reply arrived.
    #[error("a request is already in flight")]
    RequestInFlight,

    /// The outbound queue is full and the backpressure policy rejects.
    #[error("outbound queue full: capacity {capacity}")]
    QueueFull {
        /// Capacity of the rejecting queue.
        capacity: usize,
    },

    /// The handle is unknown or the connection was closed.
    #[error("invalid or closed connection handle")]
    InvalidHandle,

    /// Transport bind/connect failed at open time.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Transport setup did not complete within the connect timeout.
    #[error("transport setup timed out")]
    SetupTimeout,

    /// The background runtime could not be initialized.
    #[error("runtime initialization failed: {reason}")]
    Runtime {
        /// Why the runtime could not be built.
        reason: String,
    },
}
