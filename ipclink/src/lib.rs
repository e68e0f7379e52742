//! Thread-safe asynchronous IP messaging over queued connections.
//!
//! A connection is opened in one of six modes and identified by an opaque
//! handle. Reads and writes never block: writing queues a message for a
//! background worker to deliver, reading pops whatever the worker has
//! queued inbound. All socket I/O, reconnection, and peer management
//! happens on a lazily started runtime shared by every connection in the
//! process.
//!
//! # Modes
//!
//! | Mode | Role |
//! |------|------|
//! | [`Mode::Server`] | accept many clients, receive from all, broadcast to all |
//! | [`Mode::Client`] | talk to one server |
//! | [`Mode::Publisher`] | broadcast to subscribers, never receives |
//! | [`Mode::Subscriber`] | receive from one publisher, never sends |
//! | [`Mode::Requester`] | send one request, then wait for its reply |
//! | [`Mode::Replier`] | answer one requester, one reply per request |
//!
//! # Example
//!
//! ```no_run
//! use ipclink::Mode;
//!
//! # fn main() -> Result<(), ipclink::IpcError> {
//! let publisher = ipclink::open(Mode::Publisher, "127.0.0.1", "45000")?;
//! ipclink::write_message(publisher, b"sensor reading 42")?;
//! ipclink::close(publisher);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod connection;
mod queue;
mod registry;

pub mod config;
pub mod error;
pub mod message;
pub mod mode;
pub mod stats;
pub mod transport;

pub use config::ConnectionConfig;
pub use error::IpcError;
pub use message::{Message, MAX_MESSAGE_LENGTH};
pub use mode::Mode;
pub use registry::{
    active_connections, close, connection_stats, open, open_with_config, open_with_transport,
    read_message, write_message, ConnectionHandle,
};
pub use stats::ConnectionStats;
