//! Transport collaborator traits.
//!
//! The connection engine treats socket-level I/O as an external capability:
//! a [`Transport`] turns (host, channel) endpoint strings into listening or
//! connected endpoints, and a [`TransportLink`] moves one whole message
//! frame at a time. Any framing or delimiting the medium needs (datagram
//! boundaries, length prefixes) is the transport's responsibility; the
//! engine above only ever sees complete payloads.
//!
//! Two implementations ship with the crate: [`tcp::TcpTransport`] for real
//! networking and [`memory::MemoryTransport`] for in-process loopback and
//! deterministic tests.

pub mod frame;
pub mod memory;
pub mod tcp;

use std::io;

use async_trait::async_trait;

/// Factory for the socket primitives a connection needs.
///
/// `Clone` lets one transport instance be shared across connections; clones
/// must observe the same address space (a cloned [`memory::MemoryTransport`]
/// reaches the same switchboard).
#[async_trait]
pub trait Transport: Clone + Send + Sync + 'static {
    /// Bidirectional link type produced by this transport.
    type Link: TransportLink;
    /// Listener type produced by [`Transport::bind`].
    type Listener: TransportListener<Link = Self::Link>;

    /// Bind a listening endpoint identified by host and channel.
    async fn bind(&self, host: &str, channel: &str) -> io::Result<Self::Listener>;

    /// Connect to a remote endpoint identified by host and channel.
    async fn connect(&self, host: &str, channel: &str) -> io::Result<Self::Link>;
}

/// Accepts incoming links on a bound endpoint.
#[async_trait]
pub trait TransportListener: Send + 'static {
    /// Link type produced by [`TransportListener::accept`].
    type Link: TransportLink;

    /// Accept one incoming link, returning it with the peer's address.
    async fn accept(&mut self) -> io::Result<(Self::Link, String)>;

    /// Address this listener is bound to.
    fn local_addr(&self) -> io::Result<String>;
}

/// A bidirectional, message-framed connection to one peer.
#[async_trait]
pub trait TransportLink: Send + 'static {
    /// Send one whole frame.
    async fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Receive one whole frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the link is closed or torn down; there is no
    /// in-band end-of-stream value.
    async fn recv(&mut self) -> io::Result<Vec<u8>>;
}
