//! In-process transport for deterministic tests and same-process loopback.
//!
//! A [`MemoryTransport`] and its clones share a switchboard mapping
//! `host:channel` endpoint strings to listeners. Connecting creates a pair
//! of crossed unbounded channels, so frames queued before the listener
//! accepts are delivered once it does.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Transport, TransportLink, TransportListener};

type AcceptSender = mpsc::UnboundedSender<(MemoryLink, String)>;
type Switchboard = Arc<Mutex<HashMap<String, AcceptSender>>>;

fn lock_board(board: &Switchboard) -> MutexGuard<'_, HashMap<String, AcceptSender>> {
    board.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Switchboard of in-process endpoints keyed by `host:channel`.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    switchboard: Switchboard,
    next_peer: Arc<AtomicU64>,
}

impl MemoryTransport {
    /// Create a new, empty switchboard.
    ///
    /// Only clones of the same instance share an address space.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Link = MemoryLink;
    type Listener = MemoryListener;

    async fn bind(&self, host: &str, channel: &str) -> io::Result<Self::Listener> {
        let key = format!("{host}:{channel}");
        let mut board = lock_board(&self.switchboard);
        if let Some(existing) = board.get(&key) {
            if !existing.is_closed() {
                return Err(io::ErrorKind::AddrInUse.into());
            }
        }
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        board.insert(key.clone(), accept_tx.clone());
        Ok(MemoryListener {
            accept_rx,
            accept_tx,
            addr: key,
            switchboard: Arc::clone(&self.switchboard),
        })
    }

    async fn connect(&self, host: &str, channel: &str) -> io::Result<Self::Link> {
        let key = format!("{host}:{channel}");
        let accept_tx = lock_board(&self.switchboard)
            .get(&key)
            .cloned()
            .ok_or(io::ErrorKind::ConnectionRefused)?;

        let (near_tx, far_rx) = mpsc::unbounded_channel();
        let (far_tx, near_rx) = mpsc::unbounded_channel();
        let near = MemoryLink {
            tx: near_tx,
            rx: near_rx,
        };
        let far = MemoryLink {
            tx: far_tx,
            rx: far_rx,
        };

        let peer_id = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let peer_addr = format!("mem:{key}#{peer_id}");
        accept_tx
            .send((far, peer_addr))
            .map_err(|_| io::Error::from(io::ErrorKind::ConnectionRefused))?;
        Ok(near)
    }
}

/// Listener end of a switchboard entry.
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<(MemoryLink, String)>,
    accept_tx: AcceptSender,
    addr: String,
    switchboard: Switchboard,
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        let mut board = lock_board(&self.switchboard);
        // Only unregister our own entry; the address may have been rebound.
        if let Some(current) = board.get(&self.addr) {
            if current.same_channel(&self.accept_tx) {
                board.remove(&self.addr);
            }
        }
    }
}

#[async_trait]
impl TransportListener for MemoryListener {
    type Link = MemoryLink;

    async fn accept(&mut self) -> io::Result<(Self::Link, String)> {
        self.accept_rx
            .recv()
            .await
            .ok_or_else(|| io::ErrorKind::ConnectionAborted.into())
    }

    fn local_addr(&self) -> io::Result<String> {
        Ok(self.addr.clone())
    }
}

/// One end of a crossed channel pair.
pub struct MemoryLink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[async_trait]
impl TransportLink for MemoryLink {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.tx
            .send(frame.to_vec())
            .map_err(|_| io::ErrorKind::BrokenPipe.into())
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| io::ErrorKind::ConnectionAborted.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_connect_exchange() {
        let transport = MemoryTransport::new();
        let mut listener = transport.bind("local", "42").await.expect("bind");
        let mut client = transport.connect("local", "42").await.expect("connect");

        client.send(b"ping").await.expect("send");
        let (mut server_link, peer) = listener.accept().await.expect("accept");
        assert!(peer.starts_with("mem:local:42"));
        assert_eq!(server_link.recv().await.expect("recv"), b"ping");

        server_link.send(b"pong").await.expect("send back");
        assert_eq!(client.recv().await.expect("recv back"), b"pong");
    }

    #[tokio::test]
    async fn test_connect_without_listener_refused() {
        let transport = MemoryTransport::new();
        let result = transport.connect("nowhere", "1").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_double_bind_rejected() {
        let transport = MemoryTransport::new();
        let _listener = transport.bind("local", "7").await.expect("bind");
        let second = transport.bind("local", "7").await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_rebind_after_drop() {
        let transport = MemoryTransport::new();
        let listener = transport.bind("local", "9").await.expect("bind");
        drop(listener);
        assert!(transport.bind("local", "9").await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_switchboard() {
        let transport = MemoryTransport::new();
        let clone = transport.clone();
        let _listener = transport.bind("shared", "5").await.expect("bind");
        assert!(clone.connect("shared", "5").await.is_ok());
    }

    #[tokio::test]
    async fn test_recv_after_peer_drop_errors() {
        let transport = MemoryTransport::new();
        let mut listener = transport.bind("local", "11").await.expect("bind");
        let client = transport.connect("local", "11").await.expect("connect");
        let (mut server_link, _peer) = listener.accept().await.expect("accept");

        drop(client);
        assert!(server_link.recv().await.is_err());
    }
}
