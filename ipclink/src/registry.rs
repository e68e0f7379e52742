//! Global connection registry and the blocking public API.
//!
//! Connections live in a process-wide table keyed by opaque handles. The
//! table and the tokio runtime behind it are created lazily on first open,
//! so a process that never opens a connection pays nothing. Handle values
//! are never reused; a handle left over after close stays invalid forever.
//!
//! `open` and `close` block briefly on the runtime and must be called from
//! ordinary threads, not from inside an async task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ConnectionConfig;
use crate::connection::worker::{self, Sockets, WorkerContext};
use crate::connection::Shared;
use crate::error::IpcError;
use crate::message::Message;
use crate::mode::Mode;
use crate::stats::ConnectionStats;
use crate::transport::tcp::TcpTransport;
use crate::transport::Transport;

/// Opaque identifier for one open connection.
///
/// Handles are `Copy` so they can be shared freely across threads; all
/// operations on a closed handle fail with [`IpcError::InvalidHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

struct Entry {
    shared: Arc<Shared>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    worker: JoinHandle<()>,
}

fn registry() -> &'static Mutex<HashMap<u64, Entry>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, Entry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_registry() -> MutexGuard<'static, HashMap<u64, Entry>> {
    registry().lock().unwrap_or_else(PoisonError::into_inner)
}

fn runtime() -> Result<&'static Runtime, IpcError> {
    static RUNTIME: OnceLock<Result<Runtime, String>> = OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("ipclink-io")
                .enable_all()
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|reason| IpcError::Runtime {
            reason: reason.clone(),
        })
}

fn next_handle_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

fn lookup(handle: ConnectionHandle) -> Result<Arc<Shared>, IpcError> {
    lock_registry()
        .get(&handle.0)
        .map(|entry| Arc::clone(&entry.shared))
        .ok_or(IpcError::InvalidHandle)
}

/// Open a TCP connection with default configuration.
///
/// For listening modes the channel is the local port to bind; for
/// connecting modes it is the remote port to reach.
///
/// # Errors
///
/// Returns [`IpcError::InvalidEndpoint`] for empty host or channel,
/// [`IpcError::Transport`] when bind/connect fails, and
/// [`IpcError::SetupTimeout`] when setup exceeds the connect timeout.
pub fn open(
    mode: Mode,
    host: &str,
    channel: &str,
) -> Result<ConnectionHandle, IpcError> {
    open_with_config(mode, host, channel, ConnectionConfig::default())
}

/// Open a TCP connection with explicit configuration.
pub fn open_with_config(
    mode: Mode,
    host: &str,
    channel: &str,
    config: ConnectionConfig,
) -> Result<ConnectionHandle, IpcError> {
    open_with_transport(TcpTransport::new(), mode, host, channel, config)
}

/// Open a connection over a caller-supplied transport.
///
/// This is how tests run the full engine against
/// [`MemoryTransport`](crate::transport::memory::MemoryTransport) without
/// touching real sockets.
pub fn open_with_transport<T: Transport>(
    transport: T,
    mode: Mode,
    host: &str,
    channel: &str,
    config: ConnectionConfig,
) -> Result<ConnectionHandle, IpcError> {
    if host.is_empty() {
        return Err(IpcError::InvalidEndpoint {
            reason: "host must not be empty".to_string(),
        });
    }
    if channel.is_empty() {
        return Err(IpcError::InvalidEndpoint {
            reason: "channel must not be empty".to_string(),
        });
    }

    let rt = runtime()?;
    let sockets = rt.block_on(async {
        let setup = async {
            if mode.is_listener() {
                transport.bind(host, channel).await.map(Sockets::Listener)
            } else {
                transport.connect(host, channel).await.map(Sockets::Link)
            }
        };
        match tokio::time::timeout(config.connect_timeout, setup).await {
            Ok(Ok(sockets)) => Ok(sockets),
            Ok(Err(error)) => Err(IpcError::Transport(error)),
            Err(_) => Err(IpcError::SetupTimeout),
        }
    })?;

    let (shared, outbound_wake) = Shared::new(mode, &config);
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    let ctx = WorkerContext {
        shared: Arc::clone(&shared),
        transport,
        host: host.to_string(),
        channel: channel.to_string(),
        config,
        outbound_wake,
        shutdown: shutdown_rx,
    };
    let worker = rt.spawn(worker::run(ctx, sockets));

    let id = next_handle_id();
    lock_registry().insert(
        id,
        Entry {
            shared,
            shutdown_tx,
            worker,
        },
    );
    tracing::debug!(handle = id, %mode, %host, %channel, "connection opened");
    Ok(ConnectionHandle(id))
}

/// Close a connection, blocking until its worker has stopped.
///
/// Queued messages in both directions are discarded and the handle becomes
/// permanently invalid. Closing an unknown or already-closed handle is a
/// no-op; callers are not required to track connection state.
pub fn close(handle: ConnectionHandle) {
    let Some(entry) = lock_registry().remove(&handle.0) else {
        return;
    };

    // A send failure means the worker already exited on its own.
    let _ = entry.shutdown_tx.send(());
    if let Ok(rt) = runtime() {
        if let Err(error) = rt.block_on(entry.worker) {
            tracing::warn!(%error, handle = handle.0, "worker did not stop cleanly");
        }
    }
    entry.shared.drain_queues();
    tracing::debug!(handle = handle.0, "connection closed");
}

/// Read the oldest queued inbound message without blocking.
///
/// `Ok(None)` means the queue is empty right now, which is not an error.
pub fn read_message(handle: ConnectionHandle) -> Result<Option<Message>, IpcError> {
    Ok(lookup(handle)?.read_inbound())
}

/// Queue a message for asynchronous delivery without blocking.
///
/// Success means the message was accepted, not that it reached any peer.
///
/// # Errors
///
/// Rejected synchronously for over-length payloads, mode violations
/// ([`IpcError::SendNotPermitted`], [`IpcError::RequestInFlight`],
/// [`IpcError::ReplyWithoutRequest`]), and outbound backpressure
/// ([`IpcError::QueueFull`]).
pub fn write_message(handle: ConnectionHandle, payload: &[u8]) -> Result<(), IpcError> {
    let shared = lookup(handle)?;
    let message = Message::new(payload)?;
    shared.enqueue_outbound(message)
}

/// Snapshot the counters of one connection, if it is still open.
pub fn connection_stats(handle: ConnectionHandle) -> Option<ConnectionStats> {
    lock_registry()
        .get(&handle.0)
        .map(|entry| entry.shared.metrics.snapshot())
}

/// Number of connections currently open in this process.
pub fn active_connections() -> usize {
    lock_registry().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;

    #[test]
    fn test_empty_host_rejected() {
        let result = open(Mode::Client, "", "4000");
        assert!(matches!(result, Err(IpcError::InvalidEndpoint { .. })));
    }

    #[test]
    fn test_empty_channel_rejected() {
        let result = open(Mode::Server, "127.0.0.1", "");
        assert!(matches!(result, Err(IpcError::InvalidEndpoint { .. })));
    }

    #[test]
    fn test_operations_on_unknown_handle() {
        let stale = ConnectionHandle(u64::MAX);
        assert!(matches!(read_message(stale), Err(IpcError::InvalidHandle)));
        assert!(matches!(
            write_message(stale, b"payload"),
            Err(IpcError::InvalidHandle)
        ));
        assert!(connection_stats(stale).is_none());
        // Close tolerates handles it has never seen.
        close(stale);
        close(stale);
    }
}
