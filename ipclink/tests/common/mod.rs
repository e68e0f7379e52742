//! Shared helpers for integration tests.
//!
//! The public API is non-blocking, so tests poll with a bounded deadline
//! instead of sleeping fixed amounts.

#![allow(dead_code)]

use std::sync::Once;
use std::time::{Duration, Instant};

use ipclink::{ConnectionHandle, Message};

/// Route library logs to the test writer when `RUST_LOG` is set.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Upper bound for any single wait in a test.
pub const DEADLINE: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll until a message arrives, panicking past the deadline.
pub fn read_next(handle: ConnectionHandle) -> Message {
    let start = Instant::now();
    loop {
        if let Some(message) = ipclink::read_message(handle).expect("readable handle") {
            return message;
        }
        assert!(
            start.elapsed() < DEADLINE,
            "no message arrived within the deadline"
        );
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Poll until the connection reports the expected number of peers.
pub fn wait_for_peers(handle: ConnectionHandle, count: usize) {
    let start = Instant::now();
    loop {
        let stats = ipclink::connection_stats(handle).expect("open handle");
        if stats.peers_connected == count {
            return;
        }
        assert!(
            start.elapsed() < DEADLINE,
            "expected {count} peers, still at {}",
            stats.peers_connected
        );
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Poll an arbitrary condition with the shared deadline.
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < DEADLINE, "timed out waiting for {what}");
        std::thread::sleep(POLL_INTERVAL);
    }
}
