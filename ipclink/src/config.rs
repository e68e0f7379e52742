//! Configuration for connection queues, timeouts, and reconnection.

use std::time::Duration;

/// Tuning knobs for one connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Capacity of each message queue (inbound and outbound).
    ///
    /// Values below 1 are clamped to 1.
    pub queue_capacity: usize,

    /// Bound on transport bind/connect during open.
    pub connect_timeout: Duration,

    /// How long a requester waits for a reply before abandoning the
    /// pending request and resuming.
    pub request_timeout: Duration,

    /// Initial delay before reattempting a lost outbound link.
    pub initial_reconnect_delay: Duration,

    /// Ceiling for the reconnect backoff delay.
    pub max_reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
            initial_reconnect_delay: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    /// Settings for low-latency same-host messaging.
    pub fn local() -> Self {
        Self {
            queue_capacity: 64,
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_millis(500),
            initial_reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_secs(1),
        }
    }

    /// Override the per-queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Override the requester reply timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the connect/bind timeout applied during open.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConnectionConfig::default()
            .with_queue_capacity(8)
            .with_request_timeout(Duration::from_millis(50));
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.request_timeout, Duration::from_millis(50));
    }
}
