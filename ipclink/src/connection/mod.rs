//! Connection state shared between the worker task and application threads.

pub(crate) mod worker;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::ConnectionConfig;
use crate::error::IpcError;
use crate::message::Message;
use crate::mode::Mode;
use crate::queue::{PushOutcome, QueuePair};
use crate::stats::Metrics;

/// State shared between one worker task and any number of application
/// threads.
///
/// The queue pair is the only data plane; everything else is gates and
/// counters. The outbound wakeup is an unbounded token channel rather than
/// a `Notify` so a wakeup produced while the worker is busy elsewhere is
/// never lost.
pub(crate) struct Shared {
    pub(crate) mode: Mode,
    pub(crate) queues: QueuePair,
    outbound_wake: mpsc::UnboundedSender<()>,
    /// Requester gate: a request has been accepted and its reply has not
    /// arrived (or timed out) yet.
    request_in_flight: AtomicBool,
    /// Replier gate: requests received but not yet replied to.
    pending_requests: AtomicUsize,
    pub(crate) metrics: Metrics,
}

impl Shared {
    /// Create the shared state and the worker's wakeup receiver.
    pub(crate) fn new(
        mode: Mode,
        config: &ConnectionConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Self {
            mode,
            queues: QueuePair::new(config.queue_capacity),
            outbound_wake: wake_tx,
            request_in_flight: AtomicBool::new(false),
            pending_requests: AtomicUsize::new(0),
            metrics: Metrics::new(),
        });
        (shared, wake_rx)
    }

    /// Gate and enqueue one outbound message.
    ///
    /// This is the core of `write_message`: mode-state violations and
    /// backpressure are rejected synchronously; success means the message
    /// was accepted for asynchronous delivery.
    pub(crate) fn enqueue_outbound(&self, message: Message) -> Result<(), IpcError> {
        match self.mode {
            Mode::Subscriber => {
                return Err(IpcError::SendNotPermitted { mode: self.mode });
            }
            Mode::Requester => {
                let was_idle = self
                    .request_in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if !was_idle {
                    return Err(IpcError::RequestInFlight);
                }
            }
            Mode::Replier => {
                let consumed = self
                    .pending_requests
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .is_ok();
                if !consumed {
                    return Err(IpcError::ReplyWithoutRequest);
                }
            }
            Mode::Server | Mode::Client | Mode::Publisher => {}
        }

        match self.queues.push_outbound(message) {
            PushOutcome::Queued | PushOutcome::QueuedEvictedOldest => {
                let _ = self.outbound_wake.send(());
                Ok(())
            }
            PushOutcome::Rejected => {
                // Roll the gate back so the caller can retry later.
                match self.mode {
                    Mode::Requester => self.request_in_flight.store(false, Ordering::Release),
                    Mode::Replier => {
                        self.pending_requests.fetch_add(1, Ordering::AcqRel);
                    }
                    _ => {}
                }
                Err(IpcError::QueueFull {
                    capacity: self.queues.capacity(),
                })
            }
        }
    }

    /// Queue a message arriving from the network, evicting the oldest
    /// entry under overflow.
    pub(crate) fn push_inbound(&self, message: Message) {
        if matches!(
            self.queues.push_inbound(message),
            PushOutcome::QueuedEvictedOldest
        ) {
            self.metrics.record_dropped();
            tracing::debug!(mode = %self.mode, "inbound queue full, evicted oldest message");
        }
        self.metrics.record_received();
    }

    /// Pop the oldest inbound message, if any.
    pub(crate) fn read_inbound(&self) -> Option<Message> {
        self.queues.pop_inbound()
    }

    /// Pop the next outbound message for transmission.
    pub(crate) fn pop_outbound(&self) -> Option<Message> {
        self.queues.pop_outbound()
    }

    /// Record that a request arrived and now awaits a reply.
    pub(crate) fn record_request_received(&self) {
        self.pending_requests.fetch_add(1, Ordering::AcqRel);
    }

    /// Clear the requester's in-flight gate (reply arrived, timed out, or
    /// the link was lost).
    pub(crate) fn finish_request(&self) {
        self.request_in_flight.store(false, Ordering::Release);
    }

    /// Reset replier state after its requester disconnected: unanswered
    /// requests are forgotten and queued replies discarded.
    pub(crate) fn reset_reply_state(&self) {
        self.pending_requests.store(0, Ordering::Release);
        while self.pop_outbound().is_some() {
            self.metrics.record_dropped();
        }
    }

    /// Drop all queued messages in both directions.
    pub(crate) fn drain_queues(&self) {
        self.queues.clear_both();
    }
}
