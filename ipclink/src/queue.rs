//! Bounded message queues shared between the worker and application threads.
//!
//! Each connection owns a [`QueuePair`]: an inbound and an outbound FIFO,
//! locked independently so worker reads and application writes never contend
//! on the same mutex. Overflow behavior is fixed per direction: inbound
//! evicts the oldest entry (favor freshness), outbound rejects the new one
//! so the writer learns about backpressure synchronously.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::message::Message;

/// What happens when a message is pushed onto a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OverflowPolicy {
    /// Evict the oldest entry, then insert at the tail.
    DropOldest,
    /// Leave the queue unchanged and report rejection.
    Reject,
}

/// Outcome of a push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    /// Inserted with room to spare.
    Queued,
    /// Inserted after evicting the oldest entry.
    QueuedEvictedOldest,
    /// Queue full and the policy rejects new entries.
    Rejected,
}

/// Bounded FIFO of messages.
pub(crate) struct BoundedQueue {
    items: VecDeque<Message>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl BoundedQueue {
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Insert at the tail, applying the overflow policy when full.
    pub(crate) fn push(&mut self, message: Message) -> PushOutcome {
        if self.items.len() < self.capacity {
            self.items.push_back(message);
            return PushOutcome::Queued;
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                self.items.pop_front();
                self.items.push_back(message);
                PushOutcome::QueuedEvictedOldest
            }
            OverflowPolicy::Reject => PushOutcome::Rejected,
        }
    }

    /// Remove and return the head, if any.
    pub(crate) fn pop(&mut self) -> Option<Message> {
        self.items.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

/// Inbound/outbound queue pair with independent locks.
pub(crate) struct QueuePair {
    inbound: Mutex<BoundedQueue>,
    outbound: Mutex<BoundedQueue>,
    capacity: usize,
}

/// Recover the guard from a poisoned lock.
///
/// Queue operations are short and never panic mid-mutation, so the data
/// behind a poisoned lock is still structurally sound.
fn lock_queue(queue: &Mutex<BoundedQueue>) -> MutexGuard<'_, BoundedQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QueuePair {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inbound: Mutex::new(BoundedQueue::new(capacity, OverflowPolicy::DropOldest)),
            outbound: Mutex::new(BoundedQueue::new(capacity, OverflowPolicy::Reject)),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push_inbound(&self, message: Message) -> PushOutcome {
        lock_queue(&self.inbound).push(message)
    }

    pub(crate) fn pop_inbound(&self) -> Option<Message> {
        lock_queue(&self.inbound).pop()
    }

    pub(crate) fn push_outbound(&self, message: Message) -> PushOutcome {
        lock_queue(&self.outbound).push(message)
    }

    pub(crate) fn pop_outbound(&self) -> Option<Message> {
        lock_queue(&self.outbound).pop()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn clear_both(&self) {
        lock_queue(&self.inbound).clear();
        lock_queue(&self.outbound).clear();
    }
}
