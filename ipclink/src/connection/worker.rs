//! Background task driving one connection's transport I/O.
//!
//! Each open connection owns exactly one worker. The worker moves messages
//! between the connection's queue pair and the transport, reconnects lost
//! outbound links with exponential backoff, and quiesces when the shutdown
//! channel fires. Transport failures are never fatal to the worker; they
//! drop the affected link (and possibly a message) and the loop continues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ConnectionConfig;
use crate::message::Message;
use crate::mode::Mode;
use crate::transport::{Transport, TransportLink, TransportListener};

use super::Shared;

/// Delay before retrying a failed accept call.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Socket half handed to the worker by open: listening modes get a
/// listener, connecting modes an established link.
pub(crate) enum Sockets<T: Transport> {
    Listener(T::Listener),
    Link(T::Link),
}

/// Everything a worker needs, bundled for the spawn call.
pub(crate) struct WorkerContext<T: Transport> {
    pub(crate) shared: Arc<Shared>,
    pub(crate) transport: T,
    pub(crate) host: String,
    pub(crate) channel: String,
    pub(crate) config: ConnectionConfig,
    pub(crate) outbound_wake: mpsc::UnboundedReceiver<()>,
    pub(crate) shutdown: mpsc::UnboundedReceiver<()>,
}

/// Run one connection worker to completion.
pub(crate) async fn run<T: Transport>(mut ctx: WorkerContext<T>, sockets: Sockets<T>) {
    tracing::debug!(
        mode = %ctx.shared.mode,
        host = %ctx.host,
        channel = %ctx.channel,
        "connection worker started"
    );

    match (ctx.shared.mode, sockets) {
        (Mode::Server, Sockets::Listener(listener)) => run_fanout(&mut ctx, listener, true).await,
        (Mode::Publisher, Sockets::Listener(listener)) => {
            run_fanout(&mut ctx, listener, false).await
        }
        (Mode::Replier, Sockets::Listener(listener)) => run_replier(&mut ctx, listener).await,
        (Mode::Client, Sockets::Link(link)) => run_link(&mut ctx, link).await,
        (Mode::Subscriber, Sockets::Link(link)) => run_link(&mut ctx, link).await,
        (Mode::Requester, Sockets::Link(link)) => run_requester(&mut ctx, link).await,
        (mode, _) => {
            tracing::warn!(%mode, "socket kind does not match mode, stopping worker");
        }
    }

    tracing::debug!(mode = %ctx.shared.mode, "connection worker stopped");
}

/// Exponential backoff between reconnect attempts.
struct Backoff {
    delay: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    fn new(config: &ConnectionConfig) -> Self {
        Self {
            delay: config.initial_reconnect_delay,
            initial: config.initial_reconnect_delay,
            max: config.max_reconnect_delay,
        }
    }

    /// Current delay, doubling for next time up to the ceiling.
    fn next_delay(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.delay = self.initial;
    }
}

enum ReconnectOutcome<L> {
    Reconnected(L),
    Stopped,
}

/// Re-establish an outbound link, retrying until success or shutdown.
async fn reconnect<T: Transport>(
    ctx: &mut WorkerContext<T>,
    backoff: &mut Backoff,
) -> ReconnectOutcome<T::Link> {
    loop {
        let delay = backoff.next_delay();
        tokio::select! {
            _ = ctx.shutdown.recv() => return ReconnectOutcome::Stopped,
            _ = tokio::time::sleep(delay) => {}
        }
        tokio::select! {
            _ = ctx.shutdown.recv() => return ReconnectOutcome::Stopped,
            attempt = ctx.transport.connect(&ctx.host, &ctx.channel) => match attempt {
                Ok(link) => return ReconnectOutcome::Reconnected(link),
                Err(error) => {
                    tracing::debug!(
                        %error,
                        host = %ctx.host,
                        channel = %ctx.channel,
                        "reconnect attempt failed"
                    );
                }
            }
        }
    }
}

/// Send every queued outbound message on a single link.
///
/// Returns false when the link failed; the message being sent is dropped
/// and the caller tears the link down.
async fn flush_outbound<L: TransportLink>(shared: &Shared, link: &mut L) -> bool {
    while let Some(message) = shared.pop_outbound() {
        if let Err(error) = link.send(message.as_bytes()).await {
            tracing::warn!(%error, mode = %shared.mode, "send failed, dropping message and link");
            shared.metrics.record_dropped();
            return false;
        }
        shared.metrics.record_sent();
    }
    true
}

/// Queue a received frame inbound. Returns false when the frame was
/// discarded instead.
fn deliver_inbound(shared: &Shared, frame: Vec<u8>) -> bool {
    match Message::try_from(frame) {
        Ok(message) => {
            shared.push_inbound(message);
            true
        }
        Err(_) => {
            shared.metrics.record_dropped();
            tracing::warn!(mode = %shared.mode, "dropping oversized inbound frame");
            false
        }
    }
}

/// Per-peer task for fan-out modes. Owns the link; the main loop talks to
/// it through channels so one slow peer cannot stall the others.
async fn peer_task<L: TransportLink>(
    mut link: L,
    mut outbound: mpsc::Receiver<Message>,
    inbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
) {
    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(message) => {
                    if let Err(error) = link.send(message.as_bytes()).await {
                        tracing::debug!(%error, "peer send failed, detaching");
                        break;
                    }
                }
                None => break,
            },
            frame = link.recv() => match frame {
                Ok(frame) => {
                    if let Some(tx) = &inbound {
                        if tx.send(frame).is_err() {
                            break;
                        }
                    }
                    // Without a forward channel inbound traffic is ignored.
                }
                Err(error) => {
                    tracing::debug!(%error, "peer link closed");
                    break;
                }
            },
        }
    }
}

/// Broadcast every queued outbound message to all attached peers.
///
/// Per-peer buffers are bounded. A peer too slow to drain its buffer loses
/// the frame; total memory stays proportional to peer count times queue
/// capacity.
fn flush_broadcast(shared: &Shared, peers: &mut HashMap<u64, mpsc::Sender<Message>>) {
    while let Some(message) = shared.pop_outbound() {
        if peers.is_empty() {
            shared.metrics.record_dropped();
            tracing::debug!(mode = %shared.mode, "no peers attached, dropping outbound message");
            continue;
        }
        let mut delivered = false;
        let mut dropped = false;
        peers.retain(|_, tx| match tx.try_send(message.clone()) {
            Ok(()) => {
                delivered = true;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped = true;
                shared.metrics.record_dropped();
                tracing::debug!(mode = %shared.mode, "peer buffer full, dropping frame for it");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if delivered {
            shared.metrics.record_sent();
        } else if !dropped {
            // Every remaining peer vanished mid-broadcast.
            shared.metrics.record_dropped();
        }
    }
}

/// Server and Publisher: accept any number of peers, broadcast outbound
/// messages to all of them. Servers also merge every peer's inbound
/// traffic into the connection's queue; publishers ignore it.
async fn run_fanout<T: Transport>(
    ctx: &mut WorkerContext<T>,
    mut listener: T::Listener,
    deliver_inbound_frames: bool,
) {
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (departed_tx, mut departed_rx) = mpsc::unbounded_channel::<u64>();
    let mut peers: HashMap<u64, mpsc::Sender<Message>> = HashMap::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut next_peer_id: u64 = 0;

    loop {
        peers.retain(|_, tx| !tx.is_closed());
        tasks.retain(|task| !task.is_finished());
        ctx.shared.metrics.set_peers(peers.len());
        flush_broadcast(&ctx.shared, &mut peers);

        tokio::select! {
            _ = ctx.shutdown.recv() => break,
            _ = ctx.outbound_wake.recv() => {}
            departed = departed_rx.recv() => {
                if let Some(peer_id) = departed {
                    peers.remove(&peer_id);
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((link, peer_addr)) => {
                    tracing::debug!(peer = %peer_addr, mode = %ctx.shared.mode, "peer attached");
                    let (peer_tx, peer_rx) = mpsc::channel(ctx.config.queue_capacity.max(1));
                    let forward = deliver_inbound_frames.then(|| inbound_tx.clone());
                    let peer_id = next_peer_id;
                    next_peer_id += 1;
                    peers.insert(peer_id, peer_tx);
                    let departed = departed_tx.clone();
                    tasks.push(tokio::spawn(async move {
                        peer_task(link, peer_rx, forward).await;
                        let _ = departed.send(peer_id);
                    }));
                }
                Err(error) => {
                    tracing::warn!(%error, "accept failed, retrying");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
            frame = inbound_rx.recv() => {
                if let Some(frame) = frame {
                    deliver_inbound(&ctx.shared, frame);
                }
            }
        }
    }

    drop(peers);
    for task in tasks {
        task.abort();
    }
    ctx.shared.metrics.set_peers(0);
}

/// Client and Subscriber: one outbound link, reconnected on loss.
/// Subscribers never queue outbound messages, so the flush is a no-op
/// for them.
async fn run_link<T: Transport>(ctx: &mut WorkerContext<T>, link: T::Link) {
    let mut backoff = Backoff::new(&ctx.config);
    let mut link = Some(link);
    ctx.shared.metrics.peer_attached();

    loop {
        let Some(mut active) = link.take() else {
            match reconnect(ctx, &mut backoff).await {
                ReconnectOutcome::Reconnected(fresh) => {
                    link = Some(fresh);
                    backoff.reset();
                    ctx.shared.metrics.peer_attached();
                }
                ReconnectOutcome::Stopped => break,
            }
            continue;
        };

        if !flush_outbound(&ctx.shared, &mut active).await {
            ctx.shared.metrics.peer_detached();
            continue;
        }

        tokio::select! {
            _ = ctx.shutdown.recv() => break,
            _ = ctx.outbound_wake.recv() => {
                link = Some(active);
            }
            frame = active.recv() => match frame {
                Ok(frame) => {
                    deliver_inbound(&ctx.shared, frame);
                    link = Some(active);
                }
                Err(error) => {
                    tracing::debug!(%error, mode = %ctx.shared.mode, "link lost");
                    ctx.shared.metrics.peer_detached();
                }
            }
        }
    }
}

/// Requester: send one request, then wait for its reply (or the reply
/// timeout) before looking at the queue again. The in-flight gate is
/// cleared whichever way the wait ends, so the caller may write again.
///
/// A timed-out request is abandoned for good. Its reply, if it ever
/// arrives, is discarded so it can never be mistaken for the answer to a
/// later request: the worker counts one owed stale reply per abandoned
/// request and skips that many frames before pairing again.
async fn run_requester<T: Transport>(ctx: &mut WorkerContext<T>, link: T::Link) {
    let mut backoff = Backoff::new(&ctx.config);
    let mut link = Some(link);
    // Replies owed for requests abandoned on the current link.
    let mut stale_replies: usize = 0;
    ctx.shared.metrics.peer_attached();

    'main: loop {
        let Some(mut active) = link.take() else {
            match reconnect(ctx, &mut backoff).await {
                ReconnectOutcome::Reconnected(fresh) => {
                    link = Some(fresh);
                    backoff.reset();
                    stale_replies = 0;
                    ctx.shared.metrics.peer_attached();
                }
                ReconnectOutcome::Stopped => break,
            }
            continue;
        };

        if let Some(request) = ctx.shared.pop_outbound() {
            if let Err(error) = active.send(request.as_bytes()).await {
                tracing::warn!(%error, "request send failed, dropping request");
                ctx.shared.metrics.record_dropped();
                ctx.shared.finish_request();
                ctx.shared.metrics.peer_detached();
                continue;
            }
            ctx.shared.metrics.record_sent();

            let deadline = tokio::time::Instant::now() + ctx.config.request_timeout;
            loop {
                tokio::select! {
                    _ = ctx.shutdown.recv() => {
                        ctx.shared.finish_request();
                        break 'main;
                    }
                    reply = tokio::time::timeout_at(deadline, active.recv()) => match reply {
                        Ok(Ok(frame)) => {
                            if stale_replies > 0 {
                                stale_replies -= 1;
                                ctx.shared.metrics.record_dropped();
                                tracing::debug!("discarding reply to an abandoned request");
                                continue;
                            }
                            deliver_inbound(&ctx.shared, frame);
                            link = Some(active);
                            break;
                        }
                        Ok(Err(error)) => {
                            tracing::debug!(%error, "link lost while awaiting reply");
                            ctx.shared.metrics.peer_detached();
                            stale_replies = 0;
                            break;
                        }
                        Err(_) => {
                            tracing::warn!("reply timed out, abandoning request");
                            stale_replies += 1;
                            link = Some(active);
                            break;
                        }
                    }
                }
            }
            ctx.shared.finish_request();
            continue;
        }

        tokio::select! {
            _ = ctx.shutdown.recv() => break,
            _ = ctx.outbound_wake.recv() => {
                link = Some(active);
            }
            unsolicited = active.recv() => match unsolicited {
                Ok(_) => {
                    // No request in flight; this frame pairs with nothing.
                    if stale_replies > 0 {
                        stale_replies -= 1;
                    }
                    ctx.shared.metrics.record_dropped();
                    tracing::debug!("discarding frame received with no request in flight");
                    link = Some(active);
                }
                Err(error) => {
                    tracing::debug!(%error, "requester link closed");
                    ctx.shared.metrics.peer_detached();
                    stale_replies = 0;
                }
            }
        }
    }
}

/// Replier: serve one requester at a time. Losing the requester forgets
/// unanswered requests and discards queued replies, so a fresh requester
/// starts from a clean slate.
async fn run_replier<T: Transport>(ctx: &mut WorkerContext<T>, mut listener: T::Listener) {
    let mut link: Option<T::Link> = None;

    loop {
        let Some(mut active) = link.take() else {
            tokio::select! {
                _ = ctx.shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((fresh, peer_addr)) => {
                        tracing::debug!(peer = %peer_addr, "requester attached");
                        ctx.shared.metrics.peer_attached();
                        link = Some(fresh);
                    }
                    Err(error) => {
                        tracing::warn!(%error, "accept failed, retrying");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                }
            }
            continue;
        };

        if !flush_outbound(&ctx.shared, &mut active).await {
            ctx.shared.metrics.peer_detached();
            ctx.shared.reset_reply_state();
            continue;
        }

        tokio::select! {
            _ = ctx.shutdown.recv() => break,
            _ = ctx.outbound_wake.recv() => {
                link = Some(active);
            }
            frame = active.recv() => match frame {
                Ok(frame) => {
                    if deliver_inbound(&ctx.shared, frame) {
                        ctx.shared.record_request_received();
                    }
                    link = Some(active);
                }
                Err(error) => {
                    tracing::debug!(%error, "requester detached");
                    ctx.shared.metrics.peer_detached();
                    ctx.shared.reset_reply_state();
                }
            }
        }
    }
}
