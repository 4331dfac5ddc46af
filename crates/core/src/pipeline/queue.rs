use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

/// How long a blocked `pop` sleeps between close checks. Closing a queue
/// therefore wakes every consumer within one tick.
const POLL_TICK: Duration = Duration::from_millis(50);

/// What a producer does when the queue is at capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the oldest queued item and enqueue the new one. Used on the
    /// real-time edges so consumers always see the freshest data and lag
    /// stays bounded by capacity.
    DropOldest,
    /// Discard the incoming item.
    DropNewest,
    /// Block up to the timeout, then discard the incoming item. Used on
    /// the egress edges to keep audio and video roughly in sync without
    /// unbounded buildup.
    Block(Duration),
}

/// Result of a push. Drops are normal backpressure, not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The oldest queued item was discarded to make room.
    DroppedOldest,
    /// The pushed item itself was discarded.
    DroppedNewest,
    /// The queue is closed; the item was discarded.
    Closed,
}

impl PushOutcome {
    pub fn dropped(&self) -> bool {
        matches!(self, PushOutcome::DroppedOldest | PushOutcome::DroppedNewest)
    }
}

/// The queue is closed and fully drained. Every consumer thread treats
/// this as its exit signal.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("queue closed")]
pub struct Closed;

struct Inner<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    closed: AtomicBool,
    dropped: AtomicU64,
    capacity: usize,
    policy: OverflowPolicy,
    name: &'static str,
}

/// Typed, capacity-limited channel between two pipeline stages with an
/// explicit overflow policy.
///
/// Cheaply cloneable; all clones share the same buffer. Closing is
/// one-way: a closed queue rejects new items but lets consumers drain
/// what is already in flight, so shutdown never loses queued work.
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> BoundedQueue<T> {
    pub fn new(name: &'static str, capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                tx,
                rx,
                closed: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
                capacity: capacity.max(1),
                policy,
                name,
            }),
        }
    }

    pub fn push(&self, item: T) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }

        match self.inner.policy {
            OverflowPolicy::DropOldest => self.push_drop_oldest(item),
            OverflowPolicy::DropNewest => match self.inner.tx.try_send(item) {
                Ok(()) => PushOutcome::Pushed,
                Err(TrySendError::Full(_)) => self.record_drop(PushOutcome::DroppedNewest),
                Err(TrySendError::Disconnected(_)) => PushOutcome::Closed,
            },
            OverflowPolicy::Block(timeout) => {
                match self.inner.tx.send_timeout(item, timeout) {
                    Ok(()) => PushOutcome::Pushed,
                    Err(crossbeam_channel::SendTimeoutError::Timeout(_)) => {
                        self.record_drop(PushOutcome::DroppedNewest)
                    }
                    Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => {
                        PushOutcome::Closed
                    }
                }
            }
        }
    }

    fn push_drop_oldest(&self, item: T) -> PushOutcome {
        match self.inner.tx.try_send(item) {
            Ok(()) => PushOutcome::Pushed,
            Err(TrySendError::Full(item)) => {
                // Evict one, then retry. Another producer may win the slot;
                // in that case the incoming item is the one dropped.
                let _ = self.inner.rx.try_recv();
                match self.inner.tx.try_send(item) {
                    Ok(()) => self.record_drop(PushOutcome::DroppedOldest),
                    Err(_) => self.record_drop(PushOutcome::DroppedNewest),
                }
            }
            Err(TrySendError::Disconnected(_)) => PushOutcome::Closed,
        }
    }

    /// Blocks until an item is available or the queue is closed and drained.
    pub fn pop(&self) -> Result<T, Closed> {
        loop {
            match self.inner.rx.recv_timeout(POLL_TICK) {
                Ok(item) => return Ok(item),
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_closed() && self.inner.rx.is_empty() {
                        return Err(Closed);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(Closed),
            }
        }
    }

    /// Waits up to `timeout` for an item. `Ok(None)` means nothing arrived
    /// in time; `Err(Closed)` means the queue is closed and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<T>, Closed> {
        match self.inner.rx.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => {
                if self.is_closed() && self.inner.rx.is_empty() {
                    Err(Closed)
                } else {
                    Ok(None)
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(Closed),
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.rx.try_recv().ok()
    }

    /// Marks the queue closed. In-flight items remain poppable; producers
    /// get `PushOutcome::Closed` from now on.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            log::debug!("Queue {} closed (depth {})", self.inner.name, self.len());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Discards everything currently queued. Used when the ingress
    /// disconnects and stale frames would only add latency on reconnect.
    pub fn clear(&self) {
        while self.inner.rx.try_recv().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.inner.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.rx.len() >= self.inner.capacity
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    fn record_drop(&self, outcome: PushOutcome) -> PushOutcome {
        let total = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if total == 1 || total % 1000 == 0 {
            log::warn!("Queue {} dropped {total} items", self.inner.name);
        }
        outcome
    }
}
