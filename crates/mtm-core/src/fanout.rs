//! # Snapshot Fan-out
//!
//! Delivery of published snapshots to any number of independent subscribers.
//!
//! ## Description
//! Every subscriber owns a bounded queue. Publishing offers the same
//! `Arc<Snapshot>` to each queue without blocking:
//! - **Space available**: the snapshot is enqueued in publication order.
//! - **Queue full**: the *new* snapshot is dropped for that subscriber only, and the
//!   drop is reported to the [`ObservabilitySink`].
//! - **Receiver gone**: the subscriber is pruned from the registry.
//!
//! A slow subscriber therefore never stalls the scheduler or any other subscriber.
//!
//! ## Concurrency
//! The registry is guarded by a mutex held only for the duration of a
//! register/unregister/publish call, and never while the sink runs.
//! [`SubscriberFanout`] is cheap to clone and all clones share one registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mtm_models::{Snapshot, ValuationError};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::observability::MetricsDropSink;
use crate::services::ObservabilitySink;

/// Opaque, process-unique subscriber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Reasons a wait on a subscriber queue ends without a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FanoutError {
    #[error("wait cancelled for subscriber {0}")]
    Cancelled(SubscriberId),

    #[error("subscriber {0} is unregistered and its queue is drained")]
    Disconnected(SubscriberId),
}

/// Outcome of one publish call across all registered subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that received the snapshot.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
    /// Subscribers removed because their receiver was gone.
    pub pruned: usize,
}

struct Topic {
    label: String,
    sender: mpsc::Sender<Arc<Snapshot>>,
}

struct FanoutInner {
    topics: Mutex<BTreeMap<SubscriberId, Topic>>,
    next_id: AtomicU64,
    sink: Arc<dyn ObservabilitySink>,
}

/// Registry of subscriber queues.
#[derive(Clone)]
pub struct SubscriberFanout {
    inner: Arc<FanoutInner>,
}

impl SubscriberFanout {
    pub fn new(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            inner: Arc::new(FanoutInner {
                topics: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                sink,
            }),
        }
    }

    /// Fan-out reporting drops through [`MetricsDropSink`].
    pub fn with_metrics() -> Self {
        Self::new(Arc::new(MetricsDropSink))
    }

    /// Registers a subscriber with a queue of `capacity` snapshots.
    ///
    /// The subscriber sees only snapshots published after this call returns.
    ///
    /// # Returns
    /// [`ValuationError::Configuration`] if `capacity` is zero.
    pub fn register(
        &self,
        label: impl Into<String>,
        capacity: usize,
    ) -> Result<SubscriberHandle, ValuationError> {
        if capacity == 0 {
            return Err(ValuationError::Configuration(
                "subscriber queue capacity must be at least 1".into(),
            ));
        }
        let label = label.into();
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(capacity);

        self.topics().insert(
            id,
            Topic {
                label: label.clone(),
                sender,
            },
        );
        debug!("[FANOUT] registered {} ({}) with capacity {}", id, label, capacity);

        Ok(SubscriberHandle {
            id,
            label,
            receiver,
        })
    }

    /// Removes a subscriber. Unknown or already removed ids are a no-op.
    ///
    /// Snapshots already queued stay readable through the handle.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.topics().remove(&id).is_some();
        if removed {
            debug!("[FANOUT] unregistered {}", id);
        }
        removed
    }

    /// Subscribers whose handle is still alive.
    pub fn subscriber_count(&self) -> usize {
        self.topics().values().filter(|t| !t.sender.is_closed()).count()
    }

    /// True when nobody is listening; the scheduler skips its cycle in that case.
    ///
    /// Subscribers that dropped their handle without unregistering do not count.
    pub fn is_empty(&self) -> bool {
        self.topics().values().all(|t| t.sender.is_closed())
    }

    /// Offers `snapshot` to every registered subscriber without blocking.
    ///
    /// Drops are reported to the sink after the registry lock is released, so a sink
    /// may call back into the fan-out.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> PublishReport {
        let mut report = PublishReport::default();
        let mut drops = Vec::new();

        self.topics().retain(|id, topic| match topic.sender.try_send(Arc::clone(&snapshot)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                drops.push((*id, topic.label.clone()));
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[FANOUT] pruning {} ({}), receiver gone", id, topic.label);
                report.pruned += 1;
                false
            }
        });

        for (id, label) in &drops {
            self.inner.sink.record_drop(*id, label);
        }
        report
    }

    fn topics(&self) -> MutexGuard<'_, BTreeMap<SubscriberId, Topic>> {
        // the map stays consistent across a panic in another holder
        self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving side of a registered subscriber.
///
/// Dropping the handle closes the queue; the next publish prunes it.
pub struct SubscriberHandle {
    id: SubscriberId,
    label: String,
    receiver: mpsc::Receiver<Arc<Snapshot>>,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Waits for the oldest queued snapshot.
    ///
    /// # Returns
    /// [`FanoutError::Disconnected`] once the subscriber is unregistered and every
    /// remaining snapshot has been taken.
    pub async fn wait_for_next(&mut self) -> Result<Arc<Snapshot>, FanoutError> {
        self.receiver.recv().await.ok_or(FanoutError::Disconnected(self.id))
    }

    /// Like [`wait_for_next`](Self::wait_for_next) but gives up when `cancel` fires.
    ///
    /// A cancelled wait consumes nothing from the queue.
    pub async fn wait_for_next_or_cancel(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Arc<Snapshot>, FanoutError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FanoutError::Cancelled(self.id)),
            next = self.receiver.recv() => next.ok_or(FanoutError::Disconnected(self.id)),
        }
    }

    /// Blocking wait for consumers on plain threads. Panics inside an async context.
    pub fn blocking_wait_for_next(&mut self) -> Result<Arc<Snapshot>, FanoutError> {
        self.receiver.blocking_recv().ok_or(FanoutError::Disconnected(self.id))
    }

    /// Non-blocking poll. `Ok(None)` means the queue is currently empty.
    pub fn try_next(&mut self) -> Result<Option<Arc<Snapshot>>, FanoutError> {
        match self.receiver.try_recv() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(FanoutError::Disconnected(self.id)),
        }
    }
}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}
