//! Queue Events
//!
//! Typed change notifications for queue observers.
//! One notification is emitted after every committed mutation:
//! - `Inserted` carries the item that was appended
//! - `Advanced`, `Skipped`, `Removed`, `Cleared` carry the new head (if any)
//!
//! Observers either register callbacks, which run synchronously after the
//! mutation, or take an unbounded channel receiver for async consumption.

use crate::error::QueueError;
use crate::types::QueueItem;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};

/// Kinds of queue notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueEventKind {
    /// An item was appended
    Inserted,
    /// The head finished playing normally
    Advanced,
    /// The head was abandoned early
    Skipped,
    /// The head was dropped by policy (e.g. it failed to prepare)
    Removed,
    /// The queue was cleared
    Cleared,
}

impl QueueEventKind {
    /// Every kind, in declaration order
    pub const ALL: [QueueEventKind; 5] = [
        QueueEventKind::Inserted,
        QueueEventKind::Advanced,
        QueueEventKind::Skipped,
        QueueEventKind::Removed,
        QueueEventKind::Cleared,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEventKind::Inserted => "inserted",
            QueueEventKind::Advanced => "advanced",
            QueueEventKind::Skipped => "skipped",
            QueueEventKind::Removed => "removed",
            QueueEventKind::Cleared => "cleared",
        }
    }

    fn bit(self) -> u8 {
        match self {
            QueueEventKind::Inserted => 1,
            QueueEventKind::Advanced => 1 << 1,
            QueueEventKind::Skipped => 1 << 2,
            QueueEventKind::Removed => 1 << 3,
            QueueEventKind::Cleared => 1 << 4,
        }
    }
}

impl fmt::Display for QueueEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification emitted after a queue mutation
#[derive(Debug)]
pub enum QueueEvent<P, T> {
    /// An item was appended to the tenant's queue
    Inserted {
        /// Tenant whose queue changed
        tenant_id: String,
        /// The appended item
        item: Arc<QueueItem<P, T>>,
    },

    /// The head finished and was removed
    Advanced {
        /// Tenant whose queue changed
        tenant_id: String,
        /// New head, `None` if the queue is now empty
        head: Option<Arc<QueueItem<P, T>>>,
    },

    /// The head was skipped
    Skipped {
        /// Tenant whose queue changed
        tenant_id: String,
        /// New head, `None` if the queue is now empty
        head: Option<Arc<QueueItem<P, T>>>,
    },

    /// The head was removed by policy
    Removed {
        /// Tenant whose queue changed
        tenant_id: String,
        /// New head, `None` if the queue is now empty
        head: Option<Arc<QueueItem<P, T>>>,
    },

    /// The queue was cleared (head only, or fully, depending on `ClearMode`)
    Cleared {
        /// Tenant whose queue changed
        tenant_id: String,
        /// New head, `None` if the queue is now empty
        head: Option<Arc<QueueItem<P, T>>>,
    },
}

impl<P, T> QueueEvent<P, T> {
    /// Kind of this notification
    pub fn kind(&self) -> QueueEventKind {
        match self {
            QueueEvent::Inserted { .. } => QueueEventKind::Inserted,
            QueueEvent::Advanced { .. } => QueueEventKind::Advanced,
            QueueEvent::Skipped { .. } => QueueEventKind::Skipped,
            QueueEvent::Removed { .. } => QueueEventKind::Removed,
            QueueEvent::Cleared { .. } => QueueEventKind::Cleared,
        }
    }

    /// Tenant whose queue changed
    pub fn tenant_id(&self) -> &str {
        match self {
            QueueEvent::Inserted { tenant_id, .. }
            | QueueEvent::Advanced { tenant_id, .. }
            | QueueEvent::Skipped { tenant_id, .. }
            | QueueEvent::Removed { tenant_id, .. }
            | QueueEvent::Cleared { tenant_id, .. } => tenant_id,
        }
    }

    /// Head after the mutation
    ///
    /// Always `None` for `Inserted`, which reports the appended item instead.
    pub fn head(&self) -> Option<&Arc<QueueItem<P, T>>> {
        match self {
            QueueEvent::Inserted { .. } => None,
            QueueEvent::Advanced { head, .. }
            | QueueEvent::Skipped { head, .. }
            | QueueEvent::Removed { head, .. }
            | QueueEvent::Cleared { head, .. } => head.as_ref(),
        }
    }

    /// The item this notification is about
    ///
    /// The appended item for `Inserted`, the new head otherwise.
    pub fn item(&self) -> Option<&Arc<QueueItem<P, T>>> {
        match self {
            QueueEvent::Inserted { item, .. } => Some(item),
            _ => self.head(),
        }
    }
}

// Items are behind `Arc`, so cloning never needs `P: Clone` or `T: Clone`.
impl<P, T> Clone for QueueEvent<P, T> {
    fn clone(&self) -> Self {
        match self {
            QueueEvent::Inserted { tenant_id, item } => QueueEvent::Inserted {
                tenant_id: tenant_id.clone(),
                item: Arc::clone(item),
            },
            QueueEvent::Advanced { tenant_id, head } => QueueEvent::Advanced {
                tenant_id: tenant_id.clone(),
                head: head.clone(),
            },
            QueueEvent::Skipped { tenant_id, head } => QueueEvent::Skipped {
                tenant_id: tenant_id.clone(),
                head: head.clone(),
            },
            QueueEvent::Removed { tenant_id, head } => QueueEvent::Removed {
                tenant_id: tenant_id.clone(),
                head: head.clone(),
            },
            QueueEvent::Cleared { tenant_id, head } => QueueEvent::Cleared {
                tenant_id: tenant_id.clone(),
                head: head.clone(),
            },
        }
    }
}

/// Which notifications a subscriber wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    kinds: u8,
    tenant_id: Option<String>,
}

impl EventFilter {
    /// Every kind, every tenant
    pub fn all() -> Self {
        Self {
            kinds: QueueEventKind::ALL.iter().fold(0, |mask, kind| mask | kind.bit()),
            tenant_id: None,
        }
    }

    /// Only the given kinds, every tenant
    pub fn kinds(kinds: &[QueueEventKind]) -> Self {
        Self {
            kinds: kinds.iter().fold(0, |mask, kind| mask | kind.bit()),
            tenant_id: None,
        }
    }

    /// Restrict to a single tenant
    #[must_use]
    pub fn for_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Check whether a notification passes this filter
    pub fn matches(&self, kind: QueueEventKind, tenant_id: &str) -> bool {
        if self.kinds & kind.bit() == 0 {
            return false;
        }
        match &self.tenant_id {
            Some(id) => id == tenant_id,
            None => true,
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Handle returned by every subscribe call, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
}

impl Subscription {
    /// Numeric id, unique within one store
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Outcome of a subscriber callback
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Callback for queue events
pub type EventCallback<P, T> = Arc<dyn Fn(&QueueEvent<P, T>) -> HandlerResult + Send + Sync>;

struct CallbackEntry<P, T> {
    id: u64,
    filter: EventFilter,
    callback: EventCallback<P, T>,
}

struct ChannelEntry<P, T> {
    id: u64,
    filter: EventFilter,
    sender: UnboundedSender<QueueEvent<P, T>>,
}

/// Notifications waiting for delivery, in commit order
struct DispatchQueue<P, T> {
    draining: bool,
    pending: VecDeque<QueueEvent<P, T>>,
}

/// Registry of subscribers and the dispatch loop
///
/// Mutators enqueue their notification while still holding the store lock,
/// so the pending queue follows commit order. Whichever thread finds the
/// queue idle drains it; a notification raised by a callback, or by another
/// thread mid-drain, is appended and delivered after the current one.
/// Callbacks are snapshotted before they run, so a callback may subscribe,
/// unsubscribe or mutate the store without deadlocking.
pub(crate) struct EventBus<P, T> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<CallbackEntry<P, T>>>,
    channels: Mutex<Vec<ChannelEntry<P, T>>>,
    queue: Mutex<DispatchQueue<P, T>>,
}

impl<P, T> EventBus<P, T>
where
    P: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: RwLock::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            queue: Mutex::new(DispatchQueue {
                draining: false,
                pending: VecDeque::new(),
            }),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn add_callback(
        &self,
        filter: EventFilter,
        callback: EventCallback<P, T>,
    ) -> Subscription {
        let id = self.allocate_id();
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CallbackEntry {
                id,
                filter,
                callback,
            });
        Subscription { id }
    }

    pub(crate) fn add_channel(
        &self,
        filter: EventFilter,
    ) -> (Subscription, UnboundedReceiver<QueueEvent<P, T>>) {
        let id = self.allocate_id();
        let (sender, receiver) = unbounded_channel();
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ChannelEntry { id, filter, sender });
        (Subscription { id }, receiver)
    }

    pub(crate) fn remove(&self, subscription: Subscription) -> bool {
        let mut callbacks = self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = callbacks.iter().position(|e| e.id == subscription.id) {
            callbacks.remove(pos);
            return true;
        }
        drop(callbacks);

        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = channels.iter().position(|e| e.id == subscription.id) {
            channels.remove(pos);
            return true;
        }
        false
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        callbacks + channels
    }

    /// Queue a notification for delivery
    ///
    /// Called with the store lock held; never runs subscriber code.
    pub(crate) fn enqueue(&self, event: QueueEvent<P, T>) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .push_back(event);
    }

    /// Deliver pending notifications in FIFO order
    ///
    /// Returns at once if another frame (a re-entrant callback on this
    /// thread, or another thread) is already draining; that frame picks up
    /// anything queued here.
    pub(crate) fn drain(&self) {
        {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        loop {
            let event = {
                let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
                match queue.pending.pop_front() {
                    Some(event) => event,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.deliver(&event);
        }
    }

    /// Deliver one notification to every matching subscriber
    ///
    /// Channel subscribers are fed first, then callbacks run in registration
    /// order. A failing or panicking callback is logged and does not stop
    /// the rest.
    fn deliver(&self, event: &QueueEvent<P, T>) {
        let kind = event.kind();
        let tenant_id = event.tenant_id();

        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.retain(|entry| {
            if !entry.filter.matches(kind, tenant_id) {
                return true;
            }
            let delivered = entry.sender.send(event.clone()).is_ok();
            if !delivered {
                debug!(subscription = entry.id, "Dropping closed event channel");
            }
            delivered
        });
        drop(channels);

        let matching: Vec<(u64, EventCallback<P, T>)> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.filter.matches(kind, tenant_id))
            .map(|entry| (entry.id, Arc::clone(&entry.callback)))
            .collect();

        for (id, callback) in matching {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => panic_message(&*payload),
            };
            let err = QueueError::Handler { kind, message };
            error!(tenant_id, subscription = id, "{}", err);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
