//! Tenant-keyed queue store
//!
//! One ordered queue per tenant (guild/room/session):
//! ```text
//! "guild-1": [Track A] [Track B] [Track C]
//!             ^ head (next to vacate on advance/skip/remove/clear)
//! "guild-2": [Track X]
//! "guild-3": (empty, still known)
//! ```
//! Every successful mutation is followed by exactly one notification.

use crate::config::QueueConfig;
use crate::events::{
    EventBus, EventCallback, EventFilter, HandlerResult, QueueEvent, QueueEventKind, Subscription,
};
use crate::tenant::TenantQueue;
use crate::types::{ClearMode, QueueItem};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace};

type Items<P, T> = VecDeque<Arc<QueueItem<P, T>>>;

/// The four ways the head leaves a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadRemoval {
    Advance,
    Skip,
    Remove,
    Clear,
}

impl HeadRemoval {
    fn kind(self) -> QueueEventKind {
        match self {
            HeadRemoval::Advance => QueueEventKind::Advanced,
            HeadRemoval::Skip => QueueEventKind::Skipped,
            HeadRemoval::Remove => QueueEventKind::Removed,
            HeadRemoval::Clear => QueueEventKind::Cleared,
        }
    }

    fn into_event<P, T>(
        self,
        tenant_id: String,
        head: Option<Arc<QueueItem<P, T>>>,
    ) -> QueueEvent<P, T> {
        match self {
            HeadRemoval::Advance => QueueEvent::Advanced { tenant_id, head },
            HeadRemoval::Skip => QueueEvent::Skipped { tenant_id, head },
            HeadRemoval::Remove => QueueEvent::Removed { tenant_id, head },
            HeadRemoval::Clear => QueueEvent::Cleared { tenant_id, head },
        }
    }
}

/// Per-tenant playback queues with change notifications
///
/// The store is `Send + Sync`; share it with `Arc`. Every mutator takes the
/// store-wide write lock, commits, queues its notification, releases the
/// lock and only then runs subscribers, so subscribers may call back into
/// the store. Notifications reach every subscriber in commit order. A
/// mutation made from inside a callback, or on another thread while
/// notifications are being delivered, is announced after the current
/// notification has reached every subscriber, and handlers then run on the
/// thread that is already delivering.
///
/// Unknown tenants are never an error: mutators do nothing and readers
/// return empty results.
pub struct QueueStore<P, T> {
    config: QueueConfig,
    queues: RwLock<HashMap<String, Items<P, T>>>,
    events: EventBus<P, T>,
}

impl<P, T> QueueStore<P, T>
where
    P: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// Create an empty store with default configuration
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create an empty store
    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            config,
            queues: RwLock::new(HashMap::new()),
            events: EventBus::new(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Handle bound to a single tenant
    pub fn tenant(self: &Arc<Self>, tenant_id: impl Into<String>) -> TenantQueue<P, T> {
        TenantQueue::new(Arc::clone(self), tenant_id.into())
    }

    // ===== Mutators =====

    /// Append an item to the end of a tenant's queue
    ///
    /// Creates the tenant's queue on first use. Emits `Inserted`.
    pub fn insert(&self, tenant_id: &str, item: QueueItem<P, T>) {
        let item = Arc::new(item);
        {
            let mut queues = self.write();
            let queue = queues
                .entry(tenant_id.to_string())
                .or_insert_with(|| VecDeque::with_capacity(self.config.tenant_capacity));
            queue.push_back(Arc::clone(&item));
            debug!(tenant_id, len = queue.len(), "Inserted item");
            self.events.enqueue(QueueEvent::Inserted {
                tenant_id: tenant_id.to_string(),
                item,
            });
        }
        self.events.drain();
    }

    /// Drop the current head because playback was abandoned early
    ///
    /// Emits `Skipped` with the new head. Returns `false` (and emits
    /// nothing) if the tenant is unknown or its queue is empty.
    pub fn skip(&self, tenant_id: &str) -> bool {
        self.remove_head(tenant_id, HeadRemoval::Skip)
    }

    /// Drop the current head because it finished playing
    ///
    /// Emits `Advanced` with the new head. No-op on an empty queue.
    pub fn advance(&self, tenant_id: &str) -> bool {
        self.remove_head(tenant_id, HeadRemoval::Advance)
    }

    /// Drop the current head by policy, e.g. it failed to prepare
    ///
    /// Emits `Removed` with the new head. No-op on an empty queue.
    pub fn remove_current(&self, tenant_id: &str) -> bool {
        self.remove_head(tenant_id, HeadRemoval::Remove)
    }

    /// Clear the tenant's queue
    ///
    /// With [`ClearMode::Head`] (the default) only the head is removed, the
    /// same as [`remove_current`](Self::remove_current). With
    /// [`ClearMode::All`] every item is removed. Either way exactly one
    /// `Cleared` notification is emitted, and nothing happens on an empty
    /// queue.
    pub fn clear_current(&self, tenant_id: &str) -> bool {
        match self.config.clear_mode {
            ClearMode::Head => self.remove_head(tenant_id, HeadRemoval::Clear),
            ClearMode::All => self.remove_all(tenant_id),
        }
    }

    /// Forget tenants whose queues are empty
    ///
    /// Mutators never delete a tenant entry, so long-running hosts call this
    /// on their own schedule. Returns how many entries were dropped. Emits
    /// nothing.
    pub fn purge_empty(&self) -> usize {
        let mut queues = self.write();
        let before = queues.len();
        queues.retain(|_, items| !items.is_empty());
        let purged = before - queues.len();
        if purged > 0 {
            debug!(purged, "Purged empty tenant queues");
        }
        purged
    }

    fn remove_head(&self, tenant_id: &str, removal: HeadRemoval) -> bool {
        {
            let mut queues = self.write();
            let Some(queue) = queues.get_mut(tenant_id) else {
                trace!(tenant_id, kind = %removal.kind(), "Unknown tenant, nothing to remove");
                return false;
            };
            if queue.pop_front().is_none() {
                trace!(tenant_id, kind = %removal.kind(), "Queue empty, nothing to remove");
                return false;
            }
            debug!(tenant_id, kind = %removal.kind(), len = queue.len(), "Removed head");
            let head = queue.front().cloned();
            self.events
                .enqueue(removal.into_event(tenant_id.to_string(), head));
        }
        self.events.drain();
        true
    }

    fn remove_all(&self, tenant_id: &str) -> bool {
        {
            let mut queues = self.write();
            match queues.get_mut(tenant_id) {
                Some(queue) if !queue.is_empty() => {
                    debug!(tenant_id, removed = queue.len(), "Cleared queue");
                    queue.clear();
                    self.events.enqueue(QueueEvent::Cleared {
                        tenant_id: tenant_id.to_string(),
                        head: None,
                    });
                }
                _ => {
                    trace!(tenant_id, "Queue empty or unknown, nothing to clear");
                    return false;
                }
            }
        }
        self.events.drain();
        true
    }

    // ===== Readers =====

    /// Snapshot of a tenant's queue in playback order
    ///
    /// The returned `Vec` is detached from the store. Empty for unknown
    /// tenants.
    pub fn get_all(&self, tenant_id: &str) -> Vec<Arc<QueueItem<P, T>>> {
        self.read_queue(tenant_id, |items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of queued items (0 for unknown tenants)
    pub fn length(&self, tenant_id: &str) -> usize {
        self.read_queue(tenant_id, |items| items.len()).unwrap_or(0)
    }

    /// Check if a tenant has nothing queued
    pub fn is_empty(&self, tenant_id: &str) -> bool {
        self.length(tenant_id) == 0
    }

    /// Next item to play, without removing it
    pub fn head(&self, tenant_id: &str) -> Option<Arc<QueueItem<P, T>>> {
        self.read_queue(tenant_id, |items| items.front().cloned())
            .flatten()
    }

    /// Tenants the store knows about, sorted
    ///
    /// Includes tenants whose queues have drained but were not purged.
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        tenants.sort();
        tenants
    }

    /// Number of known tenants
    pub fn tenant_count(&self) -> usize {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // ===== Subscriptions =====

    /// Run `handler` for every future notification of `kind`
    ///
    /// Handlers run synchronously after the mutation commits, in
    /// registration order. An `Err` or a panic is logged and swallowed.
    pub fn subscribe<F>(&self, kind: QueueEventKind, handler: F) -> Subscription
    where
        F: Fn(&QueueEvent<P, T>) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_filtered(EventFilter::kinds(&[kind]), handler)
    }

    /// Run `handler` for every notification passing `filter`
    pub fn subscribe_filtered<F>(&self, filter: EventFilter, handler: F) -> Subscription
    where
        F: Fn(&QueueEvent<P, T>) -> HandlerResult + Send + Sync + 'static,
    {
        let callback: EventCallback<P, T> = Arc::new(handler);
        self.events.add_callback(filter, callback)
    }

    /// Receive notifications passing `filter` over an unbounded channel
    ///
    /// Sending never blocks the mutator. Dropping the receiver ends the
    /// subscription on the next matching notification.
    pub fn subscribe_channel(
        &self,
        filter: EventFilter,
    ) -> (Subscription, UnboundedReceiver<QueueEvent<P, T>>) {
        self.events.add_channel(filter)
    }

    /// Stop delivering to a subscription
    ///
    /// Returns `false` if it was already removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.events.remove(subscription)
    }

    /// Number of live callback and channel subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    /// Typed subscription to `Inserted`: `(tenant_id, inserted item)`
    pub fn on_inserted<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str, &Arc<QueueItem<P, T>>) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(QueueEventKind::Inserted, move |event| match event {
            QueueEvent::Inserted { tenant_id, item } => handler(tenant_id.as_str(), item),
            _ => Ok(()),
        })
    }

    /// Typed subscription to `Advanced`: `(tenant_id, new head)`
    pub fn on_advanced<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str, Option<&Arc<QueueItem<P, T>>>) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_head_change(QueueEventKind::Advanced, handler)
    }

    /// Typed subscription to `Skipped`: `(tenant_id, new head)`
    pub fn on_skipped<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str, Option<&Arc<QueueItem<P, T>>>) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_head_change(QueueEventKind::Skipped, handler)
    }

    /// Typed subscription to `Removed`: `(tenant_id, new head)`
    pub fn on_removed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str, Option<&Arc<QueueItem<P, T>>>) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_head_change(QueueEventKind::Removed, handler)
    }

    /// Typed subscription to `Cleared`: `(tenant_id, new head)`
    pub fn on_cleared<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str, Option<&Arc<QueueItem<P, T>>>) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_head_change(QueueEventKind::Cleared, handler)
    }

    fn on_head_change<F>(&self, kind: QueueEventKind, handler: F) -> Subscription
    where
        F: Fn(&str, Option<&Arc<QueueItem<P, T>>>) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(kind, move |event| handler(event.tenant_id(), event.head()))
    }

    // ===== Internals =====

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Items<P, T>>> {
        self.queues.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_queue<R>(&self, tenant_id: &str, f: impl FnOnce(&Items<P, T>) -> R) -> Option<R> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tenant_id)
            .map(f)
    }
}

impl<P, T> Default for QueueStore<P, T>
where
    P: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
