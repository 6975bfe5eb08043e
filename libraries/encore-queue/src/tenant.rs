//! Per-tenant queue handle
//!
//! Binds one tenant id to a shared [`QueueStore`] for callers that only ever
//! deal with a single guild, such as a voice-connection task.

use crate::events::{EventFilter, HandlerResult, QueueEvent, QueueEventKind, Subscription};
use crate::store::QueueStore;
use crate::types::QueueItem;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A tenant's view of the shared store
///
/// Cheap to clone. Every method delegates to the store with the bound
/// tenant id. Subscriptions made through the handle only see this tenant.
pub struct TenantQueue<P, T> {
    store: Arc<QueueStore<P, T>>,
    tenant_id: String,
}

impl<P, T> Clone for TenantQueue<P, T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tenant_id: self.tenant_id.clone(),
        }
    }
}

impl<P, T> TenantQueue<P, T>
where
    P: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub(crate) fn new(store: Arc<QueueStore<P, T>>, tenant_id: String) -> Self {
        Self { store, tenant_id }
    }

    /// Tenant this handle is bound to
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The shared store behind this handle
    pub fn store(&self) -> &Arc<QueueStore<P, T>> {
        &self.store
    }

    /// Append an item; see [`QueueStore::insert`]
    pub fn insert(&self, item: QueueItem<P, T>) {
        self.store.insert(&self.tenant_id, item);
    }

    /// Skip the head; see [`QueueStore::skip`]
    pub fn skip(&self) -> bool {
        self.store.skip(&self.tenant_id)
    }

    /// Advance past the head; see [`QueueStore::advance`]
    pub fn advance(&self) -> bool {
        self.store.advance(&self.tenant_id)
    }

    /// Remove the head by policy; see [`QueueStore::remove_current`]
    pub fn remove_current(&self) -> bool {
        self.store.remove_current(&self.tenant_id)
    }

    /// Clear per the store's [`ClearMode`](crate::ClearMode)
    pub fn clear_current(&self) -> bool {
        self.store.clear_current(&self.tenant_id)
    }

    /// Snapshot of this tenant's queue
    pub fn get_all(&self) -> Vec<Arc<QueueItem<P, T>>> {
        self.store.get_all(&self.tenant_id)
    }

    /// Number of queued items
    pub fn length(&self) -> usize {
        self.store.length(&self.tenant_id)
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.store.is_empty(&self.tenant_id)
    }

    /// Item at the front of the queue
    pub fn head(&self) -> Option<Arc<QueueItem<P, T>>> {
        self.store.head(&self.tenant_id)
    }

    /// Run `handler` for notifications of `kind` about this tenant only
    pub fn on<F>(&self, kind: QueueEventKind, handler: F) -> Subscription
    where
        F: Fn(&QueueEvent<P, T>) -> HandlerResult + Send + Sync + 'static,
    {
        let filter = EventFilter::kinds(&[kind]).for_tenant(self.tenant_id.as_str());
        self.store.subscribe_filtered(filter, handler)
    }

    /// Channel of every notification about this tenant
    pub fn events(&self) -> (Subscription, UnboundedReceiver<QueueEvent<P, T>>) {
        self.store
            .subscribe_channel(EventFilter::all().for_tenant(self.tenant_id.as_str()))
    }

    /// Stop delivering to a subscription made through this handle
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.store.unsubscribe(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handle_delegates_to_shared_store() {
        let store: Arc<QueueStore<u8, ()>> = Arc::new(QueueStore::new());
        let guild = store.tenant("g1");

        guild.insert(QueueItem::new(1, ()));
        guild.insert(QueueItem::new(2, ()));

        assert_eq!(guild.tenant_id(), "g1");
        assert_eq!(guild.length(), 2);
        assert_eq!(store.length("g1"), 2);
        assert!(guild.skip());
        assert_eq!(guild.head().map(|i| i.payload), Some(2));
    }

    #[test]
    fn handle_subscription_ignores_other_tenants() {
        let store: Arc<QueueStore<u8, ()>> = Arc::new(QueueStore::new());
        let guild = store.tenant("g1");
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        guild.on(QueueEventKind::Inserted, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        store.insert("g2", QueueItem::new(1, ()));
        guild.insert(QueueItem::new(2, ()));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
