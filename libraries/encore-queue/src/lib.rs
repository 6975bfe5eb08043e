//! Encore - Guild Queue Management
//!
//! Per-guild playback ordering for Encore.
//!
//! This crate provides:
//! - One ordered queue per tenant (guild/room/session), created on first insert
//! - Head consumption: advance, skip, remove and clear
//! - Typed change notifications (callbacks or async channels)
//! - A per-tenant handle over the shared store
//!
//! # Architecture
//!
//! `encore-queue` knows nothing about audio:
//! - No decoding, no transport, no voice connections
//! - Queue items carry an opaque payload (the prepared, playable resource)
//!   plus caller metadata
//! - Consumers react to notifications by starting playback of the new head,
//!   or idling when there is none
//!
//! # Example: Basic Queue
//!
//! ```rust
//! use encore_queue::{QueueItem, QueueStore};
//!
//! let store: QueueStore<&str, String> = QueueStore::new();
//!
//! // Start the next track whenever the current one ends
//! store.on_advanced(|guild, head| {
//!     match head {
//!         Some(track) => println!("[{guild}] now playing {}", track.data),
//!         None => println!("[{guild}] queue finished"),
//!     }
//!     Ok(())
//! });
//!
//! store.insert("guild-1", QueueItem::new("a.opus", "Song A".to_string()));
//! store.insert("guild-1", QueueItem::new("b.opus", "Song B".to_string()));
//!
//! store.advance("guild-1");
//! assert_eq!(store.length("guild-1"), 1);
//! assert_eq!(store.length("guild-2"), 0);
//! ```
//!
//! # Example: Per-Guild Handle
//!
//! ```rust
//! use encore_queue::{QueueEventKind, QueueItem, QueueStore};
//! use std::sync::Arc;
//!
//! let store: Arc<QueueStore<u32, ()>> = Arc::new(QueueStore::new());
//! let guild = store.tenant("guild-1");
//!
//! // Only fires for guild-1
//! guild.on(QueueEventKind::Skipped, |event| {
//!     println!("skipped, next: {:?}", event.head().map(|t| t.payload));
//!     Ok(())
//! });
//!
//! guild.insert(QueueItem::new(1, ()));
//! guild.skip();
//! assert!(guild.is_empty());
//! ```

mod config;
mod error;
mod events;
mod store;
mod tenant;
pub mod types;

// Public exports
pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use events::{
    EventCallback, EventFilter, HandlerResult, QueueEvent, QueueEventKind, Subscription,
};
pub use store::QueueStore;
pub use tenant::TenantQueue;
pub use types::{ClearMode, QueueItem};
