//! Core types for queue management

use serde::{Deserialize, Serialize};

/// A single queued track
///
/// `payload` is the prepared, playable resource (for example a transcoded
/// stream handle). The queue never looks inside it. `data` is whatever
/// metadata the caller wants to travel with the track: title, requester,
/// duration and so on.
///
/// Items have no identity of their own. Equality, when `P` and `T` support
/// it, is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem<P, T> {
    /// Opaque playable resource
    pub payload: P,

    /// Caller-supplied metadata
    pub data: T,
}

impl<P, T> QueueItem<P, T> {
    /// Create a new queue item
    pub fn new(payload: P, data: T) -> Self {
        Self { payload, data }
    }

    /// Split the item back into payload and metadata
    pub fn into_parts(self) -> (P, T) {
        (self.payload, self.data)
    }
}

/// What `clear_current` does to a tenant's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearMode {
    /// Remove only the head, like skip/advance/remove (legacy behaviour)
    #[default]
    Head,

    /// Empty the whole queue
    All,
}
