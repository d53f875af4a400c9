//! Stable object identities used for reverse cache lookups.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity assigned to every array, dataset and material at creation.
///
/// Derived objects (conversions, remaps, copies) always receive a fresh id, so
/// an id recovered from a cache names the object that was stored. The one
/// exception is an in-place edit of a shared [`Dataset`](crate::Dataset)
/// through `Arc::make_mut`: the edited clone keeps the id of the cached
/// original, so it still resolves to the key the original was served under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocates the next unused identity.
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
