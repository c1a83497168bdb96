use crate::protocol::StreamId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of stream identifiers
///
/// Implementations must return strictly increasing values for the lifetime of
/// the process. Identifiers are never reused, even after a stream completes.
pub trait IdSequence: Send + Sync {
    /// Allocate the next identifier
    fn next(&self) -> StreamId;
}

/// Monotonic counter stepping by one
#[derive(Debug)]
pub struct Sequential {
    next: AtomicU64,
}

impl Sequential {
    /// Create a sequence whose first identifier is `first`
    pub fn new(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdSequence for Sequential {
    fn next(&self) -> StreamId {
        StreamId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
