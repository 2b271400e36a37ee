//! Process-wide correlation id issuance.
//!
//! A correlation id is the join key linking a CPU-side region record to the
//! backend activities it caused. Ids are issued monotonically for the whole
//! process lifetime, never per session.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque 64-bit correlation id. Zero is reserved for "unset" and is never
/// issued by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub const UNSET: CorrelationId = CorrelationId(0);

    pub const fn from_u64(raw: u64) -> Self {
        CorrelationId(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_set(self) -> bool {
        self.0 != 0
    }
}

/// Wait-free monotonic id source. Safe under unbounded concurrent calls;
/// wraps only after 2^64 issuances.
pub struct CorrelationAllocator {
    next: AtomicU64,
}

impl Default for CorrelationAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> CorrelationId {
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

static ALLOCATOR: CorrelationAllocator = CorrelationAllocator::new();

/// Issue the next process-wide correlation id.
pub fn next_correlation_id() -> CorrelationId {
    ALLOCATOR.next()
}
