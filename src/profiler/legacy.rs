//! Per-thread legacy event lists.
//!
//! Retained for backward-compatible consumers: session markers and memory
//! allocation events are recorded here rather than in the correlated trace.

use crate::profiler::collector::DeviceType;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LegacyEventKind {
    Mark,
    MemoryAlloc,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegacyEvent {
    pub kind: LegacyEventKind,
    pub name: String,
    pub thread_id: u64,
    pub timestamp_us: u64,
    /// Signed: negative for frees.
    pub alloc_bytes: i64,
    pub device: DeviceType,
}

impl LegacyEvent {
    pub fn mark(name: impl Into<String>, thread_id: u64, timestamp_us: u64) -> Self {
        Self {
            kind: LegacyEventKind::Mark,
            name: name.into(),
            thread_id,
            timestamp_us,
            alloc_bytes: 0,
            device: DeviceType::Host,
        }
    }

    pub fn memory_alloc(
        thread_id: u64,
        timestamp_us: u64,
        alloc_bytes: i64,
        device: DeviceType,
    ) -> Self {
        Self {
            kind: LegacyEventKind::MemoryAlloc,
            name: String::new(),
            thread_id,
            timestamp_us,
            alloc_bytes,
            device,
        }
    }
}

/// Events grouped by recording thread, in per-thread append order.
#[derive(Debug, Default)]
pub struct ThreadEventLists {
    lists: HashMap<u64, Vec<LegacyEvent>>,
}

impl ThreadEventLists {
    pub fn record(&mut self, event: LegacyEvent) {
        self.lists.entry(event.thread_id).or_default().push(event);
    }

    /// Flatten into one list per thread, ordered by thread id for
    /// deterministic output.
    pub fn consolidate(self) -> Vec<Vec<LegacyEvent>> {
        let mut entries: Vec<_> = self.lists.into_iter().collect();
        entries.sort_by_key(|(tid, _)| *tid);
        entries.into_iter().map(|(_, events)| events).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
