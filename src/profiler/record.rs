//! Completed-region records and the clock/thread-id helpers that stamp them.

use crate::profiler::correlation::CorrelationId;
use crate::profiler::region::RecordScope;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Microsecond-resolution wall-clock timestamp.
pub fn wall_time_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// OS thread id of the calling thread, cached per thread.
///
/// Getting the linux tid is a syscall, so cache it. Caching tids is not
/// advisable in the general case (fork, clone), but this is only for
/// profiling purposes.
#[cfg(target_os = "linux")]
pub fn current_thread_id() -> u64 {
    use std::cell::Cell;

    thread_local! {
        // 0 means not yet resolved.
        static CACHED_TID: Cell<u64> = const { Cell::new(0) };
    }

    CACHED_TID.with(|cell| {
        let cached = cell.get();
        if cached != 0 {
            return cached;
        }
        // SAFETY: SYS_gettid takes no arguments and always succeeds; unsafe
        // is required because syscall() is a raw FFI function.
        let tid = unsafe { libc::syscall(libc::SYS_gettid) } as u64;
        cell.set(tid);
        tid
    })
}

#[cfg(not(target_os = "linux"))]
pub fn current_thread_id() -> u64 {
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static CACHED_TID: Cell<u64> = const { Cell::new(0) };
    }

    CACHED_TID.with(|cell| {
        let cached = cell.get();
        if cached != 0 {
            return cached;
        }
        let tid = NEXT.fetch_add(1, Ordering::Relaxed);
        cell.set(tid);
        tid
    })
}

/// One completed instrumented region: timing plus whatever metadata the
/// session configuration asked for. A single concrete struct with explicit
/// present/absent markers per optional field — no dispatch on the hot path.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub name: String,
    pub start_us: u64,
    pub end_us: u64,
    pub correlation_id: CorrelationId,
    pub start_thread_id: u64,
    /// May differ from `start_thread_id` for async regions.
    pub end_thread_id: u64,
    /// -1 means "not part of a forward/backward pairing".
    pub sequence_number: i64,
    /// Thread that owned the paired forward region; meaningful only when
    /// `sequence_number >= 0`.
    pub forward_thread_id: u64,
    pub scope: RecordScope,
    pub is_async: bool,
    pub shapes: Option<Vec<Vec<i64>>>,
    pub dtypes: Option<Vec<String>>,
    pub stack: Option<Vec<String>>,
    pub flops: Option<u64>,
}

impl EventRecord {
    pub fn duration_us(&self) -> u64 {
        self.end_us.saturating_sub(self.start_us)
    }

    pub fn has_shapes(&self) -> bool {
        self.shapes.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_dtypes(&self) -> bool {
        self.dtypes.as_ref().is_some_and(|d| !d.is_empty())
    }

    pub fn has_stack(&self) -> bool {
        self.stack.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Estimate floating-point operations from the region name and input shapes.
/// Returns `None` for ops without a known cost model.
pub fn compute_flops(name: &str, shapes: &[Vec<i64>]) -> Option<u64> {
    let base = name.rsplit("::").next().unwrap_or(name);
    match base {
        "mm" | "matmul" | "addmm" => {
            // [m, k] x [k, n] -> 2 * m * k * n
            let a = shapes.first()?;
            let b = shapes.get(1)?;
            if a.len() != 2 || b.len() != 2 || a[1] != b[0] {
                return None;
            }
            Some(2 * (a[0] as u64) * (a[1] as u64) * (b[1] as u64))
        }
        "bmm" => {
            // [b, m, k] x [b, k, n] -> b * 2 * m * k * n
            let a = shapes.first()?;
            let b = shapes.get(1)?;
            if a.len() != 3 || b.len() != 3 || a[0] != b[0] || a[2] != b[1] {
                return None;
            }
            Some(2 * (a[0] as u64) * (a[1] as u64) * (a[2] as u64) * (b[2] as u64))
        }
        "add" | "sub" | "mul" | "div" => {
            // One op per output element.
            let a = shapes.first()?;
            Some(a.iter().map(|&d| d.max(0) as u64).product())
        }
        _ => None,
    }
}
