//! Per-session recording state and the region enter/exit hot path.
//!
//! The hot path is split in two: all metadata capture happens lock-free on
//! the entering/exiting thread, and the only serialized portion is the O(1)
//! append of the finished record under the buffer mutex.

use crate::profiler::collector::{
    Activity, CpuTraceBuffer, TraceCollector, TAG_CPU_REGION,
};
use crate::profiler::correlation::{next_correlation_id, CorrelationId};
use crate::profiler::error::{ProfilerError, Result};
use crate::profiler::legacy::{LegacyEvent, ThreadEventLists};
use crate::profiler::record::{
    compute_flops, current_thread_id, wall_time_us, EventRecord,
};
use crate::profiler::region::{RecordScope, Region};
use std::sync::{Arc, Mutex};

/// Recognized session configuration options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub collect_cpu_activities: bool,
    pub collect_accelerator_activities: bool,
    pub report_input_shapes: bool,
    pub record_call_stack: bool,
    pub compute_flops_estimate: bool,
    pub record_memory_usage: bool,
}

/// Everything captured at region entry, carried to the (possibly different)
/// exiting thread.
struct ActiveRegion {
    session: Arc<SessionState>,
    correlation_id: CorrelationId,
    start_us: u64,
    start_thread_id: u64,
    sequence_number: i64,
    forward_thread_id: u64,
    scope: RecordScope,
    is_async: bool,
    shapes: Option<Vec<Vec<i64>>>,
    dtypes: Option<Vec<String>>,
    stack: Option<Vec<String>>,
}

/// Opaque per-region context returned by [`SessionState::begin_region`].
///
/// The no-op sentinel allocates nothing; it is returned whenever no session
/// is armed or CPU activities were not requested, and makes the matching
/// exit a cheap early return.
pub struct RegionContext(Option<Box<ActiveRegion>>);

impl RegionContext {
    pub fn noop() -> Self {
        RegionContext(None)
    }

    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }

    /// Correlation id issued at entry, `UNSET` for the no-op sentinel.
    pub fn correlation_id(&self) -> CorrelationId {
        self.0
            .as_ref()
            .map(|a| a.correlation_id)
            .unwrap_or(CorrelationId::UNSET)
    }
}

/// The two append-only buffers grown in lockstep on every completed region.
pub struct SessionBuffers {
    pub records: Vec<EventRecord>,
    pub trace: CpuTraceBuffer,
}

/// State owned by one enable-to-disable tracing interval.
pub struct SessionState {
    config: SessionConfig,
    collector: Arc<dyn TraceCollector>,
    /// `None` after ownership was transferred to the collector; appends
    /// arriving after that point are dropped silently.
    buffers: Mutex<Option<SessionBuffers>>,
    legacy: Mutex<ThreadEventLists>,
}

impl SessionState {
    pub fn new(config: SessionConfig, collector: Arc<dyn TraceCollector>) -> Self {
        let trace = CpuTraceBuffer::new("optrace session", wall_time_us());
        Self {
            config,
            collector,
            buffers: Mutex::new(Some(SessionBuffers {
                records: Vec::new(),
                trace,
            })),
            legacy: Mutex::new(ThreadEventLists::default()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn collector(&self) -> &Arc<dyn TraceCollector> {
        &self.collector
    }

    /// Region entry: issue a correlation id, push it for backend
    /// sub-events, and capture start metadata. Entirely lock-free.
    pub fn begin_region(self: &Arc<Self>, region: &Region) -> RegionContext {
        if !self.config.collect_cpu_activities {
            return RegionContext::noop();
        }

        let correlation_id = next_correlation_id();
        self.collector.push_correlation(correlation_id);

        let (shapes, dtypes) = if self.config.report_input_shapes {
            (
                Some(region.input_shapes().to_vec()),
                Some(region.input_dtypes().to_vec()),
            )
        } else {
            (None, None)
        };

        // Backward regions attribute their stack to the paired forward
        // region, so skip capture for them entirely.
        let stack = if self.config.record_call_stack
            && region.scope() != RecordScope::BackwardFunction
        {
            Some(region.stack().to_vec())
        } else {
            None
        };

        RegionContext(Some(Box::new(ActiveRegion {
            session: self.clone(),
            correlation_id,
            start_us: wall_time_us(),
            start_thread_id: current_thread_id(),
            sequence_number: region.sequence_number(),
            forward_thread_id: region.forward_thread_id(),
            scope: region.scope(),
            is_async: region.is_async(),
            shapes,
            dtypes,
            stack,
        })))
    }

    /// Region exit: may run on a different thread than the entry. Appends
    /// the finished record under the buffer lock and pops the correlation
    /// stack. A no-op context returns immediately.
    pub fn end_region(region: &Region, ctx: RegionContext) {
        let Some(active) = ctx.0 else {
            return;
        };
        let session = active.session.clone();

        let end_us = wall_time_us();
        let end_thread_id = current_thread_id();

        let flops = if session.config.compute_flops_estimate {
            active
                .shapes
                .as_deref()
                .or(Some(region.input_shapes()))
                .and_then(|shapes| compute_flops(region.name(), shapes))
        } else {
            None
        };

        let record = EventRecord {
            name: region.name().to_string(),
            start_us: active.start_us,
            end_us,
            correlation_id: active.correlation_id,
            start_thread_id: active.start_thread_id,
            end_thread_id,
            sequence_number: active.sequence_number,
            forward_thread_id: active.forward_thread_id,
            scope: active.scope,
            is_async: active.is_async,
            shapes: active.shapes,
            dtypes: active.dtypes,
            stack: active.stack,
            flops,
        };

        let activity = Activity {
            name: record.name.clone(),
            device_index: 0,
            resource_id: end_thread_id as i64,
            start_us: record.start_us,
            duration_us: record.duration_us(),
            type_tag: TAG_CPU_REGION,
            correlation_id: record.correlation_id,
            linked_correlation_id: CorrelationId::UNSET,
            metadata: Vec::new(),
        };

        {
            let mut buffers = session.buffers.lock().unwrap();
            if let Some(buffers) = buffers.as_mut() {
                buffers.records.push(record);
                buffers.trace.activities.push(activity);
            }
            // Buffers already transferred: the session is draining and this
            // partial region is dropped, never emitted.
        }

        session.collector.pop_correlation();
    }

    /// Record a synthetic marker (e.g. `__start_profile`) into the legacy
    /// per-thread lists.
    pub fn mark(&self, name: &str) {
        self.legacy.lock().unwrap().record(LegacyEvent::mark(
            name,
            current_thread_id(),
            wall_time_us(),
        ));
    }

    /// Record a memory allocation event when the session asked for them.
    /// Negative sizes represent frees.
    pub fn record_memory_alloc(
        &self,
        alloc_bytes: i64,
        device: crate::profiler::collector::DeviceType,
    ) {
        if !self.config.record_memory_usage {
            return;
        }
        self.legacy.lock().unwrap().record(LegacyEvent::memory_alloc(
            current_thread_id(),
            wall_time_us(),
            alloc_bytes,
            device,
        ));
    }

    /// Stamp the CPU buffer's end timestamp at drain time.
    pub fn stamp_end(&self, end_us: u64) {
        if let Some(buffers) = self.buffers.lock().unwrap().as_mut() {
            buffers.trace.span_end_us = end_us;
        }
    }

    /// Take exclusive ownership of the buffers for the handoff to the
    /// collector. After this the session performs no further buffer
    /// mutation.
    pub fn take_buffers(&self) -> Result<SessionBuffers> {
        self.buffers
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ProfilerError::State("session buffers already transferred".into()))
    }

    pub fn take_legacy(&self) -> ThreadEventLists {
        std::mem::take(&mut self.legacy.lock().unwrap())
    }

    /// Number of completed records currently buffered.
    pub fn record_count(&self) -> usize {
        self.buffers
            .lock()
            .unwrap()
            .as_ref()
            .map(|b| b.records.len())
            .unwrap_or(0)
    }
}
