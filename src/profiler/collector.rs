//! Bridge to the external backend trace collector.
//!
//! The backend collector is an external collaborator: it receives a
//! prepare/start/stop sequence plus a correlation-id channel, and returns an
//! opaque list of timed activities when stopped. Its call sequence and the
//! CPU-buffer ownership handoff are part of this engine's protocol.

use crate::profiler::correlation::CorrelationId;
use crate::profiler::error::{ProfilerError, Result};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Mutex;

// Activity type tags as they arrive from the backend. Raw u8 wire codes: the
// backend is free to hand us tags we do not recognize, and an unrecognized
// tag at merge time is a fatal consistency error, never a silent default.
pub const TAG_CPU_REGION: u8 = 0;
pub const TAG_RUNTIME_CALL: u8 = 1;
pub const TAG_CROSS_PROCESS_LINK: u8 = 2;
pub const TAG_KERNEL: u8 = 3;
pub const TAG_MEMORY_COPY: u8 = 4;
pub const TAG_MEMORY_SET: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceType {
    Host,
    Accelerator,
}

/// Fixed tag → device classification table.
pub fn device_type_for_tag(tag: u8) -> Result<DeviceType> {
    match tag {
        TAG_KERNEL | TAG_MEMORY_COPY | TAG_MEMORY_SET => Ok(DeviceType::Accelerator),
        TAG_CPU_REGION | TAG_RUNTIME_CALL | TAG_CROSS_PROCESS_LINK => Ok(DeviceType::Host),
        other => Err(ProfilerError::Consistency(format!(
            "unknown activity type tag {other}"
        ))),
    }
}

/// Categories of activity a session can ask the collector to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Cpu,
    Accelerator,
}

pub type ActivityKindSet = HashSet<ActivityKind>;

/// One timed record produced by (or mirrored into) the backend collector.
#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub name: String,
    pub device_index: i32,
    /// Resource/queue id within the device (stream, thread, ...).
    pub resource_id: i64,
    pub start_us: u64,
    pub duration_us: u64,
    pub type_tag: u8,
    /// Meaningful only for `TAG_CPU_REGION` activities; other backend events
    /// must not be attributed to a CPU region through this field.
    pub correlation_id: CorrelationId,
    /// Correlation id of a causally-preceding activity, unset if none.
    pub linked_correlation_id: CorrelationId,
    /// Label/value annotations attached at finalize time.
    pub metadata: Vec<(String, String)>,
}

impl Activity {
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.push((key.into(), value.into()));
    }
}

/// Append-only buffer of CPU-side activities owned by the session until it
/// is handed to the collector at disable time.
#[derive(Debug, Clone, Serialize)]
pub struct CpuTraceBuffer {
    pub span_name: String,
    pub span_start_us: u64,
    pub span_end_us: u64,
    pub activities: Vec<Activity>,
}

impl CpuTraceBuffer {
    pub fn new(span_name: impl Into<String>, span_start_us: u64) -> Self {
        Self {
            span_name: span_name.into(),
            span_start_us,
            span_end_us: 0,
            activities: Vec::new(),
        }
    }
}

/// The collector's raw trace, returned by [`TraceCollector::stop`]. Opaque to
/// the merge step except for the activity list; kept around only so the
/// result can be saved in the collector's native format.
#[derive(Debug, Clone, Serialize)]
pub struct RawTrace {
    pub span_name: String,
    pub span_start_us: u64,
    pub span_end_us: u64,
    pub activities: Vec<Activity>,
    pub trace_metadata: Vec<(String, String)>,
}

/// Thin interface to the external backend collector.
pub trait TraceCollector: Send + Sync {
    /// Initialize/prepare the collector for the given activity categories.
    /// Must be idempotent; failure leaves the session Idle.
    fn prepare(&self, kinds: &ActivityKindSet) -> Result<()>;

    fn start(&self) -> Result<()>;

    /// Stop recording and return everything collected, including transferred
    /// CPU buffers.
    fn stop(&self) -> Result<RawTrace>;

    /// Push the enclosing region's correlation id onto the calling thread's
    /// stack so backend sub-events can self-attribute to it.
    fn push_correlation(&self, id: CorrelationId);

    fn pop_correlation(&self);

    /// One-way ownership handoff of the session's CPU activity buffer.
    fn transfer_buffer(&self, buffer: CpuTraceBuffer);

    /// Session-wide key/value annotation, independent of any single event.
    fn add_metadata(&self, key: &str, value: &str);
}

thread_local! {
    static CORRELATION_STACK: RefCell<Vec<CorrelationId>> = const { RefCell::new(Vec::new()) };
}

#[derive(Default)]
struct InProcessInner {
    prepared: Option<ActivityKindSet>,
    recording: bool,
    transferred: Vec<CpuTraceBuffer>,
    injected: Vec<Activity>,
    trace_metadata: Vec<(String, String)>,
}

/// In-process backend collector.
///
/// Stands in when no hardware collector is linked: it obeys the full
/// prepare/start/stop protocol, keeps the buffers transferred to it, and
/// lets callers inject synthetic backend activities (kernels, memory copies)
/// that show up in the raw trace returned by `stop()`.
#[derive(Default)]
pub struct InProcessCollector {
    inner: Mutex<InProcessInner>,
}

impl InProcessCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a backend activity to be returned by the next `stop()`.
    pub fn inject(&self, activity: Activity) {
        self.inner.lock().unwrap().injected.push(activity);
    }

    /// Inject a runtime-call activity attributed (via the linked correlation
    /// id) to the CPU region currently on the calling thread's stack.
    pub fn inject_runtime_call(&self, name: impl Into<String>, start_us: u64, duration_us: u64) {
        let linked = CORRELATION_STACK
            .with(|stack| stack.borrow().last().copied())
            .unwrap_or(CorrelationId::UNSET);
        self.inject(Activity {
            name: name.into(),
            device_index: 0,
            resource_id: 0,
            start_us,
            duration_us,
            type_tag: TAG_RUNTIME_CALL,
            correlation_id: CorrelationId::UNSET,
            linked_correlation_id: linked,
            metadata: Vec::new(),
        });
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().unwrap().recording
    }
}

impl TraceCollector for InProcessCollector {
    fn prepare(&self, kinds: &ActivityKindSet) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        // Re-preparing with the same or a new kind set is fine.
        inner.prepared = Some(kinds.clone());
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.prepared.is_none() {
            return Err(ProfilerError::BackendUnavailable(
                "collector started before prepare".into(),
            ));
        }
        inner.recording = true;
        Ok(())
    }

    fn stop(&self) -> Result<RawTrace> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.recording {
            return Err(ProfilerError::BackendUnavailable(
                "collector stopped while not recording".into(),
            ));
        }
        inner.recording = false;

        let mut activities: Vec<Activity> = Vec::new();
        let mut span_name = String::new();
        let mut span_start_us = 0;
        let mut span_end_us = 0;
        for buffer in inner.transferred.drain(..) {
            span_name = buffer.span_name;
            span_start_us = buffer.span_start_us;
            span_end_us = buffer.span_end_us;
            activities.extend(buffer.activities);
        }
        activities.append(&mut inner.injected);

        Ok(RawTrace {
            span_name,
            span_start_us,
            span_end_us,
            activities,
            trace_metadata: std::mem::take(&mut inner.trace_metadata),
        })
    }

    fn push_correlation(&self, id: CorrelationId) {
        CORRELATION_STACK.with(|stack| stack.borrow_mut().push(id));
    }

    fn pop_correlation(&self) {
        CORRELATION_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }

    fn transfer_buffer(&self, buffer: CpuTraceBuffer) {
        self.inner.lock().unwrap().transferred.push(buffer);
    }

    fn add_metadata(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .trace_metadata
            .push((key.to_string(), value.to_string()));
    }
}
