//! Final consolidation: deferred metadata rendering and the merge of CPU
//! records with backend activities.
//!
//! Rendering is deferred to disable() time on purpose — most events are
//! never inspected, so the recording path stores typed data and pays the
//! formatting cost once per session, not once per event.

use crate::profiler::collector::{
    device_type_for_tag, Activity, DeviceType, TAG_CPU_REGION,
};
use crate::profiler::correlation::CorrelationId;
use crate::profiler::error::{ProfilerError, Result};
use crate::profiler::record::EventRecord;
use serde::Serialize;
use smallvec::SmallVec;

/// Canonical rendering of argument shapes: bracketed, comma-joined nested
/// lists, e.g. `[[2, 3], [4]]`.
pub fn shapes_to_str(shapes: &[Vec<i64>]) -> String {
    let mut out = String::from("[");
    for (t_idx, shape) in shapes.iter().enumerate() {
        if t_idx > 0 {
            out.push_str(", ");
        }
        out.push('[');
        for (s_idx, dim) in shape.iter().enumerate() {
            if s_idx > 0 {
                out.push_str(", ");
            }
            out.push_str(&dim.to_string());
        }
        out.push(']');
    }
    out.push(']');
    out
}

/// Canonical rendering of dtype tags: bracketed, comma-joined, quoted,
/// e.g. `["float", "int"]`. An empty list renders as `[]`.
pub fn dtypes_to_str(dtypes: &[String]) -> String {
    if dtypes.is_empty() {
        return "[]".to_string();
    }
    let quoted: Vec<String> = dtypes.iter().map(|d| format!("\"{d}\"")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Stack frames joined innermost-last by a fixed `;` separator.
pub fn stacks_to_str(frames: &[String]) -> String {
    frames.join(";")
}

/// Attach the rendered metadata of every record to its mirror CPU activity.
/// Done once per session at disable() time. The two buffers are built in
/// lockstep, so a length mismatch is an internal-invariant violation.
pub fn render_deferred_metadata(
    records: &[EventRecord],
    activities: &mut [Activity],
) -> Result<()> {
    if records.len() != activities.len() {
        return Err(ProfilerError::Consistency(format!(
            "{} records but {} cpu activities at finalize",
            records.len(),
            activities.len()
        )));
    }

    for (record, activity) in records.iter().zip(activities.iter_mut()) {
        let mut annotations: SmallVec<[(&str, String); 5]> = SmallVec::new();
        if record.has_shapes() {
            annotations.push(("Input Dims", shapes_to_str(record.shapes.as_ref().unwrap())));
        }
        if record.has_stack() {
            annotations.push(("Call stack", stacks_to_str(record.stack.as_ref().unwrap())));
        }
        if record.has_dtypes() {
            annotations.push(("Input type", dtypes_to_str(record.dtypes.as_ref().unwrap())));
        }
        // Forward/backward pairing, present only during training.
        if record.sequence_number >= 0 {
            annotations.push(("Fwd thread id", record.forward_thread_id.to_string()));
            annotations.push(("Sequence number", record.sequence_number.to_string()));
        }
        for (key, value) in annotations {
            activity.add_metadata(key, value);
        }
    }
    Ok(())
}

/// One entry of the consolidated trace: a backend activity view, joined with
/// the full CPU-side record when the activity mirrors an instrumented
/// region.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub name: String,
    pub device_type: DeviceType,
    pub device_index: i32,
    pub resource_id: i64,
    pub start_us: u64,
    pub duration_us: u64,
    pub type_tag: u8,
    /// Primary correlation id, set only for CPU-region events. Joining a
    /// backend kernel to a CPU record goes through `linked_correlation_id`.
    pub correlation_id: CorrelationId,
    /// Inherited from a causally-preceding activity, for display purposes.
    pub linked_correlation_id: CorrelationId,
    /// Present iff this event came from the CPU enter/exit path.
    pub record: Option<EventRecord>,
}

impl TraceEvent {
    fn from_cpu_record(record: EventRecord) -> Self {
        TraceEvent {
            name: record.name.clone(),
            device_type: DeviceType::Host,
            device_index: 0,
            resource_id: record.end_thread_id as i64,
            start_us: record.start_us,
            duration_us: record.duration_us(),
            type_tag: TAG_CPU_REGION,
            correlation_id: record.correlation_id,
            linked_correlation_id: CorrelationId::UNSET,
            record: Some(record),
        }
    }

    fn from_backend_activity(activity: Activity) -> Result<Self> {
        let device_type = device_type_for_tag(activity.type_tag)?;
        // Skip the primary correlation id for non-CPU activities to avoid
        // misattributing unrelated backend events to a CPU region.
        let correlation_id = if activity.type_tag == TAG_CPU_REGION {
            activity.correlation_id
        } else {
            CorrelationId::UNSET
        };
        Ok(TraceEvent {
            name: activity.name,
            device_type,
            device_index: activity.device_index,
            resource_id: activity.resource_id,
            start_us: activity.start_us,
            duration_us: activity.duration_us,
            type_tag: activity.type_tag,
            correlation_id,
            linked_correlation_id: activity.linked_correlation_id,
            record: None,
        })
    }
}

/// Merge CPU records with backend activities into the consolidated event
/// list. Backend activities tagged CPU-region were produced by the same
/// enter/exit path and are already represented, so they are skipped; every
/// other activity is appended as-is. An unrecognized tag aborts the merge.
pub fn merge(
    cpu_records: Vec<EventRecord>,
    backend_activities: Vec<Activity>,
) -> Result<Vec<TraceEvent>> {
    let mut events: Vec<TraceEvent> =
        Vec::with_capacity(cpu_records.len() + backend_activities.len());
    events.extend(cpu_records.into_iter().map(TraceEvent::from_cpu_record));
    for activity in backend_activities {
        if activity.type_tag == TAG_CPU_REGION {
            continue;
        }
        events.push(TraceEvent::from_backend_activity(activity)?);
    }
    Ok(events)
}
