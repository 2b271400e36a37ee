//! The consolidated result returned by `disable()`.

use crate::profiler::collector::RawTrace;
use crate::profiler::consolidate::TraceEvent;
use crate::profiler::error::{ProfilerError, Result};
use crate::profiler::legacy::LegacyEvent;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Immutable snapshot of one completed tracing session: the merged event
/// views, the legacy per-thread lists, and the backend collector's raw
/// trace (kept only for the native-format export).
#[derive(Debug)]
pub struct ConsolidatedResult {
    events: Vec<TraceEvent>,
    legacy_events: Vec<Vec<LegacyEvent>>,
    /// Consumed by the first successful `save`; the underlying write is
    /// destructive, so re-export must fail rather than re-serialize stale
    /// state.
    trace: Option<RawTrace>,
}

impl ConsolidatedResult {
    pub(crate) fn new(
        events: Vec<TraceEvent>,
        legacy_events: Vec<Vec<LegacyEvent>>,
        trace: RawTrace,
    ) -> Self {
        Self {
            events,
            legacy_events,
            trace: Some(trace),
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn legacy_events(&self) -> &[Vec<LegacyEvent>] {
        &self.legacy_events
    }

    /// Write the backend collector's raw trace to `path` in its native
    /// (JSON) format. Succeeds exactly once per result.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let trace = self.trace.as_ref().ok_or(ProfilerError::AlreadySaved)?;
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, trace)
            .map_err(|e| ProfilerError::Io(e.into()))?;
        self.trace = None;
        Ok(())
    }
}
