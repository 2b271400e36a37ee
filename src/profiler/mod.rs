pub mod collector;
pub mod consolidate;
pub mod correlation;
pub mod error;
pub mod hooks;
pub mod legacy;
pub mod lifecycle;
pub mod record;
pub mod region;
pub mod result;
pub mod session;

pub use collector::{
    Activity, ActivityKind, ActivityKindSet, CpuTraceBuffer, DeviceType, InProcessCollector,
    RawTrace, TraceCollector,
};
pub use consolidate::TraceEvent;
pub use correlation::{next_correlation_id, CorrelationAllocator, CorrelationId};
pub use error::{ProfilerError, Result};
pub use hooks::{region_enter, region_exit, HookHandle, RegionCall};
pub use legacy::{LegacyEvent, LegacyEventKind};
pub use lifecycle::{add_metadata, current_session, disable, enable, is_armed};
pub use record::EventRecord;
pub use region::{RecordScope, Region, NO_SEQUENCE_NUMBER};
pub use result::ConsolidatedResult;
pub use session::{RegionContext, SessionConfig, SessionState};
