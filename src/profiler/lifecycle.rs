//! Session lifecycle state machine: Idle → Armed → Draining → Idle.
//!
//! Two pieces of shared state, deliberately separate: a transition mutex
//! that serializes enable/disable, and a lock-free current-session slot
//! read by the region-enter hot path. Draining is transient and never
//! observable outside `disable()`.

use crate::profiler::collector::{ActivityKind, ActivityKindSet, TraceCollector};
use crate::profiler::consolidate::{merge, render_deferred_metadata};
use crate::profiler::error::{ProfilerError, Result};
use crate::profiler::hooks::{self, HookHandle};
use crate::profiler::record::wall_time_us;
use crate::profiler::result::ConsolidatedResult;
use crate::profiler::session::{SessionConfig, SessionState};
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

enum LifecycleState {
    Idle,
    Armed {
        session: Arc<SessionState>,
        hook: Option<HookHandle>,
    },
}

static STATE: Mutex<LifecycleState> = Mutex::new(LifecycleState::Idle);

/// Hot-path view of the armed session. Set only by enable()/disable() under
/// the transition mutex; read lock-free by every region entry.
static CURRENT: ArcSwapOption<SessionState> = ArcSwapOption::const_empty();

/// The session currently armed, if any.
pub fn current_session() -> Option<Arc<SessionState>> {
    CURRENT.load_full()
}

pub fn is_armed() -> bool {
    CURRENT.load().is_some()
}

/// Arm a new tracing session.
///
/// Fails with `Configuration` before any mutation if a session is already
/// armed or `kinds` is empty. Collector failures surface as
/// `BackendUnavailable` and leave the lifecycle Idle, never partially
/// armed. The `collect_cpu_activities` / `collect_accelerator_activities`
/// flags of `config` are derived from `kinds`.
pub fn enable(
    config: SessionConfig,
    kinds: &ActivityKindSet,
    collector: Arc<dyn TraceCollector>,
) -> Result<()> {
    let mut state = STATE.lock().unwrap();
    if matches!(*state, LifecycleState::Armed { .. }) {
        return Err(ProfilerError::Configuration(
            "a tracing session is already armed".into(),
        ));
    }
    if kinds.is_empty() {
        return Err(ProfilerError::Configuration(
            "no activity kinds selected".into(),
        ));
    }

    let mut config = config;
    config.collect_cpu_activities = kinds.contains(&ActivityKind::Cpu);
    config.collect_accelerator_activities = kinds.contains(&ActivityKind::Accelerator);

    collector.prepare(kinds)?;

    let session = Arc::new(SessionState::new(config, collector.clone()));
    CURRENT.store(Some(session.clone()));

    let hook = if config.collect_cpu_activities {
        Some(hooks::install(
            Box::new(|region| match current_session() {
                Some(session) => session.begin_region(region),
                None => crate::profiler::session::RegionContext::noop(),
            }),
            Box::new(|region, ctx| SessionState::end_region(region, ctx)),
            config.report_input_shapes,
        ))
    } else {
        None
    };

    if let Err(err) = collector.start() {
        warn!(error = %err, "backend collector failed to start, rolling back");
        if let Some(handle) = hook {
            hooks::remove(handle);
        }
        CURRENT.store(None);
        return Err(err);
    }

    session.mark("__start_profile");
    debug!(
        cpu = config.collect_cpu_activities,
        accelerator = config.collect_accelerator_activities,
        "tracing session armed"
    );
    *state = LifecycleState::Armed { session, hook };
    Ok(())
}

/// Drain and finalize the armed session, returning the consolidated trace.
///
/// Fails with `State` when no session is armed; concurrent callers race to
/// at most one success. After the hook is removed, regions already entered
/// may still finish and append, but no new region is recorded.
pub fn disable() -> Result<ConsolidatedResult> {
    let mut state = STATE.lock().unwrap();
    let (session, hook) = match std::mem::replace(&mut *state, LifecycleState::Idle) {
        LifecycleState::Armed { session, hook } => (session, hook),
        LifecycleState::Idle => {
            return Err(ProfilerError::State("no active tracing session".into()))
        }
    };

    // Draining: stop accepting new regions first.
    if let Some(handle) = hook {
        hooks::remove(handle);
    }
    CURRENT.store(None);

    session.mark("__stop_profile");
    session.stamp_end(wall_time_us());

    let mut buffers = session.take_buffers()?;
    render_deferred_metadata(&buffers.records, &mut buffers.trace.activities)?;

    let collector = session.collector().clone();
    collector.transfer_buffer(buffers.trace);
    let raw = collector.stop()?;

    let events = merge(buffers.records, raw.activities.clone())?;
    let legacy = session.take_legacy().consolidate();

    debug!(events = events.len(), "tracing session finalized");
    Ok(ConsolidatedResult::new(events, legacy, raw))
}

/// Attach a session-wide key/value annotation to the backend trace.
pub fn add_metadata(key: &str, value: &str) -> Result<()> {
    let state = STATE.lock().unwrap();
    match &*state {
        LifecycleState::Armed { session, .. } => {
            session.collector().add_metadata(key, value);
            Ok(())
        }
        LifecycleState::Idle => Err(ProfilerError::State(
            "no active tracing session".into(),
        )),
    }
}
