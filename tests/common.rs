use optrace::profiler::{ActivityKind, ActivityKindSet, InProcessCollector, SessionConfig};
use std::sync::{Arc, Mutex, MutexGuard};

/// The lifecycle is process-global; tests in one binary must not arm
/// sessions concurrently. Take this before touching enable/disable.
#[allow(dead_code)]
pub fn lifecycle_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[allow(dead_code)]
pub fn cpu_kinds() -> ActivityKindSet {
    let mut kinds = ActivityKindSet::new();
    kinds.insert(ActivityKind::Cpu);
    kinds
}

#[allow(dead_code)]
pub fn all_kinds() -> ActivityKindSet {
    let mut kinds = cpu_kinds();
    kinds.insert(ActivityKind::Accelerator);
    kinds
}

/// Arm a plain CPU-only session on a fresh in-process collector.
#[allow(dead_code)]
pub fn arm_cpu_session(config: SessionConfig) -> Arc<InProcessCollector> {
    let collector = Arc::new(InProcessCollector::new());
    optrace::profiler::enable(config, &cpu_kinds(), collector.clone()).unwrap();
    collector
}
