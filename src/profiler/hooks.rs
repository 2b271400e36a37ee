//! Region enter/exit hook registry.
//!
//! Single-slot, process-wide: the lifecycle installs exactly one hook pair
//! per session and removes exactly that pair at disable. Instrumented code
//! drives regions through [`region_enter`]/[`region_exit`]; the hot path is
//! one lock-free slot load.
//!
//! A [`RegionCall`] captures the hook that observed the entry, so a region
//! that is in flight when the hook is removed still dispatches its exit —
//! only *new* entries observe the empty slot and become no-ops.

use crate::profiler::region::Region;
use crate::profiler::session::RegionContext;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type EnterFn = dyn Fn(&Region) -> RegionContext + Send + Sync;
pub type ExitFn = dyn Fn(&Region, RegionContext) + Send + Sync;

struct InstalledHook {
    id: u64,
    enter: Box<EnterFn>,
    exit: Box<ExitFn>,
    needs_inputs: bool,
}

static HOOK: ArcSwapOption<InstalledHook> = ArcSwapOption::const_empty();
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identifies one installed hook pair so it can be removed precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookHandle(u64);

pub fn install(
    enter: Box<EnterFn>,
    exit: Box<ExitFn>,
    needs_inputs: bool,
) -> HookHandle {
    let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    HOOK.store(Some(Arc::new(InstalledHook {
        id,
        enter,
        exit,
        needs_inputs,
    })));
    HookHandle(id)
}

/// Remove the hook identified by `handle`. A stale handle (already replaced
/// by a newer install) leaves the slot untouched.
pub fn remove(handle: HookHandle) {
    let current = HOOK.load();
    if current.as_ref().is_some_and(|h| h.id == handle.0) {
        HOOK.store(None);
    }
}

/// True if the installed hook asked for argument inspection; call sites can
/// skip shape collection otherwise.
pub fn hooks_need_inputs() -> bool {
    HOOK.load().as_ref().is_some_and(|h| h.needs_inputs)
}

/// Opaque in-flight region call handed back by [`region_enter`].
pub struct RegionCall {
    hook: Option<Arc<InstalledHook>>,
    ctx: Option<RegionContext>,
}

impl RegionCall {
    pub fn is_noop(&self) -> bool {
        self.ctx.as_ref().map(|c| c.is_noop()).unwrap_or(true)
    }
}

/// Fire the enter callback of the installed hook, if any.
pub fn region_enter(region: &Region) -> RegionCall {
    match HOOK.load_full() {
        Some(hook) => {
            let ctx = (hook.enter)(region);
            RegionCall {
                hook: Some(hook),
                ctx: Some(ctx),
            }
        }
        None => RegionCall {
            hook: None,
            ctx: None,
        },
    }
}

/// Fire the exit callback of the hook captured at entry. Safe to call after
/// the hook was removed; a no-op call returns immediately.
pub fn region_exit(region: &Region, mut call: RegionCall) {
    if let (Some(hook), Some(ctx)) = (call.hook.take(), call.ctx.take()) {
        (hook.exit)(region, ctx);
    }
}
