//! CPU pinning and real-time priority for the role threads.
//!
//! Both are best effort: a failure is logged and the thread keeps running
//! with the default scheduler.

use tracing::{debug, warn};

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(target_os = "linux")]
static RT_SCHEDULER_AVAILABLE: AtomicBool = AtomicBool::new(false);

/// Records whether the kernel carries the PREEMPT-RT patch.
#[cfg(target_os = "linux")]
pub fn detect_rt_scheduler() -> bool {
    let available = std::fs::read_to_string("/sys/kernel/realtime")
        .map(|contents| contents.trim() == "1")
        .unwrap_or(false);
    RT_SCHEDULER_AVAILABLE.store(available, Ordering::Relaxed);
    if available {
        debug!("PREEMPT-RT patch available, thread priorities will be raised");
    } else {
        debug!("PREEMPT-RT patch not available, no priority boosting");
    }
    available
}

#[cfg(not(target_os = "linux"))]
pub fn detect_rt_scheduler() -> bool {
    false
}

pub fn pin_current_thread(core: usize, role: &str) -> bool {
    match core_affinity::get_core_ids().and_then(|ids| ids.get(core).cloned()) {
        Some(core_id) if core_affinity::set_for_current(core_id) => {
            debug!(role, core, "pinned thread to core");
            true
        }
        _ => {
            warn!(role, core, "failed to set core affinity");
            false
        }
    }
}

/// Switches the calling thread to `SCHED_RR` at `priority` when the RT
/// scheduler was detected.
#[cfg(target_os = "linux")]
pub fn raise_current_thread_priority(priority: i32, role: &str) -> bool {
    if !RT_SCHEDULER_AVAILABLE.load(Ordering::Relaxed) {
        return false;
    }
    // SAFETY: sched_param is plain data and pthread_self is always valid for
    // the calling thread.
    let rc = unsafe {
        let mut sched_param: libc::sched_param = std::mem::zeroed();
        sched_param.sched_priority = priority;
        libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_RR, &sched_param)
    };
    if rc != 0 {
        warn!(
            role,
            priority,
            error = %std::io::Error::from_raw_os_error(rc),
            "failed to set SCHED_RR"
        );
        return false;
    }
    debug!(role, priority, "running with SCHED_RR");
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinning_to_missing_core_fails_softly() {
        assert!(!pin_current_thread(usize::MAX, "test"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn priority_is_left_alone_without_rt_kernel() {
        RT_SCHEDULER_AVAILABLE.store(false, Ordering::Relaxed);
        assert!(!raise_current_thread_priority(10, "test"));
    }
}
