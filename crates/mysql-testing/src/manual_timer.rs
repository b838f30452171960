//! Manually driven timer service.
//!
//! Substitutes for the process-wide tokio timer in tests: armed timers
//! never fire on their own; the test decides when (and whether) each one
//! fires. Arm/disarm calls are counted so leak tests can assert exact
//! balance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hashbrown::HashMap;
use mysql_command::{TimerCallback, TimerHandle, TimerService};
use parking_lot::Mutex;

struct ArmedTimer {
    after: Duration,
    callback: TimerCallback,
}

/// A timer service fired explicitly by the test.
pub struct ManualTimerService {
    next_id: AtomicU64,
    armed: Mutex<HashMap<u64, ArmedTimer>>,
    arm_calls: AtomicU64,
    disarm_calls: AtomicU64,
    last_after: Mutex<Option<Duration>>,
}

impl Default for ManualTimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTimerService {
    /// Create a new manual timer service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            armed: Mutex::new(HashMap::new()),
            arm_calls: AtomicU64::new(0),
            disarm_calls: AtomicU64::new(0),
            last_after: Mutex::new(None),
        }
    }

    /// Fire an armed timer now, running its callback.
    ///
    /// Returns `false` if the handle is unknown (never armed, already
    /// fired, or disarmed).
    pub fn fire(&self, handle: TimerHandle) -> bool {
        let timer = self.armed.lock().remove(&handle.get());
        match timer {
            Some(timer) => {
                (timer.callback)();
                true
            }
            None => false,
        }
    }

    /// Fire the oldest armed timer, if any.
    pub fn fire_next(&self) -> bool {
        let handle = self
            .armed
            .lock()
            .keys()
            .min()
            .copied()
            .and_then(TimerHandle::new);
        match handle {
            Some(handle) => self.fire(handle),
            None => false,
        }
    }

    /// Number of timers currently armed.
    #[must_use]
    pub fn armed_len(&self) -> usize {
        self.armed.lock().len()
    }

    /// Total number of `arm` calls observed.
    #[must_use]
    pub fn arm_calls(&self) -> u64 {
        self.arm_calls.load(Ordering::Acquire)
    }

    /// Total number of `disarm` calls observed.
    #[must_use]
    pub fn disarm_calls(&self) -> u64 {
        self.disarm_calls.load(Ordering::Acquire)
    }

    /// Duration of the most recently armed timer.
    #[must_use]
    pub fn last_armed_after(&self) -> Option<Duration> {
        *self.last_after.lock()
    }
}

impl TimerService for ManualTimerService {
    fn arm(&self, after: Duration, callback: TimerCallback) -> Option<TimerHandle> {
        self.arm_calls.fetch_add(1, Ordering::AcqRel);
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let handle = TimerHandle::new(id)?;
        self.armed.lock().insert(id, ArmedTimer { after, callback });
        *self.last_after.lock() = Some(after);
        Some(handle)
    }

    fn disarm(&self, handle: TimerHandle) {
        self.disarm_calls.fetch_add(1, Ordering::AcqRel);
        self.armed.lock().remove(&handle.get());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use super::*;

    #[test]
    fn test_fire_runs_callback_once() {
        let service = ManualTimerService::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = service
            .arm(Duration::from_secs(1), Box::new(move || flag.store(true, Ordering::Release)));

        let handle = handle.expect("manual timer always allocates");
        assert!(service.fire(handle));
        assert!(fired.load(Ordering::Acquire));
        assert!(!service.fire(handle));
    }

    #[test]
    fn test_disarm_suppresses_fire() {
        let service = ManualTimerService::new();
        let handle = service.arm(Duration::from_secs(1), Box::new(|| {}));
        let handle = handle.expect("manual timer always allocates");
        service.disarm(handle);
        assert!(!service.fire(handle));
        assert_eq!(service.arm_calls(), 1);
        assert_eq!(service.disarm_calls(), 1);
        assert_eq!(service.armed_len(), 0);
    }

    #[test]
    fn test_fire_next_picks_oldest() {
        let service = ManualTimerService::new();
        let first = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&first);
        service.arm(Duration::from_secs(1), Box::new(move || flag.store(true, Ordering::Release)));
        service.arm(Duration::from_secs(2), Box::new(|| {}));

        assert!(service.fire_next());
        assert!(first.load(Ordering::Acquire));
        assert_eq!(service.armed_len(), 1);
    }
}
