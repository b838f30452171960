//! Command-timeout timer service.
//!
//! A process-wide one-shot timer scheduler shared by all commands. Each
//! command owns at most one armed timer at a time and must remove it
//! before arming another. The service is an explicit dependency of the
//! command (not ambient global state) so tests can substitute a manual
//! timer.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Handle identifying an armed timer.
///
/// Handles are process-unique and never zero; "no timer armed" is
/// represented by the absence of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(NonZeroU64);

impl TimerHandle {
    /// Create a handle from a raw id; `None` if the id is zero.
    #[must_use]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Raw handle value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// One-shot timer callback.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot timer scheduler.
pub trait TimerService: Send + Sync {
    /// Arm a one-shot timer that invokes `callback` after `after`.
    ///
    /// Returns `None` only if the service cannot allocate a handle.
    fn arm(&self, after: Duration, callback: TimerCallback) -> Option<TimerHandle>;

    /// Cancel an armed timer.
    ///
    /// Safe to call for a timer that already fired; the call is then a
    /// no-op.
    fn disarm(&self, handle: TimerHandle);
}

/// Per-timer slot: present while armed, removed by whichever of
/// "fire" and "disarm" wins the race.
type TimerSlots = Arc<Mutex<HashMap<u64, Option<tokio::task::AbortHandle>>>>;

/// Tokio-backed timer service.
///
/// Timers are tokio tasks sleeping until their deadline. Removal of the
/// timer's slot is the single linearization point: the firing task only
/// runs its callback if it removed the slot itself, so a disarmed timer
/// can never fire even if its sleep already elapsed.
pub struct TokioTimerService {
    next_id: AtomicU64,
    slots: TimerSlots,
    arm_calls: AtomicU64,
    disarm_calls: AtomicU64,
}

impl TokioTimerService {
    /// Create a new timer service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            slots: Arc::new(Mutex::new(HashMap::new())),
            arm_calls: AtomicU64::new(0),
            disarm_calls: AtomicU64::new(0),
        }
    }

    /// Number of timers currently armed.
    #[must_use]
    pub fn armed_len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Total number of `arm` calls.
    #[must_use]
    pub fn arm_calls(&self) -> u64 {
        self.arm_calls.load(Ordering::Acquire)
    }

    /// Total number of `disarm` calls.
    #[must_use]
    pub fn disarm_calls(&self) -> u64 {
        self.disarm_calls.load(Ordering::Acquire)
    }
}

impl Default for TokioTimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for TokioTimerService {
    fn arm(&self, after: Duration, callback: TimerCallback) -> Option<TimerHandle> {
        self.arm_calls.fetch_add(1, Ordering::AcqRel);
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let handle = TimerHandle::new(id)?;

        // The slot must exist before the task can race to remove it.
        self.slots.lock().insert(id, None);

        let slots = Arc::clone(&self.slots);
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let won = slots.lock().remove(&id).is_some();
            if won {
                tracing::trace!(timer = id, "command timeout timer fired");
                callback();
            }
        });

        // If the timer fired between spawn and here the slot is already
        // gone and the abort handle is simply dropped.
        if let Some(slot) = self.slots.lock().get_mut(&id) {
            *slot = Some(task.abort_handle());
        }

        tracing::trace!(timer = id, after_ms = after.as_millis() as u64, "armed timer");
        Some(handle)
    }

    fn disarm(&self, handle: TimerHandle) {
        self.disarm_calls.fetch_add(1, Ordering::AcqRel);
        if let Some(slot) = self.slots.lock().remove(&handle.get()) {
            if let Some(task) = slot {
                task.abort();
            }
            tracing::trace!(timer = handle.get(), "disarmed timer");
        }
    }
}

static SHARED: Lazy<Arc<TokioTimerService>> = Lazy::new(|| Arc::new(TokioTimerService::new()));

/// The process-wide shared timer service.
///
/// Commands use this by default; substitute a manual timer per command
/// with [`Command::with_timer_service`](crate::command::Command::with_timer_service)
/// in tests.
#[must_use]
pub fn shared() -> Arc<TokioTimerService> {
    Arc::clone(&SHARED)
}

pub(crate) fn default_service() -> Arc<dyn TimerService> {
    shared()
}
