use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;

/// WakeSlot is a single pending wake-up time shared between a timer handle (which sets it) and
/// its task (which takes it). An empty slot after a sleep means nobody pushed the deadline out.
#[derive(Clone, Default)]
pub(super) struct WakeSlot {
    next: Arc<Mutex<Option<Instant>>>,
}

impl WakeSlot {
    pub(super) fn new() -> Self {
        WakeSlot::default()
    }

    pub(super) fn set(&self, wake_time: Instant) {
        // A poisoned slot still holds a valid Option<Instant>.
        let mut guard = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        guard.replace(wake_time);
    }

    pub(super) fn take(&self) -> Option<Instant> {
        let mut guard = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        guard.take()
    }
}
