//! Sticky boolean flag with blocking waits.

use std::sync::{Arc, Mutex};

use super::{Condition, Scheduler, ThreadScheduler, TimeoutError, Wait};

/// Manually-reset event.
///
/// `wait` returns immediately while the flag is set; otherwise it blocks
/// on the owned [`Condition`] and re-checks the flag on every wake, so a
/// wake that raced with a `clear` (or any spurious wake) goes back to
/// sleep instead of returning early.
pub struct Event {
    flag: Mutex<bool>,
    cond: Condition,
}

impl Event {
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(ThreadScheduler))
    }

    pub fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            flag: Mutex::new(false),
            cond: Condition::with_scheduler(scheduler),
        }
    }

    /// Block until the flag is set or `wait` expires.
    pub fn wait(&self, wait: Wait) -> Result<(), TimeoutError> {
        let deadline = wait.deadline();
        loop {
            // Enqueue while holding the flag lock: a set() cannot slip in
            // between the check and the registration.
            let queued = {
                let flag = self.flag.lock().unwrap();
                if *flag {
                    return Ok(());
                }
                self.cond.enqueue()
            };
            let remaining = Wait::remaining(deadline)?;
            match queued.wait(remaining) {
                Ok(()) => continue,
                Err(TimeoutError) => {
                    if *self.flag.lock().unwrap() {
                        return Ok(());
                    }
                    return Err(TimeoutError);
                }
            }
        }
    }

    /// Set the flag and wake every current waiter. Idempotent.
    pub fn set(&self) {
        let mut flag = self.flag.lock().unwrap();
        *flag = true;
        self.cond.notify_all();
    }

    /// Reset the flag without waking anyone.
    pub fn clear(&self) {
        *self.flag.lock().unwrap() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock().unwrap()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
