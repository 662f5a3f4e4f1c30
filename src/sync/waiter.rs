//! Single-slot rendezvous between one blocker and one releaser.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
    mpsc,
};

use super::{Scheduler, TimeoutError, Wait};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Notified,
    TimedOut,
}

/// One-use blocking rendezvous.
///
/// A `Waiter` is created by the call that intends to block and lives for
/// exactly that one wait. The releaser side is a [`WaiterHandle`], which
/// may be cloned and released redundantly: only the first wake counts.
///
/// On a bounded wait, a one-shot timer is armed that force-releases the
/// waiter and marks the outcome as timed out, letting the caller
/// distinguish a timeout from a normal wake. The timer is always cancelled
/// on the non-timeout path so a stray late callback cannot leak into
/// anything else (the wake slot dies with the waiter).
pub struct Waiter {
    id: u64,
    slot: mpsc::Receiver<Wake>,
    // Kept so the slot never disconnects while the waiter is alive.
    tx: mpsc::SyncSender<Wake>,
    scheduler: Arc<dyn Scheduler>,
}

/// Releaser side of a [`Waiter`].
#[derive(Clone)]
pub struct WaiterHandle {
    id: u64,
    tx: mpsc::SyncSender<Wake>,
}

impl Waiter {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        let (tx, slot) = mpsc::sync_channel(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            slot,
            tx,
            scheduler,
        }
    }

    /// Identity used by queue owners to remove this waiter again.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn handle(&self) -> WaiterHandle {
        WaiterHandle {
            id: self.id,
            tx: self.tx.clone(),
        }
    }

    /// Block until released or until `wait` expires.
    pub fn wait(self, wait: Wait) -> Result<(), TimeoutError> {
        match wait {
            Wait::NoWait => match self.slot.try_recv() {
                Ok(Wake::Notified) => Ok(()),
                _ => Err(TimeoutError),
            },
            Wait::Forever => match self.slot.recv() {
                Ok(Wake::Notified) => Ok(()),
                _ => Err(TimeoutError),
            },
            Wait::For(delay) => {
                let tx = self.tx.clone();
                let timer = self.scheduler.schedule_once(
                    delay,
                    Box::new(move || {
                        // Loses to a racing notify: the slot holds one
                        // wake and the first sender wins.
                        let _ = tx.try_send(Wake::TimedOut);
                    }),
                );
                match self.slot.recv() {
                    Ok(Wake::Notified) => {
                        timer.cancel();
                        Ok(())
                    }
                    _ => Err(TimeoutError),
                }
            }
        }
    }
}

impl WaiterHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wake the blocked side. Releasing an already-released or
    /// already-dead waiter is a no-op.
    pub fn release(&self) {
        let _ = self.tx.try_send(Wake::Notified);
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    fn waiter() -> Waiter {
        Waiter::new(Arc::new(super::super::ThreadScheduler))
    }

    #[test]
    fn release_unblocks_wait() {
        let w = waiter();
        let handle = w.handle();
        let t = thread::spawn(move || w.wait(Wait::Forever));

        thread::sleep(Duration::from_millis(20));
        handle.release();
        assert_eq!(t.join().unwrap(), Ok(()));
    }

    #[test]
    fn bounded_wait_times_out() {
        let w = waiter();
        assert_eq!(w.wait(Wait::millis(20)), Err(TimeoutError));
    }

    #[test]
    fn release_before_wait_wins() {
        let w = waiter();
        w.handle().release();
        assert_eq!(w.wait(Wait::millis(500)), Ok(()));
    }

    #[test]
    fn no_wait_fails_when_unreleased() {
        let w = waiter();
        assert_eq!(w.wait(Wait::NoWait), Err(TimeoutError));
    }

    #[test]
    fn redundant_release_is_harmless() {
        let w = waiter();
        let handle = w.handle();
        handle.release();
        handle.release();
        assert_eq!(w.wait(Wait::NoWait), Ok(()));
        // Waiter is gone now; late releases still must not panic.
        handle.release();
    }

    #[test]
    fn notify_racing_timeout_is_a_normal_wake() {
        let w = waiter();
        let handle = w.handle();
        let t = thread::spawn(move || w.wait(Wait::millis(30)));
        handle.release();
        assert_eq!(t.join().unwrap(), Ok(()));
    }
}
