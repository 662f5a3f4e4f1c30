//! One-shot scheduled callbacks.
//!
//! The timeout primitives do not talk to any timer peripheral directly;
//! they go through the [`Scheduler`] capability, which models the only
//! thing the runtime guarantees: "run this callback once, `delay` from
//! now, unless cancelled first". [`ThreadScheduler`] is the host
//! implementation; an embedded target would back the same trait with a
//! hardware one-shot timer.

use std::{
    sync::mpsc,
    thread,
    time::Duration,
};

use log::trace;

/// A scheduled one-shot callback.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run a callback once after a delay.
pub trait Scheduler: Send + Sync {
    /// Arm a one-shot timer. The callback runs once after `delay` unless
    /// the returned guard cancels it first.
    fn schedule_once(&self, delay: Duration, callback: Callback) -> TimerGuard;
}

/// Handle to a pending one-shot timer.
///
/// Dropping the guard cancels the timer; [`TimerGuard::cancel`] does the
/// same explicitly. Cancelling after the callback has fired is a no-op.
#[derive(Debug)]
pub struct TimerGuard {
    cancel: mpsc::Sender<()>,
}

impl TimerGuard {
    pub fn cancel(self) {
        // Either the message or the sender drop below stops the timer
        // thread; a fired timer has already hung up and ignores both.
        let _ = self.cancel.send(());
    }
}

/// Host-side [`Scheduler`] backed by a thread per armed timer.
///
/// The thread parks on a cancellation channel with a receive timeout; a
/// timeout means the timer matured and the callback runs, anything on the
/// channel (or the guard being dropped) means it was cancelled in time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule_once(&self, delay: Duration, callback: Callback) -> TimerGuard {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || match rx.recv_timeout(delay) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                trace!("one-shot timer fired after {delay:?}");
                callback();
            }
            _ => trace!("one-shot timer cancelled"),
        });
        TimerGuard { cancel: tx }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;

    #[test]
    fn fires_once_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let guard = ThreadScheduler.schedule_once(
            Duration::from_millis(10),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        thread::sleep(Duration::from_millis(100));
        assert!(fired.load(Ordering::SeqCst));
        guard.cancel();
    }

    #[test]
    fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let guard = ThreadScheduler.schedule_once(
            Duration::from_millis(100),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        guard.cancel();
        thread::sleep(Duration::from_millis(200));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn dropping_guard_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        drop(ThreadScheduler.schedule_once(
            Duration::from_millis(100),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        ));

        thread::sleep(Duration::from_millis(200));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
