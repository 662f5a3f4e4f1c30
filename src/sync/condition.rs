//! Condition variable built from waiters and a plain lock.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use thiserror::Error;

use super::{Scheduler, ThreadScheduler, TimeoutError, Wait, Waiter, WaiterHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("notify requires a positive waiter count")]
pub struct NotifyError;

/// FIFO condition variable.
///
/// `wait` parks the caller at the back of the queue; `notify(n)` wakes the
/// `n` longest-waiting callers first. A waiter is always removed from the
/// queue before its `wait` returns, whether the removal was triggered by a
/// notify or by its timeout; both removal and release are idempotent, so
/// the two racing against each other is harmless.
pub struct Condition {
    waiters: Mutex<VecDeque<WaiterHandle>>,
    scheduler: Arc<dyn Scheduler>,
}

/// A waiter already registered with a [`Condition`], not yet blocked.
///
/// Splitting registration from blocking lets a caller enqueue itself while
/// still holding its own state lock (see [`Event`](super::Event)), closing
/// the window where a notify could slip between a state check and the
/// block. Deregistration happens on drop and is idempotent against a
/// racing notify.
pub struct QueuedWaiter<'a> {
    cond: &'a Condition,
    waiter: Option<Waiter>,
    id: u64,
}

impl Condition {
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(ThreadScheduler))
    }

    pub fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
            scheduler,
        }
    }

    /// Append a fresh waiter to the back of the queue without blocking.
    pub fn enqueue(&self) -> QueuedWaiter<'_> {
        let waiter = Waiter::new(Arc::clone(&self.scheduler));
        let id = waiter.id();
        self.waiters.lock().unwrap().push_back(waiter.handle());
        QueuedWaiter {
            cond: self,
            waiter: Some(waiter),
            id,
        }
    }

    /// Block until notified or until `wait` expires.
    pub fn wait(&self, wait: Wait) -> Result<(), TimeoutError> {
        self.enqueue().wait(wait)
    }

    /// Wake up to `n` waiters in FIFO order. Returns how many were woken.
    pub fn notify(&self, n: usize) -> Result<usize, NotifyError> {
        if n == 0 {
            return Err(NotifyError);
        }
        let mut waiters = self.waiters.lock().unwrap();
        let count = n.min(waiters.len());
        for handle in waiters.drain(..count) {
            handle.release();
        }
        Ok(count)
    }

    /// Wake every currently-blocked waiter.
    pub fn notify_all(&self) -> usize {
        let mut waiters = self.waiters.lock().unwrap();
        let count = waiters.len();
        for handle in waiters.drain(..) {
            handle.release();
        }
        count
    }

    /// Number of currently-blocked waiters.
    pub fn waiters(&self) -> usize {
        self.waiters.lock().unwrap().len()
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuedWaiter<'_> {
    /// Block until notified or until `wait` expires.
    pub fn wait(mut self, wait: Wait) -> Result<(), TimeoutError> {
        match self.waiter.take() {
            Some(waiter) => waiter.wait(wait),
            None => Err(TimeoutError),
        }
        // Drop removes the queue entry, on this path and on early drops.
    }
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        // Already popped if a notify won the race; removal is a no-op then.
        let mut waiters = self.cond.waiters.lock().unwrap();
        if let Some(pos) = waiters.iter().position(|h| h.id() == self.id) {
            waiters.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, thread, time::Duration};

    use super::*;

    fn spawn_waiter(
        cond: &Arc<Condition>,
        id: usize,
        woken: mpsc::Sender<usize>,
    ) -> thread::JoinHandle<()> {
        let cond_thread = Arc::clone(cond);
        let seen = cond.waiters();
        let t = thread::spawn(move || {
            cond_thread.wait(Wait::Forever).unwrap();
            woken.send(id).unwrap();
        });
        // Make registration order deterministic before returning.
        while cond.waiters() == seen {
            thread::sleep(Duration::from_millis(1));
        }
        t
    }

    #[test]
    fn notify_wakes_earliest_waiters_first() {
        let cond = Arc::new(Condition::new());
        let (tx, rx) = mpsc::channel();

        let handles: Vec<_> = (0..4).map(|i| spawn_waiter(&cond, i, tx.clone())).collect();

        assert_eq!(cond.notify(2), Ok(2));
        let mut woken = vec![
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        ];
        woken.sort_unstable();
        assert_eq!(woken, vec![0, 1]);

        // The other two stay blocked until a further notify.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(cond.waiters(), 2);

        assert_eq!(cond.notify_all(), 2);
        for t in handles {
            t.join().unwrap();
        }
    }

    #[test]
    fn notify_zero_is_invalid() {
        let cond = Condition::new();
        assert_eq!(cond.notify(0), Err(NotifyError));
    }

    #[test]
    fn notify_with_no_waiters_wakes_none() {
        let cond = Condition::new();
        assert_eq!(cond.notify(3), Ok(0));
        assert_eq!(cond.notify_all(), 0);
    }

    #[test]
    fn timed_out_waiter_leaves_the_queue() {
        let cond = Condition::new();
        assert_eq!(cond.wait(Wait::millis(20)), Err(TimeoutError));
        assert_eq!(cond.waiters(), 0);
    }

    #[test]
    fn dropped_enqueue_leaves_the_queue() {
        let cond = Condition::new();
        drop(cond.enqueue());
        assert_eq!(cond.waiters(), 0);
    }

    #[test]
    fn wait_after_timeouts_still_works() {
        let cond = Arc::new(Condition::new());
        assert_eq!(cond.wait(Wait::millis(10)), Err(TimeoutError));

        let (tx, rx) = mpsc::channel();
        let t = spawn_waiter(&cond, 7, tx);
        assert_eq!(cond.notify(1), Ok(1));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 7);
        t.join().unwrap();
    }
}
