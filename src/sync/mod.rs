//! Blocking coordination primitives.
//!
//! This module builds timeout-capable blocking primitives out of two weak
//! ingredients: plain mutual exclusion and a one-shot scheduled callback.
//! The target runtime offers neither native timed waits nor native
//! condition variables, so every bounded wait here is implemented the same
//! way — block on a single-slot rendezvous and arm a timer that
//! force-releases it if nothing else does first.
//!
//! # Overview
//!
//! The primitives stack leaf-first:
//!
//! - [`Waiter`]: one releaser, one blocker, one use. Everything else
//!   blocks through it.
//! - [`Condition`]: a FIFO queue of waiters guarded by a lock;
//!   `notify(n)` wakes the n longest-waiting callers first.
//! - [`Event`]: a sticky boolean flag over a [`Condition`].
//! - [`Future`]: a one-shot box correlating an asynchronous outcome with
//!   a blocking `get`.
//! - [`BoundedThreadPool`]: a work queue drained by a lazily-grown, capped
//!   set of persistent workers, one [`Future`] per submission.
//! - [`PubSub`]: a topic registry that fans each publish out to one
//!   spawned thread per subscriber.
//! - [`BlockingQueue`]: an unbounded FIFO with a blocking pop, used as the
//!   transport's inbound mailbox.
//!
//! # Timeouts
//!
//! Every blocking call takes a [`Wait`] and fails with [`TimeoutError`]
//! when the bound expires. A timed-out call always unregisters whatever
//! state it created (queue membership, pending entries) before returning,
//! so no stale registration survives a timeout.
//!
//! # Locking discipline
//!
//! Each structure is guarded by its own independent lock and no operation
//! holds two of them at once, so lock-ordering deadlocks cannot occur. The
//! flip side is that no two structures are ever updated atomically
//! together; callers that need cross-structure consistency must tolerate
//! the in-between states (see the transport's pending-ack handling).

mod condition;
mod event;
mod future;
mod pool;
mod pubsub;
mod queue;
mod timer;
mod waiter;

use std::time::{Duration, Instant};

use thiserror::Error;

pub use condition::{Condition, NotifyError, QueuedWaiter};
pub use event::Event;
pub use future::{Future, FutureError, Promise};
pub use pool::{BoundedThreadPool, PoolClosed};
pub use pubsub::PubSub;
pub use queue::BlockingQueue;
pub use timer::{Callback, Scheduler, ThreadScheduler, TimerGuard};
pub use waiter::{Waiter, WaiterHandle};

/// A blocking operation exceeded its time bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out")]
pub struct TimeoutError;

/// How long a blocking call is allowed to block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Do not block; fail immediately if the operation cannot complete.
    NoWait,
    /// Block until the operation completes.
    Forever,
    /// Block for at most this long.
    For(Duration),
}

impl Wait {
    /// Convenience constructor for millisecond bounds.
    pub fn millis(ms: u64) -> Self {
        Wait::For(Duration::from_millis(ms))
    }

    /// The instant at which this wait expires, if it has one.
    pub(crate) fn deadline(self) -> Option<Instant> {
        match self {
            Wait::NoWait => Some(Instant::now()),
            Wait::Forever => None,
            Wait::For(d) => Some(Instant::now() + d),
        }
    }

    /// The wait still allowed against `deadline`, or a timeout if it has
    /// passed. Used by re-checking wait loops.
    pub(crate) fn remaining(deadline: Option<Instant>) -> Result<Wait, TimeoutError> {
        match deadline {
            None => Ok(Wait::Forever),
            Some(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(TimeoutError)
                } else {
                    Ok(Wait::For(left))
                }
            }
        }
    }
}

impl From<Duration> for Wait {
    fn from(d: Duration) -> Self {
        Wait::For(d)
    }
}
