//! One-shot result box with a blocking getter.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::{Event, TimeoutError, Wait};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FutureError {
    #[error("timed out waiting for a result")]
    Timeout(#[from] TimeoutError),
    /// The producing task failed; carries its panic/error message.
    #[error("task failed: {0}")]
    Failed(String),
    /// The result was already taken by an earlier `get`.
    #[error("result already taken")]
    Taken,
}

struct Shared<T> {
    slot: Mutex<Option<Result<T, String>>>,
    done: Event,
}

/// The consuming side of a one-shot asynchronous outcome.
///
/// A `Future` is paired with exactly one [`Promise`]; whichever value or
/// error the promise settles with is what `get` hands out, once.
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

/// The producing side of a [`Future`].
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Future<T> {
    pub fn new() -> (Future<T>, Promise<T>) {
        let shared = Arc::new(Shared {
            slot: Mutex::new(None),
            done: Event::new(),
        });
        (
            Future {
                shared: Arc::clone(&shared),
            },
            Promise { shared },
        )
    }

    /// Block until the outcome is available, then take it.
    pub fn get(&self, wait: Wait) -> Result<T, FutureError> {
        self.shared.done.wait(wait)?;
        match self.shared.slot.lock().unwrap().take() {
            Some(Ok(value)) => Ok(value),
            Some(Err(reason)) => Err(FutureError::Failed(reason)),
            None => Err(FutureError::Taken),
        }
    }

    /// Whether the outcome has been produced (it may already be taken).
    pub fn is_done(&self) -> bool {
        self.shared.done.is_set()
    }
}

impl<T> Promise<T> {
    /// Settle the future with a value.
    pub fn set_value(self, value: T) {
        self.settle(Ok(value));
    }

    /// Settle the future with a failure message.
    pub fn set_error(self, reason: impl Into<String>) {
        self.settle(Err(reason.into()));
    }

    fn settle(self, outcome: Result<T, String>) {
        *self.shared.slot.lock().unwrap() = Some(outcome);
        self.shared.done.set();
    }
}
