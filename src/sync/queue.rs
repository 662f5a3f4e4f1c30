//! Unbounded FIFO with a blocking pop.

use std::{collections::VecDeque, sync::Mutex};

use super::{Event, TimeoutError, Wait};

/// Multi-producer FIFO whose `pop` blocks until an item is available.
///
/// Built on [`Event`]: the sticky flag means a push that lands between a
/// consumer's emptiness check and its block is still seen, so no wakeup is
/// lost. The flag is cleared only when a pop drains the last item, under
/// the same lock that guards the items.
pub struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Event,
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Event::new(),
        }
    }

    pub fn push(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        items.push_back(item);
        self.available.set();
    }

    /// Remove and return the oldest item, blocking up to `wait`.
    pub fn pop(&self, wait: Wait) -> Result<T, TimeoutError> {
        let deadline = wait.deadline();
        loop {
            {
                let mut items = self.items.lock().unwrap();
                if let Some(item) = items.pop_front() {
                    if items.is_empty() {
                        self.available.clear();
                    }
                    return Ok(item);
                }
            }
            self.available.wait(Wait::remaining(deadline)?)?;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
