//! Bounded pool of persistent worker threads.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, mpsc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use log::debug;
use thiserror::Error;

use super::{Future, Promise};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("thread pool is shut down")]
pub struct PoolClosed;

/// Work queue drained by a lazily-grown, capped set of persistent workers.
///
/// `submit` never blocks: the task is enqueued and its [`Future`] returned
/// immediately; a new worker is spawned only if fewer than `max_workers`
/// are alive. Workers are never shrunk. A task that panics fails its own
/// future and nothing else — the worker survives.
///
/// [`shutdown`](Self::shutdown) is abrupt by contract: queued tasks are
/// discarded unrun and nothing is drained or awaited.
pub struct BoundedThreadPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    receiver: Mutex<mpsc::Receiver<Job>>,
    workers: Mutex<Vec<Worker>>,
    stopping: AtomicBool,
    max_workers: usize,
}

struct Worker {
    id: usize,
    // Held only to keep the worker accounted for; never joined.
    _thread: thread::JoinHandle<()>,
}

impl BoundedThreadPool {
    pub fn new(max_workers: usize) -> Self {
        assert!(max_workers > 0);

        let (sender, receiver) = mpsc::channel();
        Self {
            shared: Arc::new(PoolShared {
                sender: Mutex::new(Some(sender)),
                receiver: Mutex::new(receiver),
                workers: Mutex::new(Vec::with_capacity(max_workers)),
                stopping: AtomicBool::new(false),
                max_workers,
            }),
        }
    }

    /// Enqueue a task and return its future without blocking.
    pub fn submit<T, F>(&self, task: F) -> Result<Future<T>, PoolClosed>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (future, promise) = Future::new();
        let job: Job = Box::new(move || run_task(task, promise));

        {
            let sender = self.shared.sender.lock().unwrap();
            sender
                .as_ref()
                .ok_or(PoolClosed)?
                .send(job)
                .map_err(|_| PoolClosed)?;
        }

        self.spawn_worker_if_below_cap();
        Ok(future)
    }

    /// Number of live workers.
    pub fn workers(&self) -> usize {
        self.shared.workers.lock().unwrap().len()
    }

    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// Stop the pool without draining: queued tasks are discarded, a task
    /// already running finishes on its own, workers are dropped unjoined.
    pub fn shutdown(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.sender.lock().unwrap().take();
        for worker in self.shared.workers.lock().unwrap().drain(..) {
            debug!("releasing worker {}", worker.id);
        }
    }

    fn spawn_worker_if_below_cap(&self) {
        let mut workers = self.shared.workers.lock().unwrap();
        if workers.len() < self.shared.max_workers {
            let id = workers.len();
            workers.push(Worker::new(id, Arc::clone(&self.shared)));
        }
    }
}

impl Drop for BoundedThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Worker {
    fn new(id: usize, shared: Arc<PoolShared>) -> Self {
        let thread = thread::spawn(move || {
            loop {
                let msg = shared.receiver.lock().unwrap().recv();
                if shared.stopping.load(Ordering::SeqCst) {
                    debug!("worker {id} stopping, discarding any claimed task");
                    break;
                }
                match msg {
                    Ok(job) => {
                        debug!("worker {id} running a task");
                        job();
                    }
                    Err(_) => {
                        debug!("worker {id} disconnected");
                        break;
                    }
                }
            }
        });

        Self {
            id,
            _thread: thread,
        }
    }
}

fn run_task<T, F>(task: F, promise: Promise<T>)
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(value) => promise.set_value(value),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            debug!("worker task failed: {reason}");
            promise.set_error(reason);
        }
    }
}
