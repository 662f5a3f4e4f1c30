//! Topic-based publish/subscribe dispatcher.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    thread,
};

use log::debug;

type Subscriber<T> = Arc<dyn Fn(&str, T) + Send + Sync + 'static>;

/// Topic registry that fans each publish out to independent threads.
///
/// Subscribers are kept in first-subscribed order per topic, but no
/// ordering is guaranteed between their invocations for one publish: each
/// callback runs on its own spawned thread. This fan-out is unbounded by
/// design — the resource tradeoff is documented, not hidden. A callback
/// subscribed while a publish is in flight never receives that publish;
/// the subscriber list is snapshotted under the registry lock first.
pub struct PubSub<T> {
    registry: Mutex<HashMap<String, Vec<Subscriber<T>>>>,
}

impl<T: Clone + Send + 'static> PubSub<T> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Append a callback to a topic's subscriber list.
    pub fn subscribe<F>(&self, topic: &str, callback: F)
    where
        F: Fn(&str, T) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap();
        registry
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Deliver `payload` to every current subscriber of `topic`, one
    /// spawned thread per callback. Returns how many were dispatched.
    pub fn publish(&self, topic: &str, payload: T) -> usize {
        let snapshot: Vec<Subscriber<T>> = {
            let registry = self.registry.lock().unwrap();
            registry.get(topic).cloned().unwrap_or_default()
        };

        debug!("publishing to {topic}: {} subscribers", snapshot.len());
        let dispatched = snapshot.len();
        for callback in snapshot {
            let topic = topic.to_string();
            let payload = payload.clone();
            thread::spawn(move || callback(&topic, payload));
        }
        dispatched
    }

    /// Number of subscribers currently registered for a topic.
    pub fn subscribers(&self, topic: &str) -> usize {
        self.registry
            .lock()
            .unwrap()
            .get(topic)
            .map_or(0, Vec::len)
    }
}

impl<T: Clone + Send + 'static> Default for PubSub<T> {
    fn default() -> Self {
        Self::new()
    }
}
