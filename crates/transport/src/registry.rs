//! Subscription registry.
//!
//! Tracks which callback is bound to which topic so that bindings can be
//! re-issued to the transport after a reconnect. All access goes through a
//! single lock that is held only for the bookkeeping itself, never across a
//! transport call.

use crate::traits::Callback;
use corelib::Topic;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<Topic, Callback>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `callback` to `topic`, returning the callback it replaced.
    pub fn insert(&self, topic: &str, callback: Callback) -> Option<Callback> {
        self.entries.lock().insert(topic.to_string(), callback)
    }

    /// Callback currently bound to `topic`.
    pub fn get(&self, topic: &str) -> Option<Callback> {
        self.entries.lock().get(topic).cloned()
    }

    /// Remove the binding for `topic`.
    pub fn remove(&self, topic: &str) -> Option<Callback> {
        self.entries.lock().remove(topic)
    }

    /// Remove the binding only if it is still `callback`.
    ///
    /// Used to roll back a failed subscribe without clobbering a binding a
    /// concurrent caller installed in the meantime.
    pub fn remove_if_same(&self, topic: &str, callback: &Callback) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(topic) {
            Some(current) if Arc::ptr_eq(current, callback) => {
                entries.remove(topic);
                true
            }
            _ => false,
        }
    }

    /// Copy of every binding, sorted by topic.
    pub fn snapshot(&self) -> Vec<(Topic, Callback)> {
        let mut bindings: Vec<(Topic, Callback)> = self
            .entries
            .lock()
            .iter()
            .map(|(topic, callback)| (topic.clone(), Arc::clone(callback)))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.entries.lock().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.lock().contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every binding.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}
