//! Filter-to-handler registry.
//!
//! Holds one entry per filter pattern. Registration replaces an existing
//! entry for the same pattern. Lookups clone matching handlers out of the
//! read guard so callers never hold the lock while running or queueing them.

use crate::message::MessageHandler;
use crate::topic::TopicFilter;
use parking_lot::RwLock;
use std::sync::Arc;

struct Entry {
    filter: TopicFilter,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `filter`; returns true when it replaced one
    pub fn insert(&self, filter: TopicFilter, handler: Arc<dyn MessageHandler>) -> bool {
        let mut entries = self.entries.write();
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.filter.as_str() == filter.as_str())
        {
            entry.handler = handler;
            return true;
        }
        entries.push(Entry { filter, handler });
        false
    }

    pub fn remove(&self, pattern: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.filter.as_str() != pattern);
        entries.len() != before
    }

    /// Registered patterns in registration order
    pub fn patterns(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|e| e.filter.as_str().to_string())
            .collect()
    }

    /// Handlers whose filter matches `topic`, one per matching entry
    pub fn matching(&self, topic: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.filter.matches(topic))
            .map(|e| Arc::clone(&e.handler))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
