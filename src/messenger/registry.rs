//! Topic → handler-name → subscription map.

use std::collections::HashMap;
use std::sync::Arc;

use super::subscription::Subscription;
use crate::handler::Handler;

/// Subscriptions keyed by topic, then handler name.
///
/// Plain data: the messenger wraps it in a mutex and every method here runs
/// with that lock held, so none of them may block or call into handlers.
#[derive(Default)]
pub(crate) struct Registry {
    topics: HashMap<String, HashMap<String, Subscription>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert `subscription`, cancelling and returning any previous one for
    /// the same (topic, handler name).
    pub(crate) fn insert(&mut self, subscription: Subscription) -> Option<Subscription> {
        let replaced = self
            .topics
            .entry(subscription.topic.clone())
            .or_default()
            .insert(subscription.handler_name().to_string(), subscription);
        if let Some(old) = &replaced {
            old.token.cancel();
        }
        replaced
    }

    /// Remove (topic, name) only if it is still registration `id`.
    pub(crate) fn remove_if_current(&mut self, topic: &str, name: &str, id: u64) -> bool {
        let Some(handlers) = self.topics.get_mut(topic) else {
            return false;
        };
        if handlers.get(name).map(|s| s.id) != Some(id) {
            return false;
        }
        handlers.remove(name);
        if handlers.is_empty() {
            self.topics.remove(topic);
        }
        true
    }

    /// Remove and return (topic, name).
    pub(crate) fn remove_handler(&mut self, topic: &str, name: &str) -> Option<Subscription> {
        let handlers = self.topics.get_mut(topic)?;
        let removed = handlers.remove(name);
        if handlers.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Remove and return every subscription for `topic`.
    pub(crate) fn remove_topic(&mut self, topic: &str) -> Vec<Subscription> {
        self.topics
            .remove(topic)
            .map(|handlers| handlers.into_values().collect())
            .unwrap_or_default()
    }

    /// Remove and return every subscription.
    pub(crate) fn drain(&mut self) -> Vec<Subscription> {
        self.topics
            .drain()
            .flat_map(|(_, handlers)| handlers.into_values())
            .collect()
    }

    /// Handlers currently registered for `topic`.
    pub(crate) fn handlers_for(&self, topic: &str) -> Vec<Arc<dyn Handler>> {
        self.topics
            .get(topic)
            .map(|handlers| handlers.values().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn contains_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub(crate) fn contains(&self, topic: &str, name: &str) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|handlers| handlers.contains_key(name))
    }

    pub(crate) fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    pub(crate) fn handler_names(&self, topic: &str) -> Vec<String> {
        self.topics
            .get(topic)
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.topics.values().map(HashMap::len).sum()
    }
}
