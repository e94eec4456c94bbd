//! Subscription Registry
//!
//! Maps topic names to the set of connections subscribed to them. The
//! registry only indexes connection identities; the connection handler
//! owns the channel itself and is responsible for closing it.

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::hub::ConnectionId;

/// Thread-safe topic → subscribers index
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// Topic → connections subscribed to it. Never holds an empty set.
    topics: HashMap<String, HashSet<ConnectionId>>,
    /// Connection → topics it is subscribed to, for disconnect cleanup
    by_connection: HashMap<ConnectionId, HashSet<String>>,
}

impl RegistryInner {
    fn remove_pair(&mut self, topic: &str, id: ConnectionId) -> bool {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = subscribers.remove(&id);
        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a topic, creating the topic entry if needed.
    ///
    /// Returns false if the connection was already subscribed.
    pub async fn subscribe(&self, topic: &str, id: ConnectionId) -> bool {
        let mut inner = self.inner.write().await;
        let added = inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(id);
        if added {
            inner
                .by_connection
                .entry(id)
                .or_default()
                .insert(topic.to_string());
        }
        added
    }

    /// Remove a connection from a topic. Missing pairs are a no-op.
    pub async fn unsubscribe(&self, topic: &str, id: ConnectionId) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.remove_pair(topic, id);

        if let Some(topics) = inner.by_connection.get_mut(&id) {
            topics.remove(topic);
            if topics.is_empty() {
                inner.by_connection.remove(&id);
            }
        }

        removed
    }

    /// Remove a connection from every topic it belongs to.
    ///
    /// Returns the topics it was removed from; empty on repeated calls.
    pub async fn remove_connection(&self, id: ConnectionId) -> Vec<String> {
        let mut inner = self.inner.write().await;
        let Some(topics) = inner.by_connection.remove(&id) else {
            return Vec::new();
        };

        let mut removed: Vec<String> = topics
            .into_iter()
            .filter(|topic| inner.remove_pair(topic, id))
            .collect();
        removed.sort();
        removed
    }

    /// Point-in-time copy of a topic's subscribers
    pub async fn snapshot(&self, topic: &str) -> HashSet<ConnectionId> {
        self.inner
            .read()
            .await
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of topics with at least one subscriber
    pub async fn topic_count(&self) -> usize {
        self.inner.read().await.topics.len()
    }

    /// Number of subscribers for a topic
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .read()
            .await
            .topics
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// All live topics with their subscriber counts, sorted by name
    pub async fn topics(&self) -> Vec<(String, usize)> {
        let inner = self.inner.read().await;
        let mut topics: Vec<_> = inner
            .topics
            .iter()
            .map(|(topic, subs)| (topic.clone(), subs.len()))
            .collect();
        topics.sort();
        topics
    }
}
