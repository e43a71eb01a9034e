//! Topic registry tying queues and subscriptions together.

use crate::error::{BrokerError, Result};
use crate::queue::TopicQueue;
use crate::types::{RegistryStats, Subscription, SubscriptionId, TopicStats};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Registry configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Message slots pre-allocated for every new topic queue.
    pub initial_queue_capacity: usize,

    /// Slot capacity above which a fully drained queue gives its memory back.
    pub shrink_threshold: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_queue_capacity: 64,
            shrink_threshold: 4096,
        }
    }
}

/// In-process publish/subscribe broker.
///
/// Topics are created on the first subscribe and deleted when their last
/// subscription leaves. Every operation runs under one registry-wide lock.
pub struct TopicRegistry {
    config: RegistryConfig,

    /// Live topics by name.
    topics: Mutex<HashMap<String, TopicQueue>>,

    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl TopicRegistry {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Subscribe to a topic, creating it if needed.
    ///
    /// The subscription receives only messages published after this call.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut topics = self.topics.lock();

        let queue = topics.entry(topic.to_owned()).or_insert_with(|| {
            debug!(topic, "created topic");
            TopicQueue::new(
                self.config.initial_queue_capacity,
                self.config.shrink_threshold,
            )
        });
        queue.add_subscription(id);

        debug!(topic, subscription = %id, "subscribed");
        Subscription::new(id)
    }

    /// Drain and remove a subscription, deleting the topic if it was the last one.
    ///
    /// Unknown topics and handles are ignored.
    pub fn unsubscribe(&self, topic: &str, sub: &Subscription) {
        let mut topics = self.topics.lock();
        let Some(queue) = topics.get_mut(topic) else {
            debug!(topic, subscription = %sub.id(), "unsubscribe from missing topic ignored");
            return;
        };

        match queue.remove_subscription(sub.id()) {
            Ok(drained) => {
                debug!(topic, subscription = %sub.id(), drained, "unsubscribed");
            }
            Err(BrokerError::NoSubscription(id)) => {
                debug!(topic, subscription = %id, "unsubscribe of unknown handle ignored");
                return;
            }
            Err(e) => {
                warn!(topic, subscription = %sub.id(), error = %e, "unsubscribe drain failed");
            }
        }

        if queue.is_empty() {
            topics.remove(topic);
            debug!(topic, "removed topic");
        }
    }

    /// Publish a payload to every current subscription of a topic.
    ///
    /// Returns the number of subscriptions the message was queued for. A topic
    /// without subscriptions has no queue, so the message is dropped and 0 is
    /// returned.
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        let mut topics = self.topics.lock();
        match topics.get_mut(topic) {
            Some(queue) => queue.enqueue(payload.into()),
            None => {
                debug!(topic, "no subscribers, message dropped");
                0
            }
        }
    }

    /// Fetch the next message for a subscription without blocking.
    ///
    /// Returns `Ok(None)` when the subscription has nothing left to read.
    pub fn poll(&self, topic: &str, sub: &Subscription) -> Result<Option<Bytes>> {
        let mut topics = self.topics.lock();
        topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::NoTopic(topic.to_owned()))?
            .read(sub.id())
    }

    /// Number of live topics.
    pub fn topics(&self) -> usize {
        self.topics.lock().len()
    }

    /// Number of subscriptions across all topics.
    pub fn subscriptions(&self) -> usize {
        self.topics
            .lock()
            .values()
            .map(TopicQueue::subscription_count)
            .sum()
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.lock().contains_key(topic)
    }

    /// Registry-wide counters, taken under one lock.
    pub fn stats(&self) -> RegistryStats {
        let topics = self.topics.lock();
        RegistryStats {
            topics: topics.len(),
            subscriptions: topics.values().map(TopicQueue::subscription_count).sum(),
            pending_messages: topics.values().map(TopicQueue::pending_messages).sum(),
        }
    }

    /// Counters for one topic, or `None` if it does not exist.
    pub fn topic_stats(&self, topic: &str) -> Option<TopicStats> {
        self.topics.lock().get(topic).map(TopicQueue::stats)
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}
