//! Core types for the broker.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a subscription, allocated by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle held by a consumer.
///
/// The handle only names the subscription; its read position lives inside the
/// topic queue. It is deliberately not `Clone`: one handle, one consumer.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId) -> Self {
        Self { id }
    }

    /// The registry-unique id of this subscription.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Registry-wide counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Number of live topics.
    pub topics: usize,
    /// Total subscriptions across all topics.
    pub subscriptions: usize,
    /// Message nodes still waiting for at least one reader.
    pub pending_messages: usize,
}

/// Counters for a single topic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStats {
    pub subscriptions: usize,
    /// Subscriptions that have read everything published so far.
    pub idle_subscriptions: usize,
    pub pending_messages: usize,
}
