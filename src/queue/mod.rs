//! Shared per-topic message queues.
//!
//! A topic has exactly one queue. All of its subscriptions read the same
//! message list through their own cursor, and a message is dropped as soon as
//! the last subscription that needs it has moved past it.

mod list;
mod topic;

pub(crate) use topic::TopicQueue;
