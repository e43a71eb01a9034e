//! # Fanout
//!
//! An in-process, multi-topic publish/subscribe broker.
//!
//! ## Core Concepts
//!
//! - **Topics**: Named channels, created on first subscribe and removed when
//!   the last subscriber leaves
//! - **Subscriptions**: Independent cursors over a topic's shared message list
//! - **Queues**: One per topic; a message is stored once, handed out to every
//!   subscription that was present when it was published, and freed as soon
//!   as the last of them has read it
//!
//! Polling never blocks. A caught-up subscription simply gets `None`.
//!
//! ## Example
//!
//! ```
//! use fanout::TopicRegistry;
//!
//! let registry = TopicRegistry::new();
//! let sub = registry.subscribe("news");
//!
//! registry.publish("news", "hello");
//!
//! assert_eq!(registry.poll("news", &sub)?.as_deref(), Some(&b"hello"[..]));
//! assert_eq!(registry.poll("news", &sub)?, None);
//!
//! registry.unsubscribe("news", &sub);
//! assert_eq!(registry.topics(), 0);
//! # Ok::<(), fanout::BrokerError>(())
//! ```

pub mod error;
mod queue;
pub mod registry;
pub mod types;

// Re-exports
pub use bytes::Bytes;
pub use error::{BrokerError, Result};
pub use registry::{RegistryConfig, TopicRegistry};
pub use types::{RegistryStats, Subscription, SubscriptionId, TopicStats};
