//! Per-topic queue shared by all subscriptions of one topic.

use crate::error::{BrokerError, Result};
use crate::types::{SubscriptionId, TopicStats};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use tracing::{trace, warn};

use super::list::{MessageList, NodeIndex};

/// Read position of one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cursor {
    /// Caught up with the tail.
    Idle,
    /// Next unread node.
    At(NodeIndex),
}

/// Message queue of a single topic.
///
/// Every published node carries the number of subscriptions present when it
/// was enqueued. Each read moves one cursor forward and decrements the count of
/// the node it left; the node is reclaimed in the same step its count hits zero.
#[derive(Debug)]
pub(crate) struct TopicQueue {
    /// All subscriptions and their cursors.
    cursors: HashMap<SubscriptionId, Cursor>,
    /// Subscriptions whose cursor is `Idle`.
    idle: HashSet<SubscriptionId>,
    messages: MessageList,
    initial_capacity: usize,
    shrink_threshold: usize,
}

impl TopicQueue {
    pub(crate) fn new(initial_capacity: usize, shrink_threshold: usize) -> Self {
        Self {
            cursors: HashMap::new(),
            idle: HashSet::new(),
            messages: MessageList::with_capacity(initial_capacity),
            initial_capacity,
            shrink_threshold,
        }
    }

    /// Register a subscription. It only sees messages enqueued from now on.
    ///
    /// Returns false if the id was already registered.
    pub(crate) fn add_subscription(&mut self, id: SubscriptionId) -> bool {
        if self.cursors.contains_key(&id) {
            return false;
        }
        self.cursors.insert(id, Cursor::Idle);
        self.idle.insert(id);
        true
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.cursors.contains_key(&id)
    }

    /// Drain a subscription's backlog and remove it.
    ///
    /// Returns the number of messages that were drained unread. The
    /// subscription is removed even if draining hits corrupted data.
    pub(crate) fn remove_subscription(&mut self, id: SubscriptionId) -> Result<usize> {
        if !self.contains(id) {
            return Err(BrokerError::NoSubscription(id));
        }

        let mut drained = 0;
        let outcome = loop {
            match self.read(id) {
                Ok(Some(_)) => drained += 1,
                Ok(None) => break Ok(drained),
                Err(e) => break Err(e),
            }
        };

        self.cursors.remove(&id);
        self.idle.remove(&id);
        outcome
    }

    /// True when no subscription is left.
    pub(crate) fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.cursors.len()
    }

    pub(crate) fn pending_messages(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn stats(&self) -> TopicStats {
        TopicStats {
            subscriptions: self.cursors.len(),
            idle_subscriptions: self.idle.len(),
            pending_messages: self.messages.len(),
        }
    }

    /// Append a message for every current subscription.
    ///
    /// Idle subscriptions are pointed at the new node; the others reach it
    /// when they catch up. Returns the number of readers the node waits for.
    pub(crate) fn enqueue(&mut self, payload: Bytes) -> usize {
        let readers = self.cursors.len();
        if readers == 0 {
            // Nobody can ever advance past it.
            return 0;
        }

        let index = self.messages.push_back(payload, readers as u64);
        for id in self.idle.drain() {
            if let Some(cursor) = self.cursors.get_mut(&id) {
                *cursor = Cursor::At(index);
            }
        }

        trace!(
            seq = self.messages.get(index).map(|n| n.seq),
            readers,
            "enqueued message"
        );
        readers
    }

    /// Read the next message for a subscription.
    ///
    /// `Ok(None)` means the subscription is caught up; it is not an error.
    pub(crate) fn read(&mut self, id: SubscriptionId) -> Result<Option<Bytes>> {
        let cursor = self
            .cursors
            .get_mut(&id)
            .ok_or(BrokerError::NoSubscription(id))?;

        let index = match *cursor {
            Cursor::Idle => return Ok(None),
            Cursor::At(index) => index,
        };

        let (next, seq, payload) = {
            let node = match self.messages.get_mut(index) {
                Some(node) if node.remaining > 0 => node,
                _ => {
                    warn!(subscription = %id, ?index, "cursor points at a dead node");
                    return Err(BrokerError::InvalidData(format!(
                        "cursor of {} points at a dead node ({:?})",
                        id, index
                    )));
                }
            };

            node.remaining -= 1;
            let payload = if node.remaining == 0 {
                None
            } else {
                Some(node.payload.clone())
            };
            (node.next(), node.seq, payload)
        };

        match next {
            Some(next) => *cursor = Cursor::At(next),
            None => {
                *cursor = Cursor::Idle;
                self.idle.insert(id);
            }
        }

        trace!(subscription = %id, seq, "read message");

        match payload {
            Some(payload) => Ok(Some(payload)),
            None => {
                let node = self.messages.remove(index).ok_or_else(|| {
                    BrokerError::InvalidData(format!("node {:?} vanished during read", index))
                })?;
                trace!(seq, "reclaimed message");

                if self
                    .messages
                    .shrink_if_empty(self.shrink_threshold, self.initial_capacity)
                {
                    trace!("released drained queue storage");
                }
                Ok(Some(node.payload))
            }
        }
    }

    #[cfg(test)]
    fn cursor(&self, id: SubscriptionId) -> Option<Cursor> {
        self.cursors.get(&id).copied()
    }

    #[cfg(test)]
    fn remaining_counts(&self) -> Vec<u64> {
        self.messages.iter().map(|n| n.remaining).collect()
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        for (id, cursor) in &self.cursors {
            assert_eq!(
                self.idle.contains(id),
                *cursor == Cursor::Idle,
                "idle set out of sync for {}",
                id
            );
        }
        assert!(self.idle.iter().all(|id| self.cursors.contains_key(id)));
        assert!(self.messages.iter().all(|n| n.remaining > 0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> TopicQueue {
        TopicQueue::new(8, 1024)
    }

    fn msg(i: usize) -> Bytes {
        Bytes::from(format!("{}", i))
    }

    fn drain_all(q: &mut TopicQueue, id: SubscriptionId) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(m) = q.read(id).unwrap() {
            out.push(m);
        }
        out
    }

    #[test]
    fn test_read_in_publish_order() {
        let mut q = queue();
        let a = SubscriptionId(1);
        q.add_subscription(a);

        for i in 0..50 {
            assert_eq!(q.enqueue(msg(i)), 1);
        }
        q.check_invariants();

        let got = drain_all(&mut q, a);
        assert_eq!(got, (0..50).map(msg).collect::<Vec<_>>());
        assert_eq!(q.pending_messages(), 0);
        assert_eq!(q.cursor(a), Some(Cursor::Idle));
        q.check_invariants();
    }

    #[test]
    fn test_idle_read_returns_none() {
        let mut q = queue();
        let a = SubscriptionId(1);
        q.add_subscription(a);

        assert_eq!(q.read(a).unwrap(), None);
        assert_eq!(q.read(a).unwrap(), None);
    }

    #[test]
    fn test_unknown_subscription() {
        let mut q = queue();
        q.add_subscription(SubscriptionId(1));

        let missing = SubscriptionId(2);
        assert_eq!(q.read(missing), Err(BrokerError::NoSubscription(missing)));
        assert_eq!(
            q.remove_subscription(missing),
            Err(BrokerError::NoSubscription(missing))
        );
        assert!(!q.add_subscription(SubscriptionId(1)));
    }

    #[test]
    fn test_enqueue_without_subscribers_keeps_nothing() {
        let mut q = queue();
        assert_eq!(q.enqueue(msg(0)), 0);
        assert_eq!(q.pending_messages(), 0);
    }

    #[test]
    fn test_late_subscriber_sees_no_history() {
        let mut q = queue();
        let early = SubscriptionId(1);
        let late = SubscriptionId(2);
        q.add_subscription(early);

        q.enqueue(msg(0));
        q.enqueue(msg(1));
        q.add_subscription(late);
        q.enqueue(msg(2));

        assert_eq!(q.remaining_counts(), vec![1, 1, 2]);
        assert_eq!(drain_all(&mut q, late), vec![msg(2)]);
        assert_eq!(q.remaining_counts(), vec![1, 1, 1]);
        assert_eq!(drain_all(&mut q, early), vec![msg(0), msg(1), msg(2)]);
        assert_eq!(q.pending_messages(), 0);
        q.check_invariants();
    }

    #[test]
    fn test_node_reclaimed_when_last_reader_passes() {
        let mut q = queue();
        let a = SubscriptionId(1);
        let b = SubscriptionId(2);
        q.add_subscription(a);
        q.add_subscription(b);

        q.enqueue(msg(0));
        q.enqueue(msg(1));
        assert_eq!(q.remaining_counts(), vec![2, 2]);

        assert_eq!(q.read(a).unwrap(), Some(msg(0)));
        assert_eq!(q.remaining_counts(), vec![1, 2]);

        assert_eq!(q.read(b).unwrap(), Some(msg(0)));
        assert_eq!(q.remaining_counts(), vec![2]);
        q.check_invariants();
    }

    #[test]
    fn test_caught_up_subscriber_resumes_on_publish() {
        let mut q = queue();
        let a = SubscriptionId(1);
        let b = SubscriptionId(2);
        q.add_subscription(a);
        q.add_subscription(b);

        q.enqueue(msg(0));
        assert_eq!(drain_all(&mut q, a), vec![msg(0)]);
        assert_eq!(q.stats().idle_subscriptions, 1);

        // `a` is idle and gets attached, `b` still has backlog.
        q.enqueue(msg(1));
        assert_eq!(q.stats().idle_subscriptions, 0);
        assert_eq!(drain_all(&mut q, a), vec![msg(1)]);
        assert_eq!(drain_all(&mut q, b), vec![msg(0), msg(1)]);
        q.check_invariants();
    }

    #[test]
    fn test_remove_lagging_subscription_keeps_others_backlog() {
        let mut q = queue();
        let fast = SubscriptionId(1);
        let slow = SubscriptionId(2);
        q.add_subscription(fast);
        q.add_subscription(slow);

        for i in 0..10 {
            q.enqueue(msg(i));
        }
        for i in 0..4 {
            assert_eq!(q.read(fast).unwrap(), Some(msg(i)));
        }

        assert_eq!(q.remove_subscription(slow).unwrap(), 10);
        assert_eq!(q.subscription_count(), 1);
        assert_eq!(q.remaining_counts(), vec![1; 6]);

        assert_eq!(drain_all(&mut q, fast), (4..10).map(msg).collect::<Vec<_>>());
        assert_eq!(q.pending_messages(), 0);
        q.check_invariants();
    }

    #[test]
    fn test_remove_last_subscription_empties_queue() {
        let mut q = queue();
        let a = SubscriptionId(1);
        q.add_subscription(a);
        q.enqueue(msg(0));

        assert_eq!(q.remove_subscription(a).unwrap(), 1);
        assert!(q.is_empty());
        assert_eq!(q.pending_messages(), 0);
    }

    #[test]
    fn test_dead_cursor_is_invalid_data() {
        let mut q = queue();
        let a = SubscriptionId(1);
        q.add_subscription(a);
        q.enqueue(msg(0));

        let index = match q.cursor(a) {
            Some(Cursor::At(index)) => index,
            other => panic!("expected attached cursor, got {:?}", other),
        };
        q.messages.remove(index).unwrap();

        assert!(matches!(q.read(a), Err(BrokerError::InvalidData(_))));
        // Removal still succeeds and reports the corruption.
        assert!(matches!(
            q.remove_subscription(a),
            Err(BrokerError::InvalidData(_))
        ));
        assert!(q.is_empty());
    }

    #[test]
    fn test_drained_queue_releases_storage() {
        let mut q = TopicQueue::new(4, 16);
        let a = SubscriptionId(1);
        q.add_subscription(a);

        for i in 0..100 {
            q.enqueue(msg(i));
        }
        assert!(q.messages.capacity() >= 100);

        drain_all(&mut q, a);
        assert!(q.messages.capacity() < 100);

        q.enqueue(msg(100));
        assert_eq!(drain_all(&mut q, a), vec![msg(100)]);
    }
}
