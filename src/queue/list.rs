//! Slab-backed, doubly linked message list.
//!
//! Nodes live in a `Vec` of slots. Removed slots are threaded onto a free list
//! and reused by later pushes, so a node's index stays valid for as long as the
//! node is alive and cursors can hold plain indices instead of references.

use bytes::Bytes;

/// Stable position of a node inside a [`MessageList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeIndex(usize);

/// One published message.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) payload: Bytes,
    /// Subscriptions that still have to read this node.
    pub(crate) remaining: u64,
    /// Publish order within the owning queue.
    pub(crate) seq: u64,
    prev: Option<NodeIndex>,
    next: Option<NodeIndex>,
}

impl Node {
    pub(crate) fn next(&self) -> Option<NodeIndex> {
        self.next
    }
}

#[derive(Debug)]
enum Slot {
    Occupied(Node),
    Vacant { next_free: Option<usize> },
}

#[derive(Debug)]
pub(crate) struct MessageList {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    head: Option<NodeIndex>,
    tail: Option<NodeIndex>,
    len: usize,
    next_seq: u64,
}

impl MessageList {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            head: None,
            tail: None,
            len: 0,
            next_seq: 0,
        }
    }

    /// Number of live nodes.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots the slab can hold without reallocating.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Append a node at the tail and return its index.
    pub(crate) fn push_back(&mut self, payload: Bytes, remaining: u64) -> NodeIndex {
        let seq = self.next_seq;
        self.next_seq += 1;

        let node = Node {
            payload,
            remaining,
            seq,
            prev: self.tail,
            next: None,
        };

        let index = match self.free_head.take() {
            Some(slot) => {
                let old = std::mem::replace(&mut self.slots[slot], Slot::Occupied(node));
                debug_assert!(matches!(old, Slot::Vacant { .. }));
                if let Slot::Vacant { next_free } = old {
                    self.free_head = next_free;
                }
                NodeIndex(slot)
            }
            None => {
                self.slots.push(Slot::Occupied(node));
                NodeIndex(self.slots.len() - 1)
            }
        };

        match self.tail {
            Some(tail) => {
                if let Some(prev) = self.get_mut(tail) {
                    prev.next = Some(index);
                }
            }
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        index
    }

    pub(crate) fn get(&self, index: NodeIndex) -> Option<&Node> {
        match self.slots.get(index.0) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        match self.slots.get_mut(index.0) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    /// Unlink a node from any position and hand its slot to the free list.
    ///
    /// Returns `None` if the slot is already vacant.
    pub(crate) fn remove(&mut self, index: NodeIndex) -> Option<Node> {
        let slot = self.slots.get_mut(index.0)?;
        if matches!(slot, Slot::Vacant { .. }) {
            return None;
        }

        let node = match std::mem::replace(
            slot,
            Slot::Vacant {
                next_free: self.free_head,
            },
        ) {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => return None,
        };
        self.free_head = Some(index.0);

        match node.prev {
            Some(prev) => {
                if let Some(prev) = self.get_mut(prev) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(next) = self.get_mut(next) {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        self.len -= 1;

        Some(node)
    }

    /// Drop the slab allocation if the list is empty and holds more than
    /// `threshold` slots. Returns true if memory was released.
    pub(crate) fn shrink_if_empty(&mut self, threshold: usize, keep: usize) -> bool {
        if !self.is_empty() || self.slots.capacity() <= threshold {
            return false;
        }

        self.slots = Vec::with_capacity(keep);
        self.free_head = None;
        self.head = None;
        self.tail = None;
        true
    }

    /// Iterate nodes from head to tail.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            next: self.head,
        }
    }
}

#[cfg(test)]
pub(crate) struct Iter<'a> {
    list: &'a MessageList,
    next: Option<NodeIndex>,
}

#[cfg(test)]
impl<'a> Iterator for Iter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.get(self.next?)?;
        self.next = node.next;
        Some(node)
    }
}
