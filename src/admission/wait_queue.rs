//! FIFO wait list for gate admission.
//!
//! # Responsibilities
//! - Hold one node per suspended acquirer, in arrival order
//! - Enqueue at the tail, grant from the head, unlink from anywhere in O(1)
//! - Record how each node was settled so racing triggers settle it once
//!
//! # Design Decisions
//! - Nodes live in a slab and link to each other by key, not by pointer
//! - The acquirer owns its slab entry: the gate unlinks nodes but only the
//!   acquirer removes them, so a key is never reused while someone holds it

use slab::Slab;
use tokio::sync::oneshot;

/// How a wait node ended up, or `Queued` if it has not yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Queued,
    Granted,
    TimedOut,
    Cancelled,
}

#[derive(Debug)]
struct WaitNode {
    prev: Option<usize>,
    next: Option<usize>,
    state: NodeState,
    grant: Option<oneshot::Sender<()>>,
}

/// Doubly-linked FIFO list over a slab arena.
#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    nodes: Slab<WaitNode>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl WaitQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of nodes still queued.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a node at the tail and return its key.
    pub(crate) fn push_back(&mut self, grant: oneshot::Sender<()>) -> usize {
        let key = self.nodes.insert(WaitNode {
            prev: self.tail,
            next: None,
            state: NodeState::Queued,
            grant: Some(grant),
        });
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        self.len += 1;
        key
    }

    /// Unlink the head node, mark it granted and hand back its completion sender.
    pub(crate) fn grant_front(&mut self) -> Option<oneshot::Sender<()>> {
        let key = self.head?;
        self.unlink(key);
        let node = &mut self.nodes[key];
        node.state = NodeState::Granted;
        node.grant.take()
    }

    /// Settle a queued node as rejected.
    ///
    /// Returns `false` when the node was already settled, in which case
    /// nothing changes.
    pub(crate) fn reject(&mut self, key: usize, outcome: NodeState) -> bool {
        debug_assert!(matches!(outcome, NodeState::TimedOut | NodeState::Cancelled));
        if self.state(key) != Some(NodeState::Queued) {
            return false;
        }
        self.unlink(key);
        let node = &mut self.nodes[key];
        node.state = outcome;
        node.grant = None;
        true
    }

    pub(crate) fn state(&self, key: usize) -> Option<NodeState> {
        self.nodes.get(key).map(|node| node.state)
    }

    /// Free a node's slab entry, unlinking it first if it is still queued.
    pub(crate) fn remove(&mut self, key: usize) -> Option<NodeState> {
        let state = self.state(key)?;
        if state == NodeState::Queued {
            self.unlink(key);
        }
        self.nodes.remove(key);
        Some(state)
    }

    fn unlink(&mut self, key: usize) {
        let (prev, next) = {
            let node = &mut self.nodes[key];
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }
}
