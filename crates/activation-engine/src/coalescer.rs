//! Tick coalescing
//!
//! Upstream changes arrive far more often than the host renders. Rather
//! than re-evaluating on every change, callers mark nodes dirty and the
//! engine drains the set once per tick, so a burst of changes to one node
//! costs a single evaluation.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::types::NodeId;

#[derive(Debug, Default)]
struct DirtySet {
    all: bool,
    nodes: HashSet<NodeId>,
}

/// Nodes drained for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirtyBatch {
    /// Every node on the canvas
    All,
    /// Only these nodes, unordered
    Nodes(HashSet<NodeId>),
}

impl DirtyBatch {
    pub fn contains(&self, node_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Nodes(nodes) => nodes.contains(node_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Nodes(nodes) if nodes.is_empty())
    }
}

/// Collects dirty node ids between ticks
///
/// Marking is cheap and safe from any thread, including oscillator tasks.
#[derive(Debug, Default)]
pub struct TickCoalescer {
    dirty: Mutex<DirtySet>,
}

impl TickCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node for the next tick
    pub fn mark(&self, node_id: &str) {
        let mut dirty = self.dirty.lock();
        if !dirty.all {
            dirty.nodes.insert(node_id.to_string());
        }
    }

    /// Queue every node for the next tick
    pub fn mark_all(&self) {
        let mut dirty = self.dirty.lock();
        dirty.all = true;
        dirty.nodes.clear();
    }

    /// Drop a node that no longer exists
    pub fn forget(&self, node_id: &str) {
        self.dirty.lock().nodes.remove(node_id);
    }

    /// Whether anything is waiting for a tick
    pub fn is_pending(&self) -> bool {
        let dirty = self.dirty.lock();
        dirty.all || !dirty.nodes.is_empty()
    }

    /// Take the pending set, leaving it empty
    pub fn drain(&self) -> DirtyBatch {
        let mut dirty = self.dirty.lock();
        let taken = std::mem::take(&mut *dirty);
        if taken.all {
            DirtyBatch::All
        } else {
            DirtyBatch::Nodes(taken.nodes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_marks_coalesce() {
        let coalescer = TickCoalescer::new();
        for _ in 0..100 {
            coalescer.mark("a");
        }
        coalescer.mark("b");

        match coalescer.drain() {
            DirtyBatch::Nodes(nodes) => assert_eq!(nodes.len(), 2),
            DirtyBatch::All => panic!("Expected a node batch"),
        }
        assert!(!coalescer.is_pending());
        assert!(coalescer.drain().is_empty());
    }

    #[test]
    fn test_mark_all_absorbs_marks() {
        let coalescer = TickCoalescer::new();
        coalescer.mark("a");
        coalescer.mark_all();
        coalescer.mark("b");

        let batch = coalescer.drain();
        assert_eq!(batch, DirtyBatch::All);
        assert!(batch.contains("anything"));
    }

    #[test]
    fn test_forget() {
        let coalescer = TickCoalescer::new();
        coalescer.mark("a");
        coalescer.forget("a");
        assert!(!coalescer.is_pending());
    }
}
