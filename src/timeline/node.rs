//! Tagged-variant timeline tree.
//!
//! Ion models timeline nodes as a small virtual hierarchy
//! (`timelinenode.h`, `timelineevent.h`, `timelinerange.h`,
//! `timelinethread.h`). Modeled as a tagged variant instead of
//! deep virtual dispatch, so one `Node` enum stands in for all five kinds.

use std::collections::BTreeMap;

use serde_json::Value;

/// One node in the reconstructed timeline tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub begin_us: u32,
    pub end_us: u32,
    pub args: BTreeMap<String, Value>,
    pub children: Vec<Node>,
}

/// What a [`Node`] represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The tree root. Never matched by a search predicate.
    Root,
    /// One subtree per recorder.
    Thread { thread_id: u64, name: String },
    /// A `scope#enter`/`scope#leave` pair (built-in or custom).
    Scope { name: String },
    /// A `timing#frameStart`/`timing#frameEnd` pair.
    Frame { frame_number: u32 },
    /// A `timeRange#begin`/`timeRange#end` pair.
    Range { id: u32, name: String },
    /// A point-in-time annotation (`trace#timeStamp`); does not nest.
    Event { name: String },
}

impl Node {
    pub fn root() -> Self {
        Self { kind: NodeKind::Root, begin_us: 0, end_us: 0, args: BTreeMap::new(), children: Vec::new() }
    }

    pub fn new(kind: NodeKind, begin_us: u32) -> Self {
        Self { kind, begin_us, end_us: begin_us, args: BTreeMap::new(), children: Vec::new() }
    }

    /// Duration in microseconds. Zero means this node is a point event when queried.
    pub fn duration_us(&self) -> u32 {
        self.end_us.saturating_sub(self.begin_us)
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Root => None,
            NodeKind::Thread { name, .. } => Some(name),
            NodeKind::Scope { name } => Some(name),
            NodeKind::Frame { .. } => None,
            NodeKind::Range { name, .. } => Some(name),
            NodeKind::Event { name } => Some(name),
        }
    }

    pub fn thread_id(&self) -> Option<u64> {
        match &self.kind {
            NodeKind::Thread { thread_id, .. } => Some(*thread_id),
            _ => None,
        }
    }

    /// Pre-order iterator over this node and all descendants, including self.
    pub fn iter_preorder(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }
}

/// Pre-order iterator over a [`Node`] tree.
pub struct PreOrder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}
