//! Predicate-based pre-order search over a reconstructed timeline.
//!
//! Grounded on `ion/profile/timelinesearch.h`, which exposes the same
//! handful of constructors (by type, by name, by thread id, by window, or a
//! caller-supplied predicate) over a pre-order walk.

use super::node::{Node, NodeKind};

/// A predicate used to filter [`Timeline::search`](super::Timeline::search) results.
pub struct TimelineSearch {
    predicate: Box<dyn Fn(&Node) -> bool>,
}

impl TimelineSearch {
    pub fn custom(predicate: impl Fn(&Node) -> bool + 'static) -> Self {
        Self { predicate: Box::new(predicate) }
    }

    pub fn by_kind(kind_matches: impl Fn(&NodeKind) -> bool + 'static) -> Self {
        Self::custom(move |node| kind_matches(&node.kind))
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::custom(move |node| node.name() == Some(name.as_str()))
    }

    pub fn by_thread_id(thread_id: u64) -> Self {
        Self::custom(move |node| node.thread_id() == Some(thread_id))
    }

    /// Matches nodes whose `[begin, end]` interval lies fully inside `[from, to]`.
    pub fn by_window(from: u32, to: u32) -> Self {
        Self::custom(move |node| node.begin_us >= from && node.end_us <= to)
    }

    pub(crate) fn matches(&self, node: &Node) -> bool {
        (self.predicate)(node)
    }
}
