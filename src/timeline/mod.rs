//! Hierarchical view over a set of recorders: reconstruction and search.

pub mod node;
pub mod reconstruct;
pub mod search;

pub use node::{Node, NodeKind};
pub use reconstruct::build_timeline;
pub use search::TimelineSearch;

/// A tree of [`Node`]s reconstructed from every recorder's event stream.
pub struct Timeline {
    pub(crate) root: Node,
}

impl Timeline {
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Pre-order iterator over every node except the root.
    pub fn iter_preorder(&self) -> impl Iterator<Item = &Node> {
        self.root.children.iter().flat_map(|child| child.iter_preorder())
    }

    pub fn search<'a>(&'a self, query: &'a TimelineSearch) -> impl Iterator<Item = &'a Node> + 'a {
        self.iter_preorder().filter(move |node| query.matches(node))
    }
}
