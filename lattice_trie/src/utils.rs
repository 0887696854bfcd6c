//! Various types and logic that don't fit well into any other module.

use std::fmt::{self, Display};

use crate::{dictionary::Node, hashing::Hasher};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
/// Simplified dictionary node type to make logging cleaner.
pub enum NodeKind {
    /// Empty subtree.
    Empty,

    /// Stubbed subtree known only by digest.
    Stub,

    /// Leaf node.
    Leaf,

    /// Internal node.
    Internal,
}

impl<V, H: Hasher> From<&Node<V, H>> for NodeKind {
    fn from(node: &Node<V, H>) -> Self {
        match node {
            Node::Empty => Self::Empty,
            Node::Stub(_) => Self::Stub,
            Node::Leaf(_) => Self::Leaf,
            Node::Internal(_) => Self::Internal,
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Empty => "Empty",
            NodeKind::Stub => "Stub",
            NodeKind::Leaf => "Leaf",
            NodeKind::Internal => "Internal",
        };

        write!(f, "{}", s)
    }
}

/// Renders a path prefix as a bit string for trace output.
pub(crate) fn display_path(bits: &[bool]) -> String {
    bits.iter().map(|b| if *b { '1' } else { '0' }).collect()
}
