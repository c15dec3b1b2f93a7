//! Immutable quadtree nodes.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// Level of the raw-bit leaves: 4x4 cells packed into a `u16`.
pub const LEAF_LEVEL: u32 = 2;

/// Shared handle to a canonical node. Identity is pointer identity.
pub type NodeRef = Arc<Node>;

/// Unique, never reused, identity of a node within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

pub(crate) enum NodeBody {
    /// Bit `y * 4 + x` is the cell at `(x, y)` within the block.
    Leaf(u16),
    /// `[nw, ne, sw, se]`, each one level below this node.
    Branch([NodeRef; 4]),
}

/// A `2^level` square block of cells.
///
/// Built only through `NodeStore`, which guarantees that equal contents share
/// one instance.
pub struct Node {
    id: NodeId,
    level: u32,
    population: u64,
    body: NodeBody,
    /// Centre advanced by `2^(level - 2)` generations. Written once.
    pub(crate) result: OnceLock<NodeRef>,
}

impl Node {
    pub(crate) fn leaf(id: NodeId, bits: u16) -> Self {
        Self {
            id,
            level: LEAF_LEVEL,
            population: u64::from(bits.count_ones()),
            body: NodeBody::Leaf(bits),
            result: OnceLock::new(),
        }
    }

    pub(crate) fn branch(id: NodeId, children: [NodeRef; 4]) -> Self {
        let level = children[0].level + 1;
        debug_assert!(children.iter().all(|c| c.level + 1 == level));
        let population = children
            .iter()
            .map(|c| c.population)
            .fold(0u64, u64::saturating_add);
        Self {
            id,
            level,
            population,
            body: NodeBody::Branch(children),
            result: OnceLock::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn population(&self) -> u64 {
        self.population
    }

    pub fn is_empty(&self) -> bool {
        self.population == 0
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    /// Raw bits for leaves, `None` for branches.
    pub fn leaf_bits(&self) -> Option<u16> {
        match self.body {
            NodeBody::Leaf(bits) => Some(bits),
            NodeBody::Branch(_) => None,
        }
    }

    /// `[nw, ne, sw, se]` for branches, `None` for leaves.
    pub fn children(&self) -> Option<&[NodeRef; 4]> {
        match &self.body {
            NodeBody::Leaf(_) => None,
            NodeBody::Branch(children) => Some(children),
        }
    }

    /// Whether this node already memoized its full-jump result.
    pub fn has_result(&self) -> bool {
        self.result.get().is_some()
    }

    pub(crate) fn quadrants(&self) -> &[NodeRef; 4] {
        match &self.body {
            NodeBody::Branch(children) => children,
            NodeBody::Leaf(_) => unreachable!("quadrants requested on a leaf"),
        }
    }

    pub(crate) fn nw(&self) -> &NodeRef {
        &self.quadrants()[0]
    }

    pub(crate) fn ne(&self) -> &NodeRef {
        &self.quadrants()[1]
    }

    pub(crate) fn sw(&self) -> &NodeRef {
        &self.quadrants()[2]
    }

    pub(crate) fn se(&self) -> &NodeRef {
        &self.quadrants()[3]
    }

    pub(crate) fn bits(&self) -> u16 {
        match self.body {
            NodeBody::Leaf(bits) => bits,
            NodeBody::Branch(_) => unreachable!("bits requested on a branch"),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("id", &self.id.0)
            .field("level", &self.level)
            .field("population", &self.population);
        if let NodeBody::Leaf(bits) = self.body {
            s.field("bits", &format_args!("{bits:#06x}"));
        }
        s.finish()
    }
}
