use serde::{Deserialize, Serialize};

use crate::attr::{Attr, AttrList};
use crate::Op;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
/**
 * Identifies a node within its owning DAG. Indices are assigned
 * monotonically and never reused, so they stay valid across node removal.
 * Within a [`DagGroup`](crate::Dag), all children draw from one shared
 * index space, which makes an index unique across the whole group.
 */
pub struct NodeIndex(u64);

impl NodeIndex {
    /**
     * Creates an index from its raw value.
     */
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /**
     * The raw index value.
     */
    pub fn raw(self) -> u64 {
        self.0
    }

    /**
     * The index as a `usize`, for slot-table and side-table addressing.
     */
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
/**
 * An operation node. Operand edges (use→def) are owned by the node;
 * use edges (def→use) are the non-owning back-references. Both sides are
 * kept consistent by the [`Dag`](crate::Dag) mutation methods; a node
 * cannot rewire itself.
 */
pub struct Node {
    /**
     * The operation this node performs.
     */
    pub op: Op,

    pub(crate) operands: Vec<NodeIndex>,
    pub(crate) uses: Vec<NodeIndex>,
    pub(crate) attrs: AttrList,
}

impl Node {
    pub(crate) fn new(op: Op) -> Self {
        Self {
            op,
            operands: Vec::new(),
            uses: Vec::new(),
            attrs: AttrList::new(),
        }
    }

    /**
     * The node's ordered operand list.
     */
    pub fn operands(&self) -> &[NodeIndex] {
        &self.operands
    }

    /**
     * The nodes that use this node as an operand. A node may appear more
     * than once if it uses this node in several operand positions.
     */
    pub fn uses(&self) -> &[NodeIndex] {
        &self.uses
    }

    /**
     * The number of operands.
     */
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    /**
     * The number of uses.
     */
    pub fn num_uses(&self) -> usize {
        self.uses.len()
    }

    /**
     * The operand at position `i`.
     *
     * # Panics
     * If `i` is out of bounds.
     */
    pub fn operand_at(&self, i: usize) -> NodeIndex {
        self.operands[i]
    }

    /**
     * True when the node has both operands and uses.
     */
    pub fn is_internal(&self) -> bool {
        !self.operands.is_empty() && !self.uses.is_empty()
    }

    /**
     * The node's attribute list.
     */
    pub fn attrs(&self) -> &AttrList {
        &self.attrs
    }

    /**
     * True if the attribute `A` is set on this node.
     */
    pub fn has<A: Attr>(&self) -> bool {
        self.attrs.has::<A>()
    }

    /**
     * Reads the attribute `A` from this node.
     */
    pub fn get<A: Attr>(&self) -> Option<A::Value> {
        self.attrs.get::<A>()
    }

    /**
     * Writes the attribute `A` on this node.
     */
    pub fn set<A: Attr>(&mut self, value: A::Value) {
        self.attrs.set::<A>(value);
    }
}
