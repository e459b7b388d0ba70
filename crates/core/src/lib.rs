#![forbid(unsafe_code)]

pub mod snapshot;

pub mod ids {
    /// Store-assigned identity of a persisted tree node.
    ///
    /// A node without an id never exists in this API: insertion takes a
    /// [`crate::model::NewNode`] and hands back the id the store assigned.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct NodeId(i64);

    impl NodeId {
        pub fn new(value: i64) -> Self {
            Self(value)
        }

        pub fn get(self) -> i64 {
            self.0
        }
    }

    impl std::fmt::Display for NodeId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }
}

pub mod model {
    use super::ids::NodeId;

    /// Order index carried by path rows where sibling order has no meaning
    /// (self rows and rows deeper than one edge).
    pub const NO_ORDER: i64 = -1;

    /// A persisted node with its opaque payload. The engine never interprets
    /// the payload beyond `external_ref` being a secondary lookup key.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct TreeNode {
        pub id: NodeId,
        pub node_type: String,
        pub external_ref: String,
        pub name: String,
        pub tags: Option<String>,
    }

    /// Payload for a node that is not persisted yet. Used on insertion and as
    /// the override template when copying a subtree.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct NewNode {
        pub node_type: String,
        pub external_ref: String,
        pub name: String,
        pub tags: Option<String>,
    }

    /// One row of the closure relation: `ancestor` reaches `descendant` in
    /// `depth` edges. `depth = 0` rows are the per-node self reference;
    /// `order_index` is meaningful only at `depth = 1`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PathRow {
        pub ancestor: NodeId,
        pub descendant: NodeId,
        pub depth: i64,
        pub order_index: i64,
    }

    impl PathRow {
        pub fn self_row(node: NodeId) -> Self {
            Self {
                ancestor: node,
                descendant: node,
                depth: 0,
                order_index: NO_ORDER,
            }
        }
    }

    /// Where a node lands in a structural edit. At most one related node is
    /// expressible, and an explicit position only together with a parent, so
    /// the conflicting-argument cases cannot be constructed.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Placement {
        /// Attach as a child of `parent`; `None` appends after the last child.
        UnderParent {
            parent: NodeId,
            position: Option<usize>,
        },
        /// Attach immediately before `sibling`, inheriting its parent. The
        /// sibling keeps its relative order and shifts one slot up.
        BeforeSibling { sibling: NodeId },
        /// No attachment: the node becomes (or stays) a root.
        Detached,
    }

    impl Placement {
        pub fn append_under(parent: NodeId) -> Self {
            Self::UnderParent {
                parent,
                position: None,
            }
        }

        pub fn at(parent: NodeId, position: usize) -> Self {
            Self::UnderParent {
                parent,
                position: Some(position),
            }
        }

        /// The existing node the placement is expressed relative to, if any.
        pub fn related_node(&self) -> Option<NodeId> {
            match self {
                Self::UnderParent { parent, .. } => Some(*parent),
                Self::BeforeSibling { sibling } => Some(*sibling),
                Self::Detached => None,
            }
        }
    }
}
