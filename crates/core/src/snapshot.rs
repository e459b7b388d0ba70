#![forbid(unsafe_code)]

//! Immutable in-memory index over one subtree of the closure relation.
//!
//! Built once from a breadth-first export of path rows (the root's self row
//! plus every depth-1 row with both endpoints inside the subtree) and queried
//! repeatedly without touching the store. The snapshot exposes no mutators,
//! so it cannot silently diverge from the store it was exported from.

use crate::ids::NodeId;
use crate::model::PathRow;
use std::collections::HashMap;
use std::collections::HashSet;

#[derive(Debug, PartialEq, Eq)]
pub enum SnapshotError {
    /// The export produced more (or fewer) rows than distinct nodes. Signals
    /// a corrupted closure relation, never retried.
    Inconsistent { rows: usize, nodes: usize },
    /// A row does not belong under the requested root.
    ForeignRow { ancestor: i64, descendant: i64 },
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inconsistent { rows, nodes } => {
                write!(f, "inconsistent snapshot (rows={rows}, nodes={nodes})")
            }
            Self::ForeignRow {
                ancestor,
                descendant,
            } => write!(
                f,
                "foreign path row in snapshot (ancestor={ancestor}, descendant={descendant})"
            ),
        }
    }
}

impl std::error::Error for SnapshotError {}

#[derive(Clone, Debug)]
pub struct TreeSnapshot {
    root: NodeId,
    children: HashMap<NodeId, Vec<NodeId>>,
    node_count: usize,
}

impl TreeSnapshot {
    /// Builds the parent → ordered-children index from an exported row set.
    ///
    /// Expects exactly one `depth = 0` row (the root's self reference) and
    /// one `depth = 1` row per remaining subtree member; the node count must
    /// equal the row count or the export is inconsistent.
    pub fn from_rows(root: NodeId, rows: &[PathRow]) -> Result<Self, SnapshotError> {
        let mut ordered: HashMap<NodeId, Vec<(i64, NodeId)>> = HashMap::new();
        let mut nodes: HashSet<NodeId> = HashSet::new();
        nodes.insert(root);

        for row in rows {
            match row.depth {
                0 => {
                    if row.ancestor != root || row.descendant != root {
                        return Err(SnapshotError::ForeignRow {
                            ancestor: row.ancestor.get(),
                            descendant: row.descendant.get(),
                        });
                    }
                }
                1 => {
                    nodes.insert(row.descendant);
                    ordered
                        .entry(row.ancestor)
                        .or_default()
                        .push((row.order_index, row.descendant));
                }
                _ => {
                    return Err(SnapshotError::ForeignRow {
                        ancestor: row.ancestor.get(),
                        descendant: row.descendant.get(),
                    });
                }
            }
        }

        for parent in ordered.keys() {
            if !nodes.contains(parent) {
                return Err(SnapshotError::ForeignRow {
                    ancestor: parent.get(),
                    descendant: parent.get(),
                });
            }
        }

        if nodes.len() != rows.len() {
            return Err(SnapshotError::Inconsistent {
                rows: rows.len(),
                nodes: nodes.len(),
            });
        }

        let children = ordered
            .into_iter()
            .map(|(parent, mut entries)| {
                entries.sort_by_key(|(order, _)| *order);
                (parent, entries.into_iter().map(|(_, id)| id).collect())
            })
            .collect();

        Ok(Self {
            root,
            children,
            node_count: nodes.len(),
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Direct children of `node` in sibling order. Empty for leaves and for
    /// nodes outside the snapshot.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node == self.root || self.children.values().any(|list| list.contains(&node))
    }

    /// All snapshot members in breadth-first order, starting at the root.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.node_count);
        let mut queue = std::collections::VecDeque::from([self.root]);
        while let Some(node) = queue.pop_front() {
            out.push(node);
            queue.extend(self.children(node).iter().copied());
        }
        out
    }

    /// A further restriction of this snapshot rooted at `node`, built by
    /// walking the in-memory index only. `None` when `node` is not a member.
    pub fn sub_tree(&self, node: NodeId) -> Option<TreeSnapshot> {
        if !self.contains(node) {
            return None;
        }

        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut node_count = 0usize;
        let mut queue = std::collections::VecDeque::from([node]);
        while let Some(current) = queue.pop_front() {
            node_count += 1;
            let list = self.children(current);
            if !list.is_empty() {
                children.insert(current, list.to_vec());
            }
            queue.extend(list.iter().copied());
        }

        Some(TreeSnapshot {
            root: node,
            children,
            node_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: i64) -> NodeId {
        NodeId::new(value)
    }

    fn edge(ancestor: i64, descendant: i64, order_index: i64) -> PathRow {
        PathRow {
            ancestor: id(ancestor),
            descendant: id(descendant),
            depth: 1,
            order_index,
        }
    }

    /// Shape used throughout: 1 → [2, 3], 2 → [4].
    fn sample_rows() -> Vec<PathRow> {
        vec![
            PathRow::self_row(id(1)),
            edge(1, 2, 0),
            edge(1, 3, 1),
            edge(2, 4, 0),
        ]
    }

    #[test]
    fn indexes_children_in_sibling_order() {
        let snapshot = TreeSnapshot::from_rows(id(1), &sample_rows()).expect("snapshot");
        assert_eq!(snapshot.root(), id(1));
        assert_eq!(snapshot.node_count(), 4);
        assert_eq!(snapshot.children(id(1)), &[id(2), id(3)]);
        assert_eq!(snapshot.children(id(2)), &[id(4)]);
        assert_eq!(snapshot.children(id(4)), &[] as &[NodeId]);
    }

    #[test]
    fn orders_children_by_order_index_not_input_order() {
        let rows = vec![
            PathRow::self_row(id(1)),
            edge(1, 3, 1),
            edge(1, 2, 0),
        ];
        let snapshot = TreeSnapshot::from_rows(id(1), &rows).expect("snapshot");
        assert_eq!(snapshot.children(id(1)), &[id(2), id(3)]);
    }

    #[test]
    fn single_node_snapshot_is_just_the_root() {
        let rows = vec![PathRow::self_row(id(7))];
        let snapshot = TreeSnapshot::from_rows(id(7), &rows).expect("snapshot");
        assert_eq!(snapshot.node_count(), 1);
        assert!(snapshot.contains(id(7)));
        assert_eq!(snapshot.nodes(), vec![id(7)]);
    }

    #[test]
    fn duplicate_edge_is_inconsistent() {
        let mut rows = sample_rows();
        rows.push(edge(3, 4, 0));
        let err = TreeSnapshot::from_rows(id(1), &rows).expect_err("must fail");
        assert_eq!(err, SnapshotError::Inconsistent { rows: 5, nodes: 4 });
    }

    #[test]
    fn self_row_of_another_node_is_foreign() {
        let mut rows = sample_rows();
        rows.push(PathRow::self_row(id(2)));
        let err = TreeSnapshot::from_rows(id(1), &rows).expect_err("must fail");
        assert_eq!(
            err,
            SnapshotError::ForeignRow {
                ancestor: 2,
                descendant: 2
            }
        );
    }

    #[test]
    fn deep_row_is_foreign() {
        let mut rows = sample_rows();
        rows.push(PathRow {
            ancestor: id(1),
            descendant: id(4),
            depth: 2,
            order_index: -1,
        });
        let err = TreeSnapshot::from_rows(id(1), &rows).expect_err("must fail");
        assert_eq!(
            err,
            SnapshotError::ForeignRow {
                ancestor: 1,
                descendant: 4
            }
        );
    }

    #[test]
    fn edge_hanging_off_unknown_parent_is_foreign() {
        let mut rows = sample_rows();
        rows.push(edge(9, 10, 0));
        // Node 10 joins the set via the edge, node 9 never does.
        let err = TreeSnapshot::from_rows(id(1), &rows).expect_err("must fail");
        assert_eq!(
            err,
            SnapshotError::ForeignRow {
                ancestor: 9,
                descendant: 9
            }
        );
    }

    #[test]
    fn nodes_walks_breadth_first() {
        let snapshot = TreeSnapshot::from_rows(id(1), &sample_rows()).expect("snapshot");
        assert_eq!(snapshot.nodes(), vec![id(1), id(2), id(3), id(4)]);
    }

    #[test]
    fn sub_tree_restricts_without_store_access() {
        let snapshot = TreeSnapshot::from_rows(id(1), &sample_rows()).expect("snapshot");
        let sub = snapshot.sub_tree(id(2)).expect("member subtree");
        assert_eq!(sub.root(), id(2));
        assert_eq!(sub.node_count(), 2);
        assert_eq!(sub.children(id(2)), &[id(4)]);
        assert!(!sub.contains(id(3)));
        assert!(snapshot.sub_tree(id(99)).is_none());
    }
}
