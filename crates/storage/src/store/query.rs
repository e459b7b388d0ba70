#![forbid(unsafe_code)]

use super::{StoreError, TreeStore, node_from_row, query_nodes, query_paths};
use canopy_core::ids::NodeId;
use canopy_core::model::{PathRow, TreeNode};
use rusqlite::{OptionalExtension, params};

impl TreeStore {
    pub fn node(&self, id: NodeId) -> Result<Option<TreeNode>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, type, external_ref, name, tags FROM tree_node WHERE id = ?1",
                params![id.get()],
                node_from_row,
            )
            .optional()?)
    }

    /// Unique lookup by the secondary key. More than one match means the
    /// uniqueness contract on `external_ref` has been violated.
    pub fn find_by_external_ref(&self, external_ref: &str) -> Result<Option<TreeNode>, StoreError> {
        let mut nodes = query_nodes(
            &self.conn,
            "SELECT id, type, external_ref, name, tags FROM tree_node WHERE external_ref = ?1",
            params![external_ref],
        )?;
        match nodes.len() {
            0 => Ok(None),
            1 => Ok(nodes.pop()),
            count => Err(StoreError::Ambiguity {
                what: "nodes sharing an external ref",
                count,
            }),
        }
    }

    /// True when the node has any path row, i.e. it is part of the tree.
    pub fn contains(&self, node: NodeId) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tree_path WHERE descendant = ?1",
            params![node.get()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn is_root(&self, node: NodeId) -> Result<bool, StoreError> {
        let (total, deeper): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(depth > 0), 0) FROM tree_path WHERE descendant = ?1",
            params![node.get()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(total > 0 && deeper == 0)
    }

    /// Every node that is in the tree and never appears as a descendant in a
    /// `depth > 0` row. Node rows retained after `remove` have no paths at
    /// all and are not reported.
    pub fn roots(&self) -> Result<Vec<TreeNode>, StoreError> {
        query_nodes(
            &self.conn,
            "SELECT n.id, n.type, n.external_ref, n.name, n.tags FROM tree_node n \
             WHERE EXISTS (SELECT 1 FROM tree_path p WHERE p.descendant = n.id) \
             AND NOT EXISTS (SELECT 1 FROM tree_path p WHERE p.descendant = n.id AND p.depth > 0) \
             ORDER BY n.id",
            params![],
        )
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<TreeNode>, StoreError> {
        let mut parents = query_nodes(
            &self.conn,
            "SELECT n.id, n.type, n.external_ref, n.name, n.tags FROM tree_node n \
             JOIN tree_path p ON p.ancestor = n.id \
             WHERE p.descendant = ?1 AND p.depth = 1",
            params![node.get()],
        )?;
        match parents.len() {
            0 => Ok(None),
            1 => Ok(parents.pop()),
            count => Err(StoreError::Ambiguity {
                what: "depth-1 parents",
                count,
            }),
        }
    }

    /// Ancestors of `node` from the root down to its immediate parent,
    /// exclusive of the node itself.
    pub fn path_to_root(&self, node: NodeId) -> Result<Vec<TreeNode>, StoreError> {
        let mut path = query_nodes(
            &self.conn,
            "SELECT n.id, n.type, n.external_ref, n.name, n.tags FROM tree_node n \
             JOIN tree_path p ON p.ancestor = n.id \
             WHERE p.descendant = ?1 \
             ORDER BY p.depth DESC",
            params![node.get()],
        )?;
        if path.pop().is_none() {
            return Err(StoreError::NotPersisted { node });
        }
        Ok(path)
    }

    pub fn root_of(&self, node: NodeId) -> Result<TreeNode, StoreError> {
        let mut path = self.path_to_root(node)?;
        if path.is_empty() {
            return self.node(node)?.ok_or(StoreError::NotPersisted { node });
        }
        Ok(path.remove(0))
    }

    /// Distance from the root: 0 for roots, 1 for their children, and so on.
    pub fn level(&self, node: NodeId) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tree_path WHERE descendant = ?1",
            params![node.get()],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Err(StoreError::NotPersisted { node });
        }
        Ok(count as usize - 1)
    }

    pub fn children(&self, node: NodeId) -> Result<Vec<TreeNode>, StoreError> {
        query_nodes(
            &self.conn,
            "SELECT n.id, n.type, n.external_ref, n.name, n.tags FROM tree_node n \
             JOIN tree_path p ON p.descendant = n.id \
             WHERE p.ancestor = ?1 AND p.depth = 1 \
             ORDER BY p.order_index",
            params![node.get()],
        )
    }

    pub fn child_count(&self, node: NodeId) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tree_path WHERE ancestor = ?1 AND depth = 1",
            params![node.get()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn is_leaf(&self, node: NodeId) -> Result<bool, StoreError> {
        Ok(self.child_count(node)? == 0)
    }

    /// Full subtree size, the node itself included.
    pub fn subtree_size(&self, node: NodeId) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tree_path WHERE ancestor = ?1",
            params![node.get()],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Err(StoreError::NotPersisted { node });
        }
        Ok(count as usize)
    }

    /// True when `parent` is a proper ancestor of `child`. Exactly one path
    /// row may connect the pair; more than one signals corruption.
    pub fn is_child_of(&self, child: NodeId, parent: NodeId) -> Result<bool, StoreError> {
        if child == parent {
            return Ok(false);
        }
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tree_path WHERE ancestor = ?1 AND descendant = ?2",
            params![parent.get(), child.get()],
            |row| row.get(0),
        )?;
        if count > 1 {
            return Err(StoreError::Ambiguity {
                what: "ancestor/descendant paths for one pair",
                count: count as usize,
            });
        }
        Ok(count == 1)
    }

    pub fn is_equal_or_child_of(&self, child: NodeId, parent: NodeId) -> Result<bool, StoreError> {
        Ok(child == parent || self.is_child_of(child, parent)?)
    }

    /// Every node of the subtree rooted at `node`, top-down.
    pub fn subtree_nodes(&self, node: NodeId) -> Result<Vec<TreeNode>, StoreError> {
        query_nodes(
            &self.conn,
            "SELECT n.id, n.type, n.external_ref, n.name, n.tags FROM tree_node n \
             JOIN tree_path p ON p.descendant = n.id \
             WHERE p.ancestor = ?1 \
             ORDER BY p.depth, p.order_index",
            params![node.get()],
        )
    }

    /// The node's depth-0 self reference, if it is in the tree.
    pub fn self_path(&self, node: NodeId) -> Result<Option<PathRow>, StoreError> {
        let mut rows = query_paths(
            &self.conn,
            "SELECT ancestor, descendant, depth, order_index FROM tree_path \
             WHERE ancestor = ?1 AND descendant = ?1",
            params![node.get()],
        )?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            count => Err(StoreError::Ambiguity {
                what: "self paths for one node",
                count,
            }),
        }
    }
}
