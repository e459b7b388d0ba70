#![forbid(unsafe_code)]

use super::{StoreError, TreeStore, query_paths};
use canopy_core::ids::NodeId;
use canopy_core::snapshot::TreeSnapshot;
use rusqlite::params;

impl TreeStore {
    /// One breadth-first export of the subtree under `root`, indexed for
    /// repeated in-memory lookups. The row set is the root's self reference
    /// plus every depth-1 edge with both endpoints inside the subtree, so
    /// the builder's row-count check holds for any subtree root.
    pub fn snapshot(&self, root: NodeId) -> Result<TreeSnapshot, StoreError> {
        let rows = query_paths(
            &self.conn,
            "SELECT ancestor, descendant, depth, order_index FROM tree_path \
             WHERE (depth = 1 OR (depth = 0 AND ancestor = ?1)) \
             AND descendant IN (SELECT descendant FROM tree_path WHERE ancestor = ?1) \
             AND ancestor IN (SELECT descendant FROM tree_path WHERE ancestor = ?1) \
             ORDER BY depth, ancestor, order_index",
            params![root.get()],
        )?;
        if rows.is_empty() {
            return Err(StoreError::NotPersisted { node: root });
        }
        Ok(TreeSnapshot::from_rows(root, &rows)?)
    }
}
