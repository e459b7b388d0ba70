#![forbid(unsafe_code)]

use super::{StoreError, TreeStore, node_from_row, query_paths};
use canopy_core::ids::NodeId;
use canopy_core::model::{NO_ORDER, NewNode, PathRow, Placement, TreeNode};
use rusqlite::{OptionalExtension, Transaction, params};
use std::collections::{BTreeSet, HashMap};

impl TreeStore {
    /// Persists `node` as a new root: a node row plus its self reference.
    pub fn create_root(&mut self, node: NewNode) -> Result<TreeNode, StoreError> {
        self.add_child(Placement::Detached, node)
    }

    /// Persists `node` and attaches it at `placement`. The ancestor chain of
    /// the attachment point is cloned onto the new node, and the fresh
    /// depth-1 edge gets an order index computed by gap creation.
    pub fn add_child(&mut self, placement: Placement, node: NewNode) -> Result<TreeNode, StoreError> {
        let order_matters = self.config.order_index_matters;
        let tx = self.conn.transaction()?;

        let attachment = resolve_attachment_tx(&tx, &placement)?;
        let id = insert_node_tx(&tx, &node)?;
        insert_path_tx(&tx, PathRow::self_row(id))?;
        clone_paths_tx(&tx, order_matters, id, 0, &attachment)?;

        tx.commit()?;
        Ok(TreeNode {
            id,
            node_type: node.node_type,
            external_ref: node.external_ref,
            name: node.name,
            tags: node.tags,
        })
    }

    /// Re-attaches a node row that has no paths (one retained by `remove`
    /// under `remove_node_rows = false`). A node that still has path rows is
    /// already part of the tree and is rejected.
    pub fn attach(&mut self, placement: Placement, node: NodeId) -> Result<(), StoreError> {
        let order_matters = self.config.order_index_matters;
        let tx = self.conn.transaction()?;

        if node_row_tx(&tx, node)?.is_none() {
            return Err(StoreError::NotPersisted { node });
        }
        if node_in_tree_tx(&tx, node)? {
            return Err(StoreError::AlreadyInTree { node });
        }

        let attachment = resolve_attachment_tx(&tx, &placement)?;
        insert_path_tx(&tx, PathRow::self_row(node))?;
        clone_paths_tx(&tx, order_matters, node, 0, &attachment)?;

        tx.commit()?;
        Ok(())
    }

    /// Detaches `node` with its whole subtree and re-attaches it at
    /// `placement` (or leaves it as a new root for `Detached`). Both phases
    /// run in one transaction; all paths internal to the subtree survive
    /// untouched.
    pub fn move_node(&mut self, node: NodeId, placement: Placement) -> Result<(), StoreError> {
        let order_matters = self.config.order_index_matters;
        let tx = self.conn.transaction()?;

        if !node_in_tree_tx(&tx, node)? {
            return Err(StoreError::NotPersisted { node });
        }
        if let Some(target) = placement.related_node() {
            if subtree_contains_tx(&tx, node, target)? {
                return Err(StoreError::InvalidPlacement(
                    "target lies inside the moved subtree",
                ));
            }
        }

        disconnect_subtree_tx(&tx, order_matters, node)?;
        if placement != Placement::Detached {
            let child_paths = paths_from_node_tx(&tx, node)?;
            connect_subtree_tx(&tx, order_matters, &placement, &child_paths)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Clones the whole subtree under `node` (new node rows, new internal
    /// paths with relative depths and order preserved) and attaches the
    /// clone at `placement`. The original subtree is untouched. `template`,
    /// when given, overrides the payload of the subtree root's clone — use
    /// it to keep `external_ref` unique across the copy.
    pub fn copy_node(
        &mut self,
        node: NodeId,
        placement: Placement,
        template: Option<NewNode>,
    ) -> Result<TreeNode, StoreError> {
        let order_matters = self.config.order_index_matters;
        let tx = self.conn.transaction()?;

        if !node_in_tree_tx(&tx, node)? {
            return Err(StoreError::NotPersisted { node });
        }

        let internal_paths = internal_paths_tx(&tx, node)?;
        let members: BTreeSet<NodeId> = internal_paths.iter().map(|row| row.descendant).collect();

        let mut clone_map: HashMap<NodeId, NodeId> = HashMap::new();
        for member in members {
            let source = node_row_tx(&tx, member)?.ok_or(StoreError::NotPersisted { node: member })?;
            let payload = match (&template, member == node) {
                (Some(template), true) => template.clone(),
                _ => NewNode {
                    node_type: source.node_type,
                    external_ref: source.external_ref,
                    name: source.name,
                    tags: source.tags,
                },
            };
            let copy = insert_node_tx(&tx, &payload)?;
            clone_map.insert(member, copy);
        }

        let mut child_paths = Vec::new();
        for row in &internal_paths {
            let ancestor = *clone_map
                .get(&row.ancestor)
                .ok_or(StoreError::NotPersisted { node: row.ancestor })?;
            let descendant = *clone_map
                .get(&row.descendant)
                .ok_or(StoreError::NotPersisted { node: row.descendant })?;
            let cloned = PathRow {
                ancestor,
                descendant,
                depth: row.depth,
                order_index: row.order_index,
            };
            insert_path_tx(&tx, cloned)?;
            if row.ancestor == node {
                child_paths.push(cloned);
            }
        }

        if placement != Placement::Detached {
            connect_subtree_tx(&tx, order_matters, &placement, &child_paths)?;
        }

        let copy_id = *clone_map.get(&node).ok_or(StoreError::NotPersisted { node })?;
        let copied = node_row_tx(&tx, copy_id)?.ok_or(StoreError::NotPersisted { node: copy_id })?;
        tx.commit()?;
        Ok(copied)
    }

    /// Removes `node` with its whole subtree: every path whose descendant
    /// lies in the subtree, the sibling-order gap, and (policy permitting)
    /// the node rows themselves.
    pub fn remove(&mut self, node: NodeId) -> Result<(), StoreError> {
        let config = self.config;
        let tx = self.conn.transaction()?;

        if !node_in_tree_tx(&tx, node)? {
            return Err(StoreError::NotPersisted { node });
        }

        let siblings = sibling_paths_tx(&tx, node)?;
        let to_remove = query_paths(
            &tx,
            "SELECT ancestor, descendant, depth, order_index FROM tree_path \
             WHERE descendant IN (SELECT descendant FROM tree_path WHERE ancestor = ?1)",
            params![node.get()],
        )?;

        let mut removed_nodes: BTreeSet<NodeId> = BTreeSet::new();
        let mut old_position = NO_ORDER;
        for row in &to_remove {
            delete_path_tx(&tx, row)?;
            removed_nodes.insert(row.descendant);
            if row.depth == 1 && row.descendant == node {
                old_position = row.order_index;
            }
        }

        close_gap_tx(&tx, config.order_index_matters, &siblings, old_position)?;

        if config.remove_node_rows {
            for id in removed_nodes {
                tx.execute("DELETE FROM tree_node WHERE id = ?1", params![id.get()])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Rewrites the payload columns of a persisted node.
    pub fn update_node(&mut self, node: &TreeNode) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE tree_node SET type = ?2, external_ref = ?3, name = ?4, tags = ?5 WHERE id = ?1",
            params![
                node.id.get(),
                node.node_type,
                node.external_ref,
                node.name,
                node.tags,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotPersisted { node: node.id });
        }
        tx.commit()?;
        Ok(())
    }

    pub fn remove_all(&mut self) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM tree_path", [])?;
        tx.execute("DELETE FROM tree_node", [])?;
        tx.commit()?;
        Ok(())
    }
}

/// The resolved attachment point of an insert, move or copy: which existing
/// paths get cloned onto the subtree, and at which sibling position.
struct Attachment {
    position: Option<usize>,
    paths_to_clone: Vec<PathRow>,
    related_is_parent: bool,
}

fn resolve_attachment_tx(
    tx: &Transaction<'_>,
    placement: &Placement,
) -> Result<Attachment, StoreError> {
    match *placement {
        Placement::UnderParent { parent, position } => {
            // The parent's ancestor rows plus its self row, which yields the
            // new depth-1 edge when cloned.
            let paths_to_clone = query_paths(
                tx,
                "SELECT ancestor, descendant, depth, order_index FROM tree_path \
                 WHERE descendant = ?1",
                params![parent.get()],
            )?;
            if paths_to_clone.is_empty() {
                return Err(StoreError::NotPersisted { node: parent });
            }
            Ok(Attachment {
                position,
                paths_to_clone,
                related_is_parent: true,
            })
        }
        Placement::BeforeSibling { sibling } => {
            // Non-self ancestor rows of the sibling, immediate parent first.
            // The sibling's own order index becomes the insert position.
            let paths_to_clone = query_paths(
                tx,
                "SELECT ancestor, descendant, depth, order_index FROM tree_path \
                 WHERE descendant = ?1 AND depth > 0 \
                 ORDER BY depth",
                params![sibling.get()],
            )?;
            let Some(first) = paths_to_clone.first() else {
                return Err(StoreError::InvalidPlacement("sibling is a root"));
            };
            let position = Some(first.order_index.max(0) as usize);
            Ok(Attachment {
                position,
                paths_to_clone,
                related_is_parent: false,
            })
        }
        Placement::Detached => Ok(Attachment {
            position: None,
            paths_to_clone: Vec::new(),
            related_is_parent: false,
        }),
    }
}

/// Clones the resolved ancestor chain onto one subtree member. `add_to_depth`
/// is the member's depth below the subtree root; the extra edge down from a
/// parent attachment point contributes one more.
fn clone_paths_tx(
    tx: &Transaction<'_>,
    order_matters: bool,
    child: NodeId,
    add_to_depth: i64,
    attachment: &Attachment,
) -> Result<(), StoreError> {
    for row in &attachment.paths_to_clone {
        let depth = row.depth + add_to_depth + i64::from(attachment.related_is_parent);
        let order_index = if depth == 1 {
            let gap_parent = if attachment.related_is_parent {
                row.descendant
            } else {
                row.ancestor
            };
            create_gap_tx(tx, order_matters, gap_parent, attachment.position)?
        } else {
            NO_ORDER
        };
        insert_path_tx(
            tx,
            PathRow {
                ancestor: row.ancestor,
                descendant: child,
                depth,
                order_index,
            },
        )?;
    }
    Ok(())
}

fn connect_subtree_tx(
    tx: &Transaction<'_>,
    order_matters: bool,
    placement: &Placement,
    child_paths: &[PathRow],
) -> Result<(), StoreError> {
    let attachment = resolve_attachment_tx(tx, placement)?;
    for child_path in child_paths {
        clone_paths_tx(
            tx,
            order_matters,
            child_path.descendant,
            child_path.depth,
            &attachment,
        )?;
    }
    Ok(())
}

/// Deletes every path entering the subtree of `node` from outside and closes
/// the sibling gap at its old position. Paths internal to the subtree stay.
fn disconnect_subtree_tx(
    tx: &Transaction<'_>,
    order_matters: bool,
    node: NodeId,
) -> Result<(), StoreError> {
    // Sibling snapshot has to be taken before the rows are deleted.
    let siblings = sibling_paths_tx(tx, node)?;
    let to_remove = query_paths(
        tx,
        "SELECT ancestor, descendant, depth, order_index FROM tree_path \
         WHERE descendant IN (SELECT descendant FROM tree_path WHERE ancestor = ?1) \
         AND ancestor NOT IN (SELECT descendant FROM tree_path WHERE ancestor = ?1)",
        params![node.get()],
    )?;

    let mut old_position = NO_ORDER;
    for row in &to_remove {
        delete_path_tx(tx, row)?;
        if row.depth == 1 && row.descendant == node {
            old_position = row.order_index;
        }
    }

    close_gap_tx(tx, order_matters, &siblings, old_position)
}

/// Shifts the direct children of `parent` at `position` and above one slot
/// up and returns the order index the inserted node takes. `None` appends.
fn create_gap_tx(
    tx: &Transaction<'_>,
    order_matters: bool,
    parent: NodeId,
    position: Option<usize>,
) -> Result<i64, StoreError> {
    if !order_matters {
        return Ok(0);
    }
    let children = direct_child_paths_tx(tx, parent)?;
    let Some(position) = position else {
        return Ok(children.len() as i64);
    };
    // Positions past the end degrade to append; a hole would break the
    // contiguity invariant.
    let position = position.min(children.len());
    for (index, row) in children.iter().enumerate().skip(position).rev() {
        set_order_index_tx(tx, row, index as i64 + 1)?;
    }
    Ok(position as i64)
}

/// Shifts every sibling past `removed_position` one slot down. `siblings` is
/// the pre-mutation snapshot, ordered, with the removed node excluded.
fn close_gap_tx(
    tx: &Transaction<'_>,
    order_matters: bool,
    siblings: &[PathRow],
    removed_position: i64,
) -> Result<(), StoreError> {
    if !order_matters || removed_position < 0 {
        return Ok(());
    }
    for (index, row) in siblings.iter().enumerate().skip(removed_position as usize) {
        set_order_index_tx(tx, row, index as i64)?;
    }
    Ok(())
}

fn direct_child_paths_tx(tx: &Transaction<'_>, parent: NodeId) -> Result<Vec<PathRow>, StoreError> {
    query_paths(
        tx,
        "SELECT ancestor, descendant, depth, order_index FROM tree_path \
         WHERE ancestor = ?1 AND depth = 1 \
         ORDER BY order_index",
        params![parent.get()],
    )
}

/// Depth-1 rows of the node's current siblings, the node itself excluded.
fn sibling_paths_tx(tx: &Transaction<'_>, node: NodeId) -> Result<Vec<PathRow>, StoreError> {
    query_paths(
        tx,
        "SELECT ancestor, descendant, depth, order_index FROM tree_path \
         WHERE depth = 1 AND descendant != ?1 \
         AND ancestor IN (SELECT ancestor FROM tree_path WHERE descendant = ?1 AND depth = 1) \
         ORDER BY order_index",
        params![node.get()],
    )
}

/// All paths leaving `node` downward, the self row included. Grouped by
/// descendant these are the subtree members with their depth below `node`.
fn paths_from_node_tx(tx: &Transaction<'_>, node: NodeId) -> Result<Vec<PathRow>, StoreError> {
    query_paths(
        tx,
        "SELECT ancestor, descendant, depth, order_index FROM tree_path WHERE ancestor = ?1",
        params![node.get()],
    )
}

/// Paths with both endpoints inside the subtree of `node`.
fn internal_paths_tx(tx: &Transaction<'_>, node: NodeId) -> Result<Vec<PathRow>, StoreError> {
    query_paths(
        tx,
        "SELECT ancestor, descendant, depth, order_index FROM tree_path \
         WHERE descendant IN (SELECT descendant FROM tree_path WHERE ancestor = ?1) \
         AND ancestor IN (SELECT descendant FROM tree_path WHERE ancestor = ?1)",
        params![node.get()],
    )
}

fn node_in_tree_tx(tx: &Transaction<'_>, node: NodeId) -> Result<bool, StoreError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM tree_path WHERE descendant = ?1",
        params![node.get()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn subtree_contains_tx(
    tx: &Transaction<'_>,
    root: NodeId,
    candidate: NodeId,
) -> Result<bool, StoreError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM tree_path WHERE ancestor = ?1 AND descendant = ?2",
        params![root.get(), candidate.get()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn node_row_tx(tx: &Transaction<'_>, node: NodeId) -> Result<Option<TreeNode>, StoreError> {
    Ok(tx
        .query_row(
            "SELECT id, type, external_ref, name, tags FROM tree_node WHERE id = ?1",
            params![node.get()],
            node_from_row,
        )
        .optional()?)
}

fn insert_node_tx(tx: &Transaction<'_>, node: &NewNode) -> Result<NodeId, StoreError> {
    tx.execute(
        "INSERT INTO tree_node(type, external_ref, name, tags) VALUES (?1, ?2, ?3, ?4)",
        params![node.node_type, node.external_ref, node.name, node.tags],
    )?;
    Ok(NodeId::new(tx.last_insert_rowid()))
}

fn insert_path_tx(tx: &Transaction<'_>, path: PathRow) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO tree_path(ancestor, descendant, depth, order_index) VALUES (?1, ?2, ?3, ?4)",
        params![
            path.ancestor.get(),
            path.descendant.get(),
            path.depth,
            path.order_index,
        ],
    )?;
    Ok(())
}

fn delete_path_tx(tx: &Transaction<'_>, path: &PathRow) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM tree_path WHERE ancestor = ?1 AND descendant = ?2",
        params![path.ancestor.get(), path.descendant.get()],
    )?;
    Ok(())
}

fn set_order_index_tx(
    tx: &Transaction<'_>,
    path: &PathRow,
    order_index: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE tree_path SET order_index = ?3 WHERE ancestor = ?1 AND descendant = ?2",
        params![path.ancestor.get(), path.descendant.get(), order_index],
    )?;
    Ok(())
}
