#![forbid(unsafe_code)]

mod error;
mod mutate;
mod query;
mod snapshot;

pub use error::StoreError;

use canopy_core::ids::NodeId;
use canopy_core::model::{PathRow, TreeNode};
use rusqlite::{Connection, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine policy, injected once at open time.
#[derive(Clone, Copy, Debug)]
pub struct TreeConfig {
    /// When false every order index is written as 0 and gap maintenance is
    /// skipped; sibling order is then undefined across reads.
    pub order_index_matters: bool,
    /// When false `remove` deletes path rows but retains node rows, for
    /// trees whose nodes are referenced elsewhere and deleted by a
    /// different owner. Retained rows can be re-attached with `attach`.
    pub remove_node_rows: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            order_index_matters: true,
            remove_node_rows: true,
        }
    }
}

/// Closure-table tree engine over a single SQLite database.
///
/// Reads take `&self` and are each a single statement; mutations take
/// `&mut self` and run inside one transaction, so a store value enforces the
/// single-writer discipline through the exclusive borrow.
#[derive(Debug)]
pub struct TreeStore {
    conn: Connection,
    config: TreeConfig,
    storage_dir: PathBuf,
}

impl TreeStore {
    pub fn open(storage_dir: impl AsRef<Path>, config: TreeConfig) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join("canopy.db");
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        install_schema(&conn)?;

        Ok(Self {
            conn,
            config,
            storage_dir,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn config(&self) -> TreeConfig {
        self.config
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS tree_node (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          type TEXT NOT NULL,
          external_ref TEXT NOT NULL,
          name TEXT NOT NULL,
          tags TEXT
        );

        CREATE TABLE IF NOT EXISTS tree_path (
          ancestor INTEGER NOT NULL REFERENCES tree_node(id),
          descendant INTEGER NOT NULL REFERENCES tree_node(id),
          depth INTEGER NOT NULL,
          order_index INTEGER NOT NULL,
          PRIMARY KEY (ancestor, descendant)
        );

        CREATE INDEX IF NOT EXISTS idx_tree_path_descendant ON tree_path(descendant);
        CREATE INDEX IF NOT EXISTS idx_tree_node_external_ref ON tree_node(external_ref);
        "#,
    )?;
    Ok(())
}

pub(crate) fn node_from_row(row: &Row<'_>) -> rusqlite::Result<TreeNode> {
    Ok(TreeNode {
        id: NodeId::new(row.get(0)?),
        node_type: row.get(1)?,
        external_ref: row.get(2)?,
        name: row.get(3)?,
        tags: row.get(4)?,
    })
}

pub(crate) fn path_from_row(row: &Row<'_>) -> rusqlite::Result<PathRow> {
    Ok(PathRow {
        ancestor: NodeId::new(row.get(0)?),
        descendant: NodeId::new(row.get(1)?),
        depth: row.get(2)?,
        order_index: row.get(3)?,
    })
}

pub(crate) fn query_nodes<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<TreeNode>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(node_from_row(row)?);
    }
    Ok(out)
}

pub(crate) fn query_paths<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<PathRow>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(path_from_row(row)?);
    }
    Ok(out)
}
