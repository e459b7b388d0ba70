#![forbid(unsafe_code)]

use canopy_core::ids::NodeId;
use canopy_core::snapshot::SnapshotError;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    /// The operation names a node the store has no trace of.
    NotPersisted { node: NodeId },
    /// Attach target already has path rows.
    AlreadyInTree { node: NodeId },
    /// The placement cannot be satisfied, e.g. the sibling is a root, or
    /// the move target lies inside the moved subtree.
    InvalidPlacement(&'static str),
    /// The store returned more rows than the closure invariants allow.
    /// Signals corrupted state; never retried.
    Ambiguity { what: &'static str, count: usize },
    Snapshot(SnapshotError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::NotPersisted { node } => write!(f, "node {node} is not in the tree"),
            Self::AlreadyInTree { node } => write!(f, "node {node} is already part of the tree"),
            Self::InvalidPlacement(message) => write!(f, "invalid placement: {message}"),
            Self::Ambiguity { what, count } => {
                write!(f, "ambiguous tree state: found {count} {what}")
            }
            Self::Snapshot(err) => write!(f, "snapshot: {err}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<SnapshotError> for StoreError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}
