#![forbid(unsafe_code)]

use canopy_core::ids::NodeId;
use canopy_core::model::{NewNode, Placement, TreeNode};
use canopy_storage::{StoreError, TreeConfig, TreeStore};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("canopy_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn open_store(test_name: &str) -> TreeStore {
    TreeStore::open(temp_dir(test_name), TreeConfig::default()).expect("open store")
}

fn new_node(name: &str) -> NewNode {
    NewNode {
        node_type: "doc".to_string(),
        external_ref: format!("ref-{name}"),
        name: name.to_string(),
        tags: None,
    }
}

fn add(store: &mut TreeStore, parent: NodeId, name: &str) -> TreeNode {
    store
        .add_child(Placement::append_under(parent), new_node(name))
        .expect("add child")
}

#[test]
fn snapshot_indexes_the_whole_subtree() {
    let mut store = open_store("snapshot_indexes_the_whole_subtree");
    let a = store.create_root(new_node("a")).expect("create a");
    let b = add(&mut store, a.id, "b");
    let c = add(&mut store, a.id, "c");
    let d = add(&mut store, b.id, "d");

    let snapshot = store.snapshot(a.id).expect("snapshot");
    assert_eq!(snapshot.root(), a.id);
    assert_eq!(snapshot.node_count(), 4);
    assert_eq!(snapshot.children(a.id), &[b.id, c.id]);
    assert_eq!(snapshot.children(b.id), &[d.id]);
    assert!(snapshot.children(d.id).is_empty());
    assert_eq!(snapshot.nodes(), vec![a.id, b.id, c.id, d.id]);
}

#[test]
fn snapshot_of_an_interior_node_excludes_the_rest() {
    let mut store = open_store("snapshot_of_an_interior_node_excludes_the_rest");
    let a = store.create_root(new_node("a")).expect("create a");
    let b = add(&mut store, a.id, "b");
    let c = add(&mut store, a.id, "c");
    let d = add(&mut store, b.id, "d");

    let snapshot = store.snapshot(b.id).expect("snapshot");
    assert_eq!(snapshot.root(), b.id);
    assert_eq!(snapshot.node_count(), 2);
    assert!(snapshot.contains(d.id));
    assert!(!snapshot.contains(a.id));
    assert!(!snapshot.contains(c.id));
}

#[test]
fn snapshot_reflects_sibling_order() {
    let mut store = open_store("snapshot_reflects_sibling_order");
    let a = store.create_root(new_node("a")).expect("create a");
    let b = add(&mut store, a.id, "b");
    let c = add(&mut store, a.id, "c");
    let front = store
        .add_child(Placement::at(a.id, 0), new_node("front"))
        .expect("add front");

    let snapshot = store.snapshot(a.id).expect("snapshot");
    assert_eq!(snapshot.children(a.id), &[front.id, b.id, c.id]);
}

#[test]
fn snapshot_sub_tree_answers_without_store_access() {
    let mut store = open_store("snapshot_sub_tree_answers_without_store_access");
    let a = store.create_root(new_node("a")).expect("create a");
    let b = add(&mut store, a.id, "b");
    let d = add(&mut store, b.id, "d");

    let snapshot = store.snapshot(a.id).expect("snapshot");

    // Mutate the store after the export; the snapshot keeps the old world.
    store.remove(b.id).expect("remove b");
    assert!(!store.contains(b.id).expect("contains"));

    let sub = snapshot.sub_tree(b.id).expect("subtree of b");
    assert_eq!(sub.root(), b.id);
    assert_eq!(sub.children(b.id), &[d.id]);
    assert!(snapshot.sub_tree(NodeId::new(9999)).is_none());
}

#[test]
fn snapshot_of_unknown_node_is_rejected() {
    let mut store = open_store("snapshot_of_unknown_node_is_rejected");
    store.create_root(new_node("a")).expect("create a");

    let err = store.snapshot(NodeId::new(9999)).expect_err("must fail");
    assert!(matches!(err, StoreError::NotPersisted { .. }));
}
