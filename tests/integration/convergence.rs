use crate::support::{eventually, manual_config, peer, read_all};
use dhtfs::store::MemoryKeyStore;
use dhtfs::tree::NodeType;
use std::collections::BTreeSet;
use std::sync::Arc;

fn paths(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn peers_converge_on_shared_index() {
    let keys = Arc::new(MemoryKeyStore::new(2));
    let alpha = peer(&keys, manual_config());
    let beta = peer(&keys, manual_config());

    alpha.mkdir("/photos").unwrap();
    alpha.create("/photos/cat.jpg").unwrap();
    alpha.create("/notes.md").unwrap();

    let report = beta.bootstrap().unwrap();
    assert_eq!(report.created.len(), 3);
    assert_eq!(
        beta.tree().all_paths(),
        paths(&["/notes.md", "/photos", "/photos/cat.jpg"])
    );
    assert_eq!(beta.getattr("/photos").unwrap().node_type, NodeType::Directory);

    alpha.unlink("/photos/cat.jpg").unwrap();
    alpha.rmdir("/photos").unwrap();
    let report = beta.reconciler().run_pass().unwrap();
    assert_eq!(report.removed.len(), 2);
    assert_eq!(beta.tree().all_paths(), paths(&["/notes.md"]));
}

#[test]
fn symlink_is_recognized_by_other_peer() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let alpha = peer(&keys, manual_config());
    let beta = peer(&keys, manual_config());

    alpha.mkdir("/docs").unwrap();
    alpha.create("/docs/a.txt").unwrap();
    alpha.write("/docs/a.txt", 0, b"linked").unwrap();
    alpha.flush("/docs/a.txt").unwrap();
    alpha.symlink("/docs/latest", "a.txt").unwrap();

    beta.bootstrap().unwrap();
    assert_eq!(beta.getattr("/docs/latest").unwrap().node_type, NodeType::Symlink);
    assert_eq!(beta.readlink("/docs/latest").unwrap(), "a.txt");
    assert_eq!(beta.read("/docs/latest", 0, 64).unwrap(), b"linked");
}

#[test]
fn rename_is_observed_as_move() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let alpha = peer(&keys, manual_config());
    let beta = peer(&keys, manual_config());

    alpha.mkdir("/inbox").unwrap();
    alpha.create("/inbox/todo.txt").unwrap();
    alpha.write("/inbox/todo.txt", 0, b"milk").unwrap();
    beta.bootstrap().unwrap();

    alpha.rename("/inbox", "/archive").unwrap();
    beta.reconciler().run_pass().unwrap();
    assert_eq!(
        beta.tree().all_paths(),
        paths(&["/archive", "/archive/todo.txt"])
    );
    assert_eq!(read_all(&beta, "/archive/todo.txt"), b"milk");
}

#[test]
fn flush_triggers_reconciliation_on_writer() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let mut config = manual_config();
    config.reconcile.enabled = true;
    config.reconcile.interval_ms = 60_000;
    let alpha = peer(&keys, config);
    let beta = peer(&keys, manual_config());

    beta.create("/from-beta.txt").unwrap();
    alpha.create("/local.txt").unwrap();
    alpha.write("/local.txt", 0, b"x").unwrap();
    alpha.flush("/local.txt").unwrap();
    assert!(alpha.tree().find("/from-beta.txt").is_some());
}

#[test]
fn background_reconciliation_picks_up_remote_changes() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let mut config = manual_config();
    config.reconcile.enabled = true;
    config.reconcile.interval_ms = 5;
    let alpha = peer(&keys, manual_config());
    let beta = peer(&keys, config);
    beta.start().unwrap();

    alpha.create("/hello.txt").unwrap();
    assert!(eventually(|| beta.tree().find("/hello.txt").is_some()));
    alpha.unlink("/hello.txt").unwrap();
    assert!(eventually(|| beta.tree().find("/hello.txt").is_none()));
    beta.shutdown();
}
