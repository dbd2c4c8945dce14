use crate::support::{manual_config, peer, read_all};
use dhtfs::persistence::BaseStrategy;
use dhtfs::store::{DhtKey, MemoryKeyStore};
use dhtfs::tree::hasher::path_key;
use dhtfs::OpReply;
use std::sync::Arc;

fn consensus_config() -> dhtfs::config::DhtFsConfig {
    let mut config = manual_config();
    config.persistence.base = BaseStrategy::Consensus;
    config.persistence.max_attempts = 2;
    config.persistence.max_backoff_ms = 1;
    config.debounce.enabled = false;
    config
}

#[test]
fn agreed_replicas_serve_reads() {
    let keys = Arc::new(MemoryKeyStore::new(3));
    let fs = peer(&keys, consensus_config());
    fs.create("/agreed.txt").unwrap();
    fs.write("/agreed.txt", 0, b"same everywhere").unwrap();
    assert_eq!(read_all(&fs, "/agreed.txt"), b"same everywhere");
}

#[test]
fn divergent_replicas_surface_as_eio() {
    let keys = Arc::new(MemoryKeyStore::new(3));
    let writer = peer(&keys, consensus_config());
    writer.create("/split.txt").unwrap();
    writer.write("/split.txt", 0, b"one").unwrap();
    keys.set_replica(2, &DhtKey::data(path_key("/split.txt")), b"two");

    let reader = peer(&keys, consensus_config());
    reader.bootstrap().unwrap();
    let reply: OpReply<Vec<u8>> = reader.read("/split.txt", 0, 16).into();
    assert_eq!(reply.status, -libc::EIO);

    // Once the replicas settle the read succeeds again.
    keys.set_replica(2, &DhtKey::data(path_key("/split.txt")), b"one");
    assert_eq!(read_all(&reader, "/split.txt"), b"one");
}
