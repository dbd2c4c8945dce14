use crate::support::{layered_config, peer, read_all};
use dhtfs::persistence::StrategyLayer;
use dhtfs::store::MemoryKeyStore;
use dhtfs::FsError;
use std::sync::Arc;

#[test]
fn overwrites_keep_bounded_history() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let mut config = layered_config(StrategyLayer::Versioned);
    config.persistence.max_versions = 3;
    let fs = peer(&keys, config);
    fs.create("/report.txt").unwrap();

    for round in 0..6u8 {
        fs.truncate("/report.txt", 0).unwrap();
        fs.write("/report.txt", 0, &[b'0' + round]).unwrap();
        fs.flush("/report.txt").unwrap();
    }

    let versions = fs.versions("/report.txt").unwrap();
    assert_eq!(versions.len(), 3);
    assert!(versions.iter().all(|v| v.starts_with("/.report_txt/report_")));

    // The newest snapshot holds the value overwritten last.
    fs.reconciler().run_pass().unwrap();
    let newest = versions.last().unwrap();
    assert_eq!(read_all(&fs, newest), b"4");
    assert_eq!(read_all(&fs, "/report.txt"), b"5");
}

#[test]
fn file_without_extension_cannot_be_versioned() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let mut config = layered_config(StrategyLayer::Versioned);
    config.debounce.enabled = false;
    let fs = peer(&keys, config);
    fs.create("/Makefile").unwrap();
    let err = fs.write("/Makefile", 0, b"all:").unwrap_err();
    assert!(matches!(err, FsError::Store(_)));
}

#[test]
fn chunked_layer_round_trips_large_file() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let mut config = layered_config(StrategyLayer::Chunked);
    config.persistence.chunk_size = 64;
    let writer = peer(&keys, config.clone());
    let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    writer.create("/blob.bin").unwrap();
    writer.write("/blob.bin", 0, &payload).unwrap();
    writer.flush("/blob.bin").unwrap();

    let reader = peer(&keys, config);
    reader.bootstrap().unwrap();
    assert_eq!(read_all(&reader, "/blob.bin"), payload);
}
