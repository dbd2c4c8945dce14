use crate::support::{eventually, manual_config, peer, read_all};
use dhtfs::store::{DhtKey, MemoryKeyStore};
use dhtfs::tree::hasher::path_key;
use std::sync::Arc;

#[test]
fn burst_of_writes_is_flushed_once() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let writer = peer(&keys, manual_config());
    writer.mkdir("/docs").unwrap();
    writer.create("/docs/a.txt").unwrap();

    let data_key = DhtKey::data(path_key("/docs/a.txt"));
    let created = keys.put_count(&data_key);

    writer.write("/docs/a.txt", 0, b"hello").unwrap();
    writer.write("/docs/a.txt", 5, b" world").unwrap();
    assert_eq!(read_all(&writer, "/docs/a.txt"), b"hello world");

    // Two quiet ticks count down, the third flushes.
    assert_eq!(writer.debouncer().tick().flushed, 0);
    assert_eq!(writer.debouncer().tick().flushed, 0);
    assert_eq!(writer.debouncer().tick().flushed, 1);
    assert_eq!(keys.put_count(&data_key), created + 1);

    let reader = peer(&keys, manual_config());
    reader.bootstrap().unwrap();
    assert_eq!(read_all(&reader, "/docs/a.txt"), b"hello world");
}

#[test]
fn write_during_countdown_restarts_it() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let fs = peer(&keys, manual_config());
    fs.create("/log.txt").unwrap();

    fs.write("/log.txt", 0, b"a").unwrap();
    fs.debouncer().tick();
    fs.debouncer().tick();
    fs.write("/log.txt", 1, b"b").unwrap();
    assert_eq!(fs.debouncer().tick().flushed, 0);
    assert_eq!(fs.debouncer().tick().flushed, 0);
    assert_eq!(fs.debouncer().tick().flushed, 1);
    assert_eq!(read_all(&fs, "/log.txt"), b"ab");
}

#[test]
fn background_tick_flushes_and_shutdown_drains() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let mut config = manual_config();
    config.debounce.tick_ms = 5;
    config.debounce.quiet_ticks = 1;
    let fs = peer(&keys, config);
    fs.create("/fast.txt").unwrap();
    fs.start().unwrap();

    let data_key = DhtKey::data(path_key("/fast.txt"));
    let created = keys.put_count(&data_key);
    fs.write("/fast.txt", 0, b"tick").unwrap();
    assert!(eventually(|| keys.put_count(&data_key) == created + 1));

    fs.create("/slow.txt").unwrap();
    fs.write("/slow.txt", 0, b"drained").unwrap();
    fs.shutdown();
    assert_eq!(fs.debouncer().pending_count(), 0);

    let reader = peer(&keys, manual_config());
    reader.bootstrap().unwrap();
    assert_eq!(read_all(&reader, "/slow.txt"), b"drained");
}

#[test]
fn disabled_debouncing_writes_through() {
    let keys = Arc::new(MemoryKeyStore::new(1));
    let mut config = manual_config();
    config.debounce.enabled = false;
    let fs = peer(&keys, config);
    fs.create("/now.txt").unwrap();
    let data_key = DhtKey::data(path_key("/now.txt"));
    let created = keys.put_count(&data_key);
    fs.write("/now.txt", 0, b"1").unwrap();
    fs.write("/now.txt", 1, b"2").unwrap();
    assert_eq!(keys.put_count(&data_key), created + 2);
}
