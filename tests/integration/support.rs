use dhtfs::config::DhtFsConfig;
use dhtfs::persistence::StrategyLayer;
use dhtfs::store::{KeyStore, MemoryKeyStore};
use dhtfs::DhtFs;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Config for a peer driven by hand: debouncing on, no background reconciliation
pub fn manual_config() -> DhtFsConfig {
    let mut config = DhtFsConfig::default();
    config.debounce.quiet_ticks = 2;
    config.reconcile.enabled = false;
    config
}

pub fn layered_config(layer: StrategyLayer) -> DhtFsConfig {
    let mut config = manual_config();
    config.persistence.layer = layer;
    config
}

pub fn peer(keys: &Arc<MemoryKeyStore>, config: DhtFsConfig) -> DhtFs {
    DhtFs::new(keys.clone() as Arc<dyn KeyStore>, config)
}

pub fn read_all(fs: &DhtFs, path: &str) -> Vec<u8> {
    let size = fs.getattr(path).unwrap().size as usize;
    fs.read(path, 0, size).unwrap()
}

/// Poll `check` until it holds or five seconds pass
pub fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}
