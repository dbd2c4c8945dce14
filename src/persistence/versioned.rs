//! Versioned layer: bounded snapshot history per file.
//!
//! Before a key holding a value is overwritten with different bytes, the old
//! value is archived into a hidden version folder next to the file:
//!
//! ```text
//! /a/report.txt
//! /a/.report_txt/                          version folder (in the Path Index)
//! /a/.report_txt/VERSION_QUEUE             FIFO of snapshot paths (data only)
//! /a/.report_txt/report_<timestamp>.txt    snapshots (registered like files)
//! ```
//!
//! The queue holds at most `max_versions + 1` entries before the oldest
//! snapshot is pruned.

use super::{DataStore, IndexEntry, PathIndex, Persistence};
use crate::error::StoreError;
use crate::tree::hasher::path_key;
use crate::tree::path::{join, split_parent};
use crate::types::PathKey;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the queue entry inside a version folder
pub const VERSION_QUEUE: &str = "VERSION_QUEUE";

/// Sortable by construction order
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S%3f";

/// Version folder paths derived from a file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLayout {
    pub folder: String,
    pub queue: String,
    stem: String,
    extension: String,
}

impl VersionLayout {
    /// Derive the layout for `path`; fails when the name has no extension
    pub fn for_path(path: &str) -> Result<Self, StoreError> {
        let (parent, name) = split_parent(path)
            .ok_or_else(|| StoreError::Archive(format!("cannot version {}", path)))?;
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                (stem.to_string(), ext.to_string())
            }
            _ => {
                return Err(StoreError::Archive(format!(
                    "no recognizable extension in {}",
                    path
                )))
            }
        };
        let folder = join(&parent, &format!(".{}", name.replace('.', "_")));
        let queue = join(&folder, VERSION_QUEUE);
        Ok(Self {
            folder,
            queue,
            stem,
            extension,
        })
    }

    pub fn snapshot_path(&self, timestamp: &str) -> String {
        join(
            &self.folder,
            &format!("{}_{}.{}", self.stem, timestamp, self.extension),
        )
    }
}

fn load_queue<S: DataStore + ?Sized>(
    store: &S,
    layout: &VersionLayout,
) -> Result<VecDeque<String>, StoreError> {
    match store.get(&path_key(&layout.queue))? {
        Some(raw) => Ok(bincode::deserialize(&raw)?),
        None => Ok(VecDeque::new()),
    }
}

/// Snapshot paths recorded for `path`, oldest first
pub fn list_versions<S: DataStore + ?Sized>(store: &S, path: &str) -> Result<Vec<String>, StoreError> {
    let layout = VersionLayout::for_path(path)?;
    Ok(load_queue(store, &layout)?.into_iter().collect())
}

pub struct VersionedStore {
    inner: Arc<dyn Persistence>,
    max_versions: usize,
}

impl VersionedStore {
    pub fn new(inner: Arc<dyn Persistence>, max_versions: usize) -> Self {
        Self {
            inner,
            max_versions: max_versions.max(1),
        }
    }

    /// Snapshot paths for `path`, oldest first
    pub fn versions(&self, path: &str) -> Result<Vec<String>, StoreError> {
        list_versions(self.inner.as_ref(), path)
    }

    fn ensure_folder(&self, layout: &VersionLayout) -> Result<(), StoreError> {
        let folder_key = path_key(&layout.folder);
        if self.inner.get_entry(&folder_key)?.is_some() {
            return Ok(());
        }
        self.inner
            .put_entry(&folder_key, &IndexEntry::new(&layout.folder))
            .map_err(|e| StoreError::Archive(format!("cannot create {}: {}", layout.folder, e)))?;
        self.inner.put(&folder_key, &[])?;
        info!(folder = %layout.folder, "Created version folder");
        Ok(())
    }

    fn archive(&self, key: &PathKey, previous: &[u8]) -> Result<(), StoreError> {
        let entry = self.inner.get_entry(key)?.ok_or_else(|| {
            StoreError::Archive(format!("no index entry for {}", hex::encode(key)))
        })?;
        let layout = VersionLayout::for_path(&entry.path)?;
        self.ensure_folder(&layout)?;

        let mut queue = load_queue(self.inner.as_ref(), &layout)?;
        let stamp = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let mut snapshot = layout.snapshot_path(&stamp);
        let mut suffix = 1;
        while queue.contains(&snapshot) {
            snapshot = layout.snapshot_path(&format!("{}-{}", stamp, suffix));
            suffix += 1;
        }

        let snapshot_key = path_key(&snapshot);
        self.inner.put(&snapshot_key, previous)?;
        self.inner.put_entry(&snapshot_key, &IndexEntry::new(&snapshot))?;
        queue.push_back(snapshot.clone());
        debug!(path = %entry.path, snapshot = %snapshot, "Archived previous version");

        while queue.len() > self.max_versions {
            if let Some(oldest) = queue.pop_front() {
                let oldest_key = path_key(&oldest);
                self.inner.remove_entry(&oldest_key)?;
                self.inner.remove(&oldest_key)?;
                debug!(snapshot = %oldest, "Pruned oldest version");
            }
        }

        self.inner
            .put(&path_key(&layout.queue), &bincode::serialize(&queue)?)
    }
}

impl DataStore for VersionedStore {
    fn get(&self, key: &PathKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &PathKey, value: &[u8]) -> Result<(), StoreError> {
        if let Some(previous) = self.inner.get(key)? {
            if previous != value {
                self.archive(key, &previous)?;
            }
        }
        self.inner.put(key, value)
    }

    fn remove(&self, key: &PathKey) -> Result<(), StoreError> {
        self.inner.remove(key)
    }
}

impl PathIndex for VersionedStore {
    fn get_entry(&self, key: &PathKey) -> Result<Option<IndexEntry>, StoreError> {
        self.inner.get_entry(key)
    }

    fn put_entry(&self, key: &PathKey, entry: &IndexEntry) -> Result<(), StoreError> {
        self.inner.put_entry(key, entry)
    }

    fn remove_entry(&self, key: &PathKey) -> Result<(), StoreError> {
        self.inner.remove_entry(key)
    }

    fn get_all_entries(&self) -> Result<Vec<IndexEntry>, StoreError> {
        self.inner.get_all_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::DirectStore;
    use crate::store::MemoryKeyStore;

    fn versioned(max_versions: usize) -> VersionedStore {
        let keys = Arc::new(MemoryKeyStore::new(1));
        VersionedStore::new(Arc::new(DirectStore::new(keys)), max_versions)
    }

    fn register(store: &VersionedStore, path: &str) -> PathKey {
        let key = path_key(path);
        store.put_entry(&key, &IndexEntry::new(path)).unwrap();
        key
    }

    #[test]
    fn test_layout() {
        let layout = VersionLayout::for_path("/a/report.txt").unwrap();
        assert_eq!(layout.folder, "/a/.report_txt");
        assert_eq!(layout.queue, "/a/.report_txt/VERSION_QUEUE");
        assert_eq!(
            layout.snapshot_path("2026-01-02-030405000"),
            "/a/.report_txt/report_2026-01-02-030405000.txt"
        );
        let nested = VersionLayout::for_path("/archive.tar.gz").unwrap();
        assert_eq!(nested.folder, "/.archive_tar_gz");
        assert!(VersionLayout::for_path("/a/Makefile").is_err());
        assert!(VersionLayout::for_path("/").is_err());
    }

    #[test]
    fn test_first_write_does_not_archive() {
        let store = versioned(3);
        let key = register(&store, "/a/report.txt");
        store.put(&key, b"v0").unwrap();
        assert!(store.versions("/a/report.txt").unwrap().is_empty());
        assert!(!store.get_all_paths().unwrap().contains("/a/.report_txt"));
    }

    #[test]
    fn test_version_bound_evicts_oldest_first() {
        let max = 3;
        let store = versioned(max);
        let key = register(&store, "/a/report.txt");
        store.put(&key, b"v0").unwrap();
        for i in 1..=6 {
            store.put(&key, format!("v{}", i).as_bytes()).unwrap();
        }

        let versions = store.versions("/a/report.txt").unwrap();
        assert_eq!(versions.len(), max);
        let contents: Vec<Vec<u8>> = versions
            .iter()
            .map(|p| store.get(&path_key(p)).unwrap().unwrap())
            .collect();
        assert_eq!(contents, vec![b"v3".to_vec(), b"v4".to_vec(), b"v5".to_vec()]);

        let paths = store.get_all_paths().unwrap();
        assert!(paths.contains("/a/.report_txt"));
        let snapshots = paths
            .iter()
            .filter(|p| p.starts_with("/a/.report_txt/"))
            .count();
        assert_eq!(snapshots, max);
        assert_eq!(store.get(&key).unwrap().unwrap(), b"v6");
    }

    #[test]
    fn test_identical_rewrite_is_not_archived() {
        let store = versioned(3);
        let key = register(&store, "/a/report.txt");
        store.put(&key, b"same").unwrap();
        store.put(&key, b"same").unwrap();
        assert!(store.versions("/a/report.txt").unwrap().is_empty());
    }

    #[test]
    fn test_archive_failure_aborts_write() {
        let store = versioned(3);
        let key = register(&store, "/a/Makefile");
        store.put(&key, b"all:").unwrap();
        let result = store.put(&key, b"build:");
        assert!(matches!(result, Err(StoreError::Archive(_))));
        assert_eq!(store.get(&key).unwrap().unwrap(), b"all:");
    }
}
