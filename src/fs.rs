//! Filesystem-binding boundary
//!
//! [`DhtFs`] exposes one method per POSIX-style path operation. A kernel
//! binding calls these 1:1 and converts results with [`OpReply`], which
//! carries the errno convention (`0` success, negative errno on failure).

use crate::config::DhtFsConfig;
use crate::debounce::{
    DebounceConfig, DurableWriter, EventDispatcher, FlushEvent, ReconcileTrigger, TickReport,
    WriteDebouncer,
};
use crate::error::{ApiError, FsError, StoreError};
use crate::persistence::{self, versioned::list_versions};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::statfs::{StatFs, StatfsConfig};
use crate::store::KeyStore;
use crate::tree::path::{join, normalize, split_parent};
use crate::tree::{NodeAttr, NodeType, PathNode, PathTree};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Uniform `(status, payload)` result handed back to the binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpReply<T> {
    pub status: i32,
    pub payload: Option<T>,
}

impl<T> OpReply<T> {
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

impl<T> From<Result<T, FsError>> for OpReply<T> {
    fn from(result: Result<T, FsError>) -> Self {
        match result {
            Ok(payload) => OpReply {
                status: 0,
                payload: Some(payload),
            },
            Err(e) => OpReply {
                status: -e.errno(),
                payload: None,
            },
        }
    }
}

enum Buffered {
    Through(Arc<PathNode>),
    Debounced(Arc<PathNode>),
}

/// A mounted dhtfs peer: path tree, write debouncer, and reconciliation loop
pub struct DhtFs {
    keys: Arc<dyn KeyStore>,
    tree: Arc<PathTree>,
    debouncer: Arc<WriteDebouncer>,
    reconciler: Arc<Reconciler>,
    config: DhtFsConfig,
}

impl DhtFs {
    pub fn new(keys: Arc<dyn KeyStore>, config: DhtFsConfig) -> Self {
        let store = persistence::build(&config.persistence, keys.clone());
        let tree = Arc::new(PathTree::new(store));
        let reconciler = Arc::new(Reconciler::new(tree.clone(), config.reconcile.clone()));

        let dispatcher: Arc<EventDispatcher<FlushEvent>> = Arc::new(EventDispatcher::new());
        dispatcher.subscribe(Arc::new(DurableWriter::new(tree.clone())));
        if config.reconcile.enabled {
            dispatcher.subscribe(Arc::new(ReconcileTrigger::new(reconciler.clone())));
        }
        let debouncer = Arc::new(WriteDebouncer::new(config.debounce.clone(), dispatcher));

        Self {
            keys,
            tree,
            debouncer,
            reconciler,
            config,
        }
    }

    pub fn tree(&self) -> &Arc<PathTree> {
        &self.tree
    }

    pub fn debouncer(&self) -> &Arc<WriteDebouncer> {
        &self.debouncer
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    fn debounce_config(&self) -> &DebounceConfig {
        &self.config.debounce
    }

    /// Mirror the current Path Index into the local tree
    pub fn bootstrap(&self) -> Result<ReconcileReport, FsError> {
        let report = self.reconciler.run_pass()?;
        info!(
            paths = self.tree.all_paths().len(),
            created = report.created.len(),
            "Bootstrapped local tree"
        );
        Ok(report)
    }

    /// Start the background loops enabled in configuration
    pub fn start(&self) -> Result<(), ApiError> {
        if self.debounce_config().enabled {
            self.debouncer.start()?;
        }
        if self.config.reconcile.enabled {
            self.reconciler.start()?;
        }
        Ok(())
    }

    /// Stop both loops and drain every pending write
    pub fn shutdown(&self) -> TickReport {
        self.reconciler.stop();
        let report = self.debouncer.stop();
        info!(
            flushed = report.flushed,
            failed = report.failed,
            "Filesystem shut down"
        );
        report
    }

    pub fn getattr(&self, path: &str) -> Result<NodeAttr, FsError> {
        let node = self.tree.require(path)?;
        self.tree.attr(&node)
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let node = self.tree.require(path)?;
        self.tree.read_dir(&node)
    }

    pub fn create(&self, path: &str) -> Result<NodeAttr, FsError> {
        let (parent, name) = self.parent_of(path)?;
        let node = self.tree.mkfile(&parent, &name)?;
        self.tree.attr(&node)
    }

    pub fn mkdir(&self, path: &str) -> Result<NodeAttr, FsError> {
        let (parent, name) = self.parent_of(path)?;
        let node = self.tree.mkdir(&parent, &name)?;
        self.tree.attr(&node)
    }

    pub fn rmdir(&self, path: &str) -> Result<(), FsError> {
        let node = self.tree.require(path)?;
        if node.node_type() != NodeType::Directory {
            return Err(FsError::NotADirectory(node.full_path()));
        }
        if node.is_root() {
            return Err(FsError::InvalidPath(node.full_path()));
        }
        self.tree.delete(&node)
    }

    pub fn unlink(&self, path: &str) -> Result<(), FsError> {
        let node = self.tree.require(path)?;
        if node.node_type() == NodeType::Directory {
            return Err(FsError::IsADirectory(node.full_path()));
        }
        let dropped = self.debouncer.forget(&node.full_path());
        if dropped > 0 {
            debug!(path = %node.full_path(), "Dropped pending write for unlinked file");
        }
        self.tree.delete(&node)
    }

    /// Move `from` to `to`. Pending writes under `from` are flushed first so
    /// they land under the old keys before re-keying.
    pub fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let node = self.tree.require(from)?;
        let old_path = node.full_path();
        self.flush(&old_path)?;

        let (new_parent, new_name) = self.parent_of(to)?;
        let destination = join(&new_parent.full_path(), &new_name);
        if let Some(existing) = self.tree.find(&destination) {
            if existing.node_type() != NodeType::Directory && !Arc::ptr_eq(&existing, &node) {
                self.debouncer.forget(&destination);
            }
        }
        self.tree.rename(&node, &new_parent, &new_name)
    }

    pub fn read(&self, path: &str, offset: usize, size: usize) -> Result<Vec<u8>, FsError> {
        let node = self.tree.require(path)?;
        self.tree.read(&node, offset, size)
    }

    /// Apply a write. With debouncing on, bytes are buffered and flushed once
    /// the file has been quiet; transient files are written through.
    pub fn write(&self, path: &str, offset: usize, data: &[u8]) -> Result<usize, FsError> {
        let file = match self.buffered_target(path)? {
            Buffered::Through(node) => return self.tree.write(&node, offset, data),
            Buffered::Debounced(node) => node,
        };
        self.tree
            .buffer_write(&file, offset, data, |file_path, bytes| {
                self.debouncer.monitor(file_path, bytes.to_vec());
            })?;
        Ok(data.len())
    }

    pub fn truncate(&self, path: &str, size: usize) -> Result<(), FsError> {
        let file = match self.buffered_target(path)? {
            Buffered::Through(node) => return self.tree.truncate(&node, size),
            Buffered::Debounced(node) => node,
        };
        self.tree.buffer_truncate(&file, size, |file_path, bytes| {
            self.debouncer.monitor(file_path, bytes.to_vec());
        })
    }

    /// Decide whether a mutation of `path` goes through the debouncer
    fn buffered_target(&self, path: &str) -> Result<Buffered, FsError> {
        let node = self.tree.require(path)?;
        if !self.debounce_config().enabled {
            return Ok(Buffered::Through(node));
        }
        let file = self.tree.resolve_file(&node)?;
        if self.debouncer.is_transient(&file.full_path()) {
            return Ok(Buffered::Through(file));
        }
        Ok(Buffered::Debounced(file))
    }

    pub fn symlink(&self, path: &str, target: &str) -> Result<NodeAttr, FsError> {
        let (parent, name) = self.parent_of(path)?;
        let node = self.tree.symlink(&parent, &name, target)?;
        self.tree.attr(&node)
    }

    pub fn readlink(&self, path: &str) -> Result<String, FsError> {
        let node = self.tree.require(path)?;
        self.tree.read_link(&node)
    }

    /// Flush pending writes for `path` and its descendants now
    pub fn flush(&self, path: &str) -> Result<usize, FsError> {
        let normalized = normalize(path)?;
        let report = self.debouncer.flush_prefix(&normalized);
        if report.failed > 0 {
            warn!(path = %normalized, failed = report.failed, "Forced flush incomplete");
            return Err(FsError::Store(StoreError::Unavailable(format!(
                "{} pending writes under {} could not be flushed",
                report.failed, normalized
            ))));
        }
        Ok(report.flushed)
    }

    pub fn statfs(&self) -> StatFs {
        self.statfs_config().scaled(self.keys.peer_count())
    }

    fn statfs_config(&self) -> &StatfsConfig {
        &self.config.statfs
    }

    /// Archived snapshot paths for `path`, oldest first
    pub fn versions(&self, path: &str) -> Result<Vec<String>, FsError> {
        let normalized = normalize(path)?;
        Ok(list_versions(self.tree.store().as_ref(), &normalized)?)
    }

    fn parent_of(&self, path: &str) -> Result<(Arc<PathNode>, String), FsError> {
        let normalized = normalize(path)?;
        let (parent, name) =
            split_parent(&normalized).ok_or_else(|| FsError::AlreadyExists(normalized.clone()))?;
        let parent = self.tree.require(&parent)?;
        if parent.node_type() != NodeType::Directory {
            return Err(FsError::NotADirectory(parent.full_path()));
        }
        Ok((parent, name))
    }
}
