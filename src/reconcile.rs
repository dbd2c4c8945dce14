//! Reconciliation Loop
//!
//! Periodically diffs the DHT's Path Index against the local tree and
//! creates or removes local nodes until the two match. This is how
//! independently running peers converge on the same hierarchy.

use crate::background::{PeriodicTask, TickFlow};
use crate::error::{ApiError, FsError};
use crate::persistence::{DataStore, IndexEntry, PathIndex};
use crate::tree::hasher::path_key;
use crate::tree::path::{looks_like_file, split_parent};
use crate::tree::{NodeType, PathTree};
use crate::types::ROOT_PATH;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconciliation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between passes in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// End the loop on the first failed pass instead of retrying next tick
    #[serde(default)]
    pub stop_on_error: bool,
}

fn default_true() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_ms: default_interval_ms(),
            stop_on_error: false,
        }
    }
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub removed: Vec<String>,
    pub failed: usize,
}

pub struct Reconciler {
    tree: Arc<PathTree>,
    config: ReconcileConfig,
    pass_lock: Mutex<()>,
    task: Mutex<Option<PeriodicTask>>,
}

impl Reconciler {
    pub fn new(tree: Arc<PathTree>, config: ReconcileConfig) -> Self {
        Self {
            tree,
            config,
            pass_lock: Mutex::new(()),
            task: Mutex::new(None),
        }
    }

    /// Apply one diff between the remote Path Index and the local tree
    pub fn run_pass(&self) -> Result<ReconcileReport, FsError> {
        let _pass = self.pass_lock.lock();
        let local = self.tree.all_paths();
        let entries = self.tree.store().get_all_entries()?;
        let remote: BTreeSet<String> = entries
            .iter()
            .map(|e| e.path.clone())
            .filter(|p| p != ROOT_PATH)
            .collect();

        let mut report = ReconcileReport::default();

        // Entries arrive sorted by path, so parents precede their children.
        for entry in entries.iter().filter(|e| e.path != ROOT_PATH && !local.contains(&e.path)) {
            match self.create_local(entry) {
                Ok(()) => report.created.push(entry.path.clone()),
                Err(FsError::AlreadyExists(_)) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(path = %entry.path, error = %e, "Failed to mirror remote path");
                }
            }
        }

        let mut keep = BTreeSet::new();
        for path in &remote {
            let mut current = path.clone();
            while let Some((parent, _)) = split_parent(&current) {
                if !keep.insert(parent.clone()) {
                    break;
                }
                current = parent;
            }
        }
        // Reverse order visits children before their parents.
        let orphans: Vec<&String> = local.difference(&remote).collect();
        for path in orphans.into_iter().rev() {
            if keep.contains(path) {
                continue;
            }
            if self.tree.detach_local(path) {
                report.removed.push(path.clone());
            }
        }

        if !report.created.is_empty() || !report.removed.is_empty() {
            info!(
                created = report.created.len(),
                removed = report.removed.len(),
                failed = report.failed,
                "Reconciled local tree"
            );
        }
        Ok(report)
    }

    fn create_local(&self, entry: &IndexEntry) -> Result<(), FsError> {
        if entry.is_symlink() {
            let target = match self.tree.store().get(&path_key(&entry.path))? {
                Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                None => entry.resolved.clone(),
            };
            self.tree.insert_local(&entry.path, NodeType::Symlink, &target)?;
            debug!(path = %entry.path, target = %target, "Mirrored remote symlink");
        } else {
            let node_type = if looks_like_file(&entry.path) {
                NodeType::File
            } else {
                NodeType::Directory
            };
            self.tree.insert_local(&entry.path, node_type, "")?;
            debug!(path = %entry.path, node_type = ?node_type, "Mirrored remote path");
        }
        Ok(())
    }

    /// Start the periodic pass
    pub fn start(self: &Arc<Self>) -> Result<(), ApiError> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let stop_on_error = self.config.stop_on_error;
        *task = Some(PeriodicTask::start(
            "dhtfs-reconciler",
            Duration::from_millis(self.config.interval_ms),
            move || {
                let reconciler = match weak.upgrade() {
                    Some(reconciler) => reconciler,
                    None => return TickFlow::Terminate,
                };
                match reconciler.run_pass() {
                    Ok(_) => TickFlow::Continue,
                    Err(e) if stop_on_error => {
                        error!(error = %e, "Reconciliation failed, stopping loop");
                        TickFlow::Terminate
                    }
                    Err(e) => {
                        warn!(error = %e, "Reconciliation failed, retrying next tick");
                        TickFlow::Continue
                    }
                }
            },
        )?);
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.stop();
        }
    }
}
