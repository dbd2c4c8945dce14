//! Flush reactions: durable writes and post-flush reconciliation.

use super::events::{FlushEvent, Subscriber};
use crate::error::FsError;
use crate::reconcile::Reconciler;
use crate::tree::PathTree;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Performs the Data Store put for each flushed path
pub struct DurableWriter {
    tree: Arc<PathTree>,
}

impl DurableWriter {
    pub fn new(tree: Arc<PathTree>) -> Self {
        Self { tree }
    }
}

impl Subscriber<FlushEvent> for DurableWriter {
    fn name(&self) -> &str {
        "durable-writer"
    }

    fn on_event(&self, event: &FlushEvent) -> Result<(), FsError> {
        if let FlushEvent::FlushOne { path, bytes } = event {
            self.tree.commit(path, bytes)?;
        }
        Ok(())
    }
}

/// Runs one reconciliation pass after any tick that flushed something
pub struct ReconcileTrigger {
    reconciler: Arc<Reconciler>,
    flushed: AtomicBool,
}

impl ReconcileTrigger {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            flushed: AtomicBool::new(false),
        }
    }
}

impl Subscriber<FlushEvent> for ReconcileTrigger {
    fn name(&self) -> &str {
        "reconcile-trigger"
    }

    fn on_event(&self, event: &FlushEvent) -> Result<(), FsError> {
        match event {
            FlushEvent::AfterFlushOne { .. } => {
                self.flushed.store(true, Ordering::SeqCst);
            }
            FlushEvent::AfterFlushAll { .. } => {
                if self.flushed.swap(false, Ordering::SeqCst) {
                    let report = self.reconciler.run_pass()?;
                    debug!(
                        created = report.created.len(),
                        removed = report.removed.len(),
                        "Reconciled after flush"
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}
