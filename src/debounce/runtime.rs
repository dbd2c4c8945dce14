//! Write debouncer runtime.
//!
//! Each monitored path carries a quiet countdown that resets on every write.
//! A tick decrements the countdowns and flushes paths that reached zero. The
//! flush itself is a `FlushOne` event; a subscriber performs the durable put.

use super::events::{DebounceConfig, EventDispatcher, FlushEvent};
use crate::background::{PeriodicTask, TickFlow};
use crate::error::{ApiError, FsError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A path with buffered bytes waiting for its quiet period to elapse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredFile {
    pub path: String,
    pub countdown: u32,
    pub bytes: Vec<u8>,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub flushed: usize,
    pub waiting: usize,
    pub failed: usize,
}

pub struct WriteDebouncer {
    config: DebounceConfig,
    monitored: Mutex<HashMap<String, MonitoredFile>>,
    dispatcher: Arc<EventDispatcher<FlushEvent>>,
    /// Serializes ticks and forced flushes: one in-flight flush per path
    flush_lock: Mutex<()>,
    task: Mutex<Option<PeriodicTask>>,
}

impl WriteDebouncer {
    pub fn new(config: DebounceConfig, dispatcher: Arc<EventDispatcher<FlushEvent>>) -> Self {
        Self {
            config,
            monitored: Mutex::new(HashMap::new()),
            dispatcher,
            flush_lock: Mutex::new(()),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    pub fn is_transient(&self, path: &str) -> bool {
        self.config.is_transient(path)
    }

    /// Register or refresh buffered bytes for `path`.
    ///
    /// Returns false (and monitors nothing) for transient paths.
    pub fn monitor(&self, path: &str, bytes: Vec<u8>) -> bool {
        if self.is_transient(path) {
            return false;
        }
        let file = MonitoredFile {
            path: path.to_string(),
            countdown: self.config.quiet_ticks,
            bytes,
        };
        self.monitored.lock().insert(path.to_string(), file);
        true
    }

    /// Bytes waiting to be flushed for `path`
    pub fn pending(&self, path: &str) -> Option<Vec<u8>> {
        self.monitored.lock().get(path).map(|f| f.bytes.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.monitored.lock().len()
    }

    /// Stop monitoring `path` and its descendants without flushing
    pub fn forget(&self, path: &str) -> usize {
        let prefix = format!("{}/", path);
        let mut monitored = self.monitored.lock();
        let before = monitored.len();
        monitored.retain(|p, _| p != path && !p.starts_with(&prefix));
        before - monitored.len()
    }

    /// Flush `path` and its descendants now, regardless of countdown
    pub fn flush_prefix(&self, path: &str) -> TickReport {
        let _flush = self.flush_lock.lock();
        let prefix = format!("{}/", path);
        let due: Vec<MonitoredFile> = {
            let mut monitored = self.monitored.lock();
            let keys: Vec<String> = monitored
                .keys()
                .filter(|p| p.as_str() == path || p.starts_with(&prefix))
                .cloned()
                .collect();
            keys.iter().filter_map(|k| monitored.remove(k)).collect()
        };
        self.flush_files(due, Vec::new())
    }

    /// Flush everything that is pending, regardless of countdown
    pub fn drain(&self) -> TickReport {
        let _flush = self.flush_lock.lock();
        let due: Vec<MonitoredFile> = std::mem::take(&mut *self.monitored.lock())
            .into_values()
            .collect();
        self.flush_files(due, Vec::new())
    }

    /// Run one debounce tick
    pub fn tick(&self) -> TickReport {
        let _flush = self.flush_lock.lock();
        let current = std::mem::take(&mut *self.monitored.lock());

        let mut due = Vec::new();
        let mut waiting = Vec::new();
        for (_, mut file) in current {
            if file.countdown > 0 {
                file.countdown -= 1;
                waiting.push(file);
            } else {
                due.push(file);
            }
        }
        self.flush_files(due, waiting)
    }

    /// Dispatch the flush lifecycle for `due`, then merge `waiting` back.
    ///
    /// Writes that arrived while the tick ran take precedence over the
    /// survivors, so the monitored map is replaced rather than edited in place.
    fn flush_files(&self, mut due: Vec<MonitoredFile>, waiting: Vec<MonitoredFile>) -> TickReport {
        let mut report = TickReport::default();
        self.dispatcher.dispatch(&FlushEvent::BeforeFlushAll);

        due.sort_by(|a, b| a.path.cmp(&b.path));
        let mut retry = Vec::new();
        for file in due {
            self.dispatcher.dispatch(&FlushEvent::BeforeFlushOne {
                path: file.path.clone(),
            });
            let failures = self.dispatcher.dispatch(&FlushEvent::FlushOne {
                path: file.path.clone(),
                bytes: file.bytes.clone(),
            });
            self.dispatcher.dispatch(&FlushEvent::AfterFlushOne {
                path: file.path.clone(),
            });

            if failures.is_empty() {
                report.flushed += 1;
                debug!(path = %file.path, len = file.bytes.len(), "Flushed buffered write");
            } else if failures.iter().all(FsError::is_permanent) {
                report.failed += 1;
                warn!(
                    path = %file.path,
                    error = %failures[0],
                    "Dropping buffered write that cannot be flushed"
                );
            } else {
                report.failed += 1;
                retry.push(MonitoredFile {
                    countdown: self.config.quiet_ticks,
                    ..file
                });
            }
        }

        self.dispatcher.dispatch(&FlushEvent::AfterFlushAll {
            flushed: report.flushed,
        });

        let mut monitored = self.monitored.lock();
        for file in waiting.into_iter().chain(retry) {
            monitored.entry(file.path.clone()).or_insert(file);
        }
        report.waiting = monitored.len();
        report
    }

    /// Start the periodic tick
    pub fn start(self: &Arc<Self>) -> Result<(), ApiError> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        *task = Some(PeriodicTask::start(
            "dhtfs-debouncer",
            Duration::from_millis(self.config.tick_ms),
            move || match weak.upgrade() {
                Some(debouncer) => {
                    let report = debouncer.tick();
                    if report.flushed > 0 || report.failed > 0 {
                        debug!(
                            flushed = report.flushed,
                            failed = report.failed,
                            waiting = report.waiting,
                            "Debounce tick"
                        );
                    }
                    TickFlow::Continue
                }
                None => TickFlow::Terminate,
            },
        )?);
        Ok(())
    }

    /// Stop the periodic tick and flush whatever is still pending
    pub fn stop(&self) -> TickReport {
        if let Some(task) = self.task.lock().take() {
            task.stop();
        }
        let report = self.drain();
        if report.flushed > 0 || report.failed > 0 {
            info!(
                flushed = report.flushed,
                failed = report.failed,
                "Drained pending writes on shutdown"
            );
        }
        report
    }
}
