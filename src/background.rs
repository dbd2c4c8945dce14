//! Periodic background loops with cooperative shutdown.
//!
//! Each loop runs on its own named thread. A shared running flag is checked
//! at the top of every tick; `stop` clears it and joins the thread, so an
//! in-flight tick always completes before shutdown returns.

use crate::error::ApiError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest single sleep between running-flag checks
const POLL_SLICE: Duration = Duration::from_millis(25);

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Terminate,
}

pub struct PeriodicTask {
    name: String,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Spawn `tick` every `interval` until stopped or it returns `Terminate`
    pub fn start<F>(name: &str, interval: Duration, mut tick: F) -> Result<Self, ApiError>
    where
        F: FnMut() -> TickFlow + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread_name = name.to_string();
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(task = %thread_name, "Background loop started");
                while flag.load(Ordering::SeqCst) {
                    let started = Instant::now();
                    if tick() == TickFlow::Terminate {
                        info!(task = %thread_name, "Background loop terminated itself");
                        break;
                    }
                    while flag.load(Ordering::SeqCst) {
                        let elapsed = started.elapsed();
                        if elapsed >= interval {
                            break;
                        }
                        std::thread::sleep((interval - elapsed).min(POLL_SLICE));
                    }
                }
                flag.store(false, Ordering::SeqCst);
                debug!(task = %thread_name, "Background loop exited");
            })
            .map_err(|source| ApiError::Spawn {
                name: name.to_string(),
                source,
            })?;

        info!(task = %name, interval_ms = interval.as_millis() as u64, "Started background loop");
        Ok(Self {
            name: name.to_string(),
            running,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag and wait for the loop thread to exit
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            // The owner can be dropped from inside its own loop.
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            let _ = handle.join();
            info!(task = %self.name, "Stopped background loop");
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
