//! Flush lifecycle events, configuration, and the publish/subscribe bus.

use crate::error::FsError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Write debouncer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Buffer writes and flush them from a background tick; when false,
    /// every write goes straight to the Data Store
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tick interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Quiet ticks a path must see before it is flushed
    #[serde(default = "default_quiet_ticks")]
    pub quiet_ticks: u32,

    /// File-name patterns of transient files that are never monitored.
    /// A single `*` matches any run of characters.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_quiet_ticks() -> u32 {
    2
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "*.swp".to_string(),
        "*.swx".to_string(),
        "*~".to_string(),
        ".#*".to_string(),
        ".goutputstream-*".to_string(),
        "4913".to_string(),
    ]
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            tick_ms: default_tick_ms(),
            quiet_ticks: default_quiet_ticks(),
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl DebounceConfig {
    /// Whether the last component of `path` matches an ignore pattern
    pub fn is_transient(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        self.ignore_patterns
            .iter()
            .any(|pattern| matches_name(name, pattern))
    }
}

fn matches_name(name: &str, pattern: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
        None => name == pattern,
    }
}

/// Flush lifecycle, in dispatch order within one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushEvent {
    BeforeFlushAll,
    BeforeFlushOne { path: String },
    FlushOne { path: String, bytes: Vec<u8> },
    AfterFlushOne { path: String },
    AfterFlushAll { flushed: usize },
}

/// Reaction to dispatched events
pub trait Subscriber<E>: Send + Sync {
    fn name(&self) -> &str;
    fn on_event(&self, event: &E) -> Result<(), FsError>;
}

/// Generic publish/subscribe bus
pub struct EventDispatcher<E> {
    subscribers: RwLock<Vec<Arc<dyn Subscriber<E>>>>,
}

impl<E: fmt::Debug> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber<E>>) {
        self.subscribers.write().push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Deliver `event` to every subscriber in subscription order.
    ///
    /// A failing subscriber is logged and skipped; its error is returned so
    /// the publisher can react.
    pub fn dispatch(&self, event: &E) -> Vec<FsError> {
        let subscribers: Vec<Arc<dyn Subscriber<E>>> = self.subscribers.read().clone();
        let mut failures = Vec::new();
        for subscriber in subscribers {
            if let Err(e) = subscriber.on_event(event) {
                warn!(
                    subscriber = subscriber.name(),
                    event = ?event,
                    error = %e,
                    "Subscriber failed"
                );
                failures.push(e);
            }
        }
        failures
    }
}

impl<E: fmt::Debug> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}
