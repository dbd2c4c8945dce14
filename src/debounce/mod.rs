//! Write debouncing: events, dispatch, and the flush runtime.

mod events;
mod runtime;
mod subscribers;

pub use events::{DebounceConfig, EventDispatcher, FlushEvent, Subscriber};
pub use runtime::{MonitoredFile, TickReport, WriteDebouncer};
pub use subscribers::{DurableWriter, ReconcileTrigger};
