//! Reactive bridge between a schema-driven form engine and UI runtimes.
//!
//! The [`StateEngine`] owns one engine and mirrors its settled snapshots;
//! the [`EventHandler`] turns widget events into engine writes, optionally
//! coalesced by an [`UpdateBatcher`]; the [`runtime`] sinks adapt the mirror
//! to observable, ref and external-store style hosts.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod batcher;
pub mod config;
pub mod error;
pub mod event_handler;
pub mod list_operator;
pub mod logging;
pub mod memory_engine;
pub mod runtime;
pub mod state_engine;
pub mod testing;

pub use batcher::{BatcherState, FlushHandler, PendingUpdate, UpdateBatcher};
pub use config::{BatchConfig, BridgeConfig};
pub use error::{BridgeError, Result};
pub use event_handler::{
    BatchRouting, ChangeOutcome, ErrorReporter, EventHandler, FieldHook, TransformFailure,
};
pub use list_operator::ListOperator;
pub use memory_engine::{MemoryEngine, MemoryEngineFactory};
pub use runtime::{ExternalStore, ObservableSink, ReactiveCell, RefSink, SnapshotSink};
pub use state_engine::{SnapshotListener, StateEngine};

pub use formbridge_api as api;
pub use formbridge_core as components;

/// Lock, ignoring poisoning. No callback ever runs while one of these is held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
