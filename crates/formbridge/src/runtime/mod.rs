//! Host-runtime containers the bridge pushes snapshots into.
//!
//! Each runtime style gets a thin sink over the same canonical bridge:
//!
//! - [`ObservableSink`]: one mutable observable object whose fields are
//!   reassigned on every refresh (Vue 2 style).
//! - [`RefSink`]: two shallow refs that trigger only when their reference
//!   changes (Vue 3 style).
//! - [`ExternalStore`]: `subscribe` + `get_snapshot` pair for
//!   external-store subscription (React style).

pub mod cell;
pub mod external_store;
pub mod observable;
pub mod refs;

pub use cell::ReactiveCell;
pub use external_store::ExternalStore;
pub use observable::{ObservableSink, ObservableState};
pub use refs::RefSink;

use formbridge_api::Snapshot;

/// Receives every settled snapshot the bridge mirrors.
///
/// Called synchronously, before snapshot listeners, with no bridge lock held.
pub trait SnapshotSink: Send + Sync {
    fn store(&self, snapshot: &Snapshot);
}
