use std::sync::Arc;

use formbridge_api::{Snapshot, Unsubscribe};

use super::{ReactiveCell, SnapshotSink};
use crate::state_engine::StateEngine;

/// `subscribe` / `get_snapshot` pair for external-store subscription.
///
/// `get_snapshot` returns the same references until the bridge mirrors a new
/// state, so a consumer comparing by pointer never sees a spurious change.
pub struct ExternalStore {
    current: ReactiveCell<Snapshot>,
}

impl ExternalStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ReactiveCell::new(initial),
        }
    }

    pub fn connect(bridge: &StateEngine) -> (Arc<Self>, Unsubscribe) {
        let store = Arc::new(Self::new(bridge.snapshot()));
        let detach = bridge.attach_sink(store.clone());
        (store, detach)
    }

    pub fn subscribe(&self, on_store_change: impl Fn() + Send + Sync + 'static) -> Unsubscribe {
        self.current.watch(move |_| on_store_change())
    }

    pub fn get_snapshot(&self) -> Snapshot {
        self.current.get()
    }
}

impl SnapshotSink for ExternalStore {
    fn store(&self, snapshot: &Snapshot) {
        self.current
            .set_if(snapshot.clone(), |old, new| !old.ptr_eq(new));
    }
}
