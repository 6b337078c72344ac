use std::sync::Arc;

use formbridge_api::{RenderNode, Snapshot, Unsubscribe, Value};

use super::{ReactiveCell, SnapshotSink};
use crate::state_engine::StateEngine;

/// Fields of the mutable observable object.
#[derive(Debug, Clone)]
pub struct ObservableState {
    pub render_tree: Arc<RenderNode>,
    pub value_model: Arc<Value>,
}

/// One observable object; both fields are reassigned on every refresh.
///
/// Each store counts as a mutation, even when the engine handed back the same
/// references, matching how deep-observed objects react to assignment.
pub struct ObservableSink {
    state: ReactiveCell<ObservableState>,
}

impl ObservableSink {
    pub fn new(initial: &Snapshot) -> Self {
        Self {
            state: ReactiveCell::new(ObservableState {
                render_tree: Arc::clone(&initial.render_tree),
                value_model: Arc::clone(&initial.value_model),
            }),
        }
    }

    /// Create a sink seeded from `bridge` and attach it.
    pub fn connect(bridge: &StateEngine) -> (Arc<Self>, Unsubscribe) {
        let sink = Arc::new(Self::new(&bridge.snapshot()));
        let detach = bridge.attach_sink(sink.clone());
        (sink, detach)
    }

    pub fn render_tree(&self) -> Arc<RenderNode> {
        self.state.with(|s| Arc::clone(&s.render_tree))
    }

    pub fn value_model(&self) -> Arc<Value> {
        self.state.with(|s| Arc::clone(&s.value_model))
    }

    pub fn version(&self) -> u64 {
        self.state.version()
    }

    pub fn watch(&self, watcher: impl Fn(&ObservableState) + Send + Sync + 'static) -> Unsubscribe {
        self.state.watch(watcher)
    }
}

impl SnapshotSink for ObservableSink {
    fn store(&self, snapshot: &Snapshot) {
        self.state.set(ObservableState {
            render_tree: Arc::clone(&snapshot.render_tree),
            value_model: Arc::clone(&snapshot.value_model),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_store_is_a_mutation() {
        let snapshot = Snapshot::new(
            Arc::new(RenderNode::new("", "Form")),
            Arc::new(Value::empty_object()),
        );
        let sink = ObservableSink::new(&snapshot);
        sink.store(&snapshot);
        sink.store(&snapshot);
        assert_eq!(sink.version(), 2);
        assert!(Arc::ptr_eq(&sink.value_model(), &snapshot.value_model));
    }
}
