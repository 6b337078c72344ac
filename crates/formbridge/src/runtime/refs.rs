use std::sync::Arc;

use formbridge_api::{RenderNode, Snapshot, Unsubscribe, Value};

use super::{ReactiveCell, SnapshotSink};
use crate::state_engine::StateEngine;

/// Two shallow refs. A ref triggers only when its reference changes, so a
/// refresh that leaves the render tree untouched does not re-render it.
pub struct RefSink {
    render_tree: ReactiveCell<Arc<RenderNode>>,
    value_model: ReactiveCell<Arc<Value>>,
}

impl RefSink {
    pub fn new(initial: &Snapshot) -> Self {
        Self {
            render_tree: ReactiveCell::new(Arc::clone(&initial.render_tree)),
            value_model: ReactiveCell::new(Arc::clone(&initial.value_model)),
        }
    }

    pub fn connect(bridge: &StateEngine) -> (Arc<Self>, Unsubscribe) {
        let sink = Arc::new(Self::new(&bridge.snapshot()));
        let detach = bridge.attach_sink(sink.clone());
        (sink, detach)
    }

    pub fn render_tree(&self) -> &ReactiveCell<Arc<RenderNode>> {
        &self.render_tree
    }

    pub fn value_model(&self) -> &ReactiveCell<Arc<Value>> {
        &self.value_model
    }
}

impl SnapshotSink for RefSink {
    fn store(&self, snapshot: &Snapshot) {
        self.render_tree
            .set_if(Arc::clone(&snapshot.render_tree), |old, new| !Arc::ptr_eq(old, new));
        self.value_model
            .set_if(Arc::clone(&snapshot.value_model), |old, new| !Arc::ptr_eq(old, new));
    }
}
