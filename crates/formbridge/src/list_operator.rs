use formbridge_api::Value;

use crate::state_engine::StateEngine;
use crate::Result;

/// List primitives scoped to one path.
///
/// Every call goes to the engine unchanged, through the bridge, so a
/// destroyed bridge turns them into no-ops. Bounds are the engine's concern.
#[derive(Clone)]
pub struct ListOperator {
    bridge: StateEngine,
    path: String,
}

impl ListOperator {
    pub(crate) fn new(bridge: StateEngine, path: String) -> Self {
        Self { bridge, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn append(&self, row: Value) -> Result<()> {
        self.bridge.list_append(&self.path, row)
    }

    pub fn insert(&self, index: usize, row: Value) -> Result<()> {
        self.bridge.list_insert(&self.path, index, row)
    }

    pub fn remove(&self, index: usize) -> Result<()> {
        self.bridge.list_remove(&self.path, index)
    }

    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.bridge.list_move(&self.path, from, to)
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        self.bridge.list_swap(&self.path, a, b)
    }

    pub fn replace(&self, index: usize, row: Value) -> Result<()> {
        self.bridge.list_replace(&self.path, index, row)
    }

    pub fn clear(&self) -> Result<()> {
        self.bridge.list_clear(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, BridgeConfig};
    use crate::testing::{EngineCall, RecordingEngine};
    use formbridge_api::{EngineError, FormSchema};
    use formbridge_core::ComponentRegistry;

    fn setup() -> (std::sync::Arc<RecordingEngine>, StateEngine) {
        let engine = RecordingEngine::new();
        let bridge = StateEngine::new(
            FormSchema::new(Vec::new()),
            None,
            &engine.factory(),
            ComponentRegistry::new(),
            BridgeConfig {
                batch: BatchConfig::disabled(),
                ..Default::default()
            },
        )
        .unwrap();
        (engine, bridge)
    }

    #[test]
    fn test_operations_delegate_verbatim() {
        let (engine, bridge) = setup();
        let items = bridge.list_operator("items");
        let row = Value::from(serde_json::json!({"x": 1}));

        items.append(row.clone()).unwrap();
        items.insert(0, row.clone()).unwrap();
        items.remove(1).unwrap();
        items.move_item(0, 2).unwrap();
        items.swap(1, 0).unwrap();
        items.replace(0, row.clone()).unwrap();
        items.clear().unwrap();

        let path = "items".to_string();
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::ListAppend { path: path.clone(), row: row.clone() },
                EngineCall::ListInsert { path: path.clone(), index: 0, row: row.clone() },
                EngineCall::ListRemove { path: path.clone(), index: 1 },
                EngineCall::ListMove { path: path.clone(), from: 0, to: 2 },
                EngineCall::ListSwap { path: path.clone(), a: 1, b: 0 },
                EngineCall::ListReplace { path: path.clone(), index: 0, row },
                EngineCall::ListClear { path },
            ]
        );
    }

    #[test]
    fn test_engine_errors_surface() {
        let (engine, bridge) = setup();
        engine.fail_next_write(EngineError::IndexOutOfRange {
            path: "items".to_string(),
            index: 9,
            len: 0,
        });
        assert!(bridge.list_operator("items").remove(9).is_err());
    }
}
