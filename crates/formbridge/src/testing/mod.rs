//! Test doubles for code that drives a [`FormEngine`].
//!
//! [`RecordingEngine`] records every call it receives and never changes its
//! own state in response. Tests script the engine's outputs with
//! [`RecordingEngine::set_model`] / [`RecordingEngine::set_render_tree`] and
//! push arbitrary change events with [`RecordingEngine::emit`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use formbridge_api::{
    ChangeEvent, ChangeListener, EngineError, EngineFactory, FormEngine, FormSchema, RenderNode,
    Unsubscribe, ValidationResult, Value,
};

use crate::lock;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    UpdateValue { path: String, value: Option<Value> },
    UpdateValues(Vec<(String, Option<Value>)>),
    SetFormSchema,
    Reset(Option<String>),
    Validate(Option<Vec<String>>),
    ListAppend { path: String, row: Value },
    ListInsert { path: String, index: usize, row: Value },
    ListRemove { path: String, index: usize },
    ListMove { path: String, from: usize, to: usize },
    ListSwap { path: String, a: usize, b: usize },
    ListReplace { path: String, index: usize, row: Value },
    ListClear { path: String },
    Destroy,
}

struct Recorder {
    calls: Vec<EngineCall>,
    listeners: BTreeMap<u64, ChangeListener>,
    next_id: u64,
    render_tree: Arc<RenderNode>,
    value_model: Arc<Value>,
    validation: ValidationResult,
    fail_next: Option<EngineError>,
    destroyed: bool,
}

pub struct RecordingEngine {
    state: Arc<Mutex<Recorder>>,
}

impl RecordingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(Recorder {
                calls: Vec::new(),
                listeners: BTreeMap::new(),
                next_id: 0,
                render_tree: Arc::new(RenderNode::new("", "Form")),
                value_model: Arc::new(Value::empty_object()),
                validation: ValidationResult::default(),
                fail_next: None,
                destroyed: false,
            })),
        })
    }

    /// Factory that hands out this very engine.
    pub fn factory(self: &Arc<Self>) -> impl EngineFactory {
        let engine = Arc::clone(self);
        move |_schema: FormSchema,
              _initial: Option<Value>|
              -> Result<Arc<dyn FormEngine>, EngineError> {
            Ok(Arc::clone(&engine) as Arc<dyn FormEngine>)
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.state).calls.clone()
    }

    pub fn take_calls(&self) -> Vec<EngineCall> {
        std::mem::take(&mut lock(&self.state).calls)
    }

    /// Replace the value model reference returned from now on.
    pub fn set_model(&self, model: Value) {
        lock(&self.state).value_model = Arc::new(model);
    }

    pub fn set_render_tree(&self, tree: Arc<RenderNode>) {
        lock(&self.state).render_tree = tree;
    }

    pub fn set_validation(&self, result: ValidationResult) {
        lock(&self.state).validation = result;
    }

    /// The next write or list call fails with `error` (and is still recorded).
    pub fn fail_next_write(&self, error: EngineError) {
        lock(&self.state).fail_next = Some(error);
    }

    /// Deliver `event` to every listener, in registration order.
    pub fn emit(&self, event: &ChangeEvent) {
        let listeners: Vec<ChangeListener> = lock(&self.state).listeners.values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    pub fn is_destroyed(&self) -> bool {
        lock(&self.state).destroyed
    }

    fn record(&self, call: EngineCall) -> Result<(), EngineError> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        match state.fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl FormEngine for RecordingEngine {
    fn get_value(&self, path: Option<&str>) -> Option<Value> {
        lock(&self.state)
            .value_model
            .get_path(path.unwrap_or(""))
            .cloned()
    }

    fn value_model(&self) -> Arc<Value> {
        Arc::clone(&lock(&self.state).value_model)
    }

    fn render_tree(&self) -> Arc<RenderNode> {
        Arc::clone(&lock(&self.state).render_tree)
    }

    fn update_value(&self, path: &str, value: Option<Value>) -> Result<(), EngineError> {
        self.record(EngineCall::UpdateValue {
            path: path.to_string(),
            value,
        })
    }

    fn update_values(&self, updates: Vec<(String, Option<Value>)>) -> Result<(), EngineError> {
        self.record(EngineCall::UpdateValues(updates))
    }

    fn on_value_change(&self, listener: ChangeListener) -> Unsubscribe {
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.insert(id, listener);
            id
        };
        let weak = Arc::downgrade(&self.state);
        Unsubscribe::new(move || {
            if let Some(state) = weak.upgrade() {
                lock(&state).listeners.remove(&id);
            }
        })
    }

    fn set_form_schema(&self, _schema: FormSchema) -> Result<(), EngineError> {
        self.record(EngineCall::SetFormSchema)
    }

    fn reset(&self, target: Option<&str>) -> Result<(), EngineError> {
        self.record(EngineCall::Reset(target.map(str::to_string)))
    }

    fn validate(&self, paths: Option<&[String]>) -> ValidationResult {
        let mut state = lock(&self.state);
        state
            .calls
            .push(EngineCall::Validate(paths.map(|p| p.to_vec())));
        state.validation.clone()
    }

    fn list_append(&self, path: &str, row: Value) -> Result<(), EngineError> {
        self.record(EngineCall::ListAppend {
            path: path.to_string(),
            row,
        })
    }

    fn list_insert(&self, path: &str, index: usize, row: Value) -> Result<(), EngineError> {
        self.record(EngineCall::ListInsert {
            path: path.to_string(),
            index,
            row,
        })
    }

    fn list_remove(&self, path: &str, index: usize) -> Result<(), EngineError> {
        self.record(EngineCall::ListRemove {
            path: path.to_string(),
            index,
        })
    }

    fn list_move(&self, path: &str, from: usize, to: usize) -> Result<(), EngineError> {
        self.record(EngineCall::ListMove {
            path: path.to_string(),
            from,
            to,
        })
    }

    fn list_swap(&self, path: &str, a: usize, b: usize) -> Result<(), EngineError> {
        self.record(EngineCall::ListSwap {
            path: path.to_string(),
            a,
            b,
        })
    }

    fn list_replace(&self, path: &str, index: usize, row: Value) -> Result<(), EngineError> {
        self.record(EngineCall::ListReplace {
            path: path.to_string(),
            index,
            row,
        })
    }

    fn list_clear(&self, path: &str) -> Result<(), EngineError> {
        self.record(EngineCall::ListClear {
            path: path.to_string(),
        })
    }

    fn destroy(&self) {
        let mut state = lock(&self.state);
        if !state.destroyed {
            state.destroyed = true;
            state.listeners.clear();
            state.calls.push(EngineCall::Destroy);
        }
    }
}
