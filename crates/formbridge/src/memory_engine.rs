//! In-memory [`FormEngine`].
//!
//! Builds a render tree from a [`FormSchema`], keeps the `Arc` of every node
//! whose content did not change, and evaluates `show_when` conditions as its
//! only derived state. Each write call emits an immediate event per changed
//! path followed by one computed event; schema swaps and resets are
//! host-initiated and emit nothing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use formbridge_api::path::{is_within, join};
use formbridge_api::{
    ChangeEvent, ChangeListener, ChangePhase, ComputedState, EngineError, EngineFactory,
    FieldError, FieldSchema, FormEngine, FormSchema, NodeType, RenderNode, Unsubscribe,
    ValidationResult, Value,
};

use crate::lock;

/// Component name of the node wrapping each list row.
pub const ROW_COMPONENT: &str = "Row";

struct EngineState {
    schema: FormSchema,
    initial: Value,
    model: Arc<Value>,
    tree: Arc<RenderNode>,
    listeners: BTreeMap<u64, ChangeListener>,
    next_id: u64,
    destroyed: bool,
}

impl EngineState {
    fn live(&self) -> Result<(), EngineError> {
        if self.destroyed {
            Err(EngineError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn listeners(&self) -> Vec<ChangeListener> {
        self.listeners.values().cloned().collect()
    }

    /// Install a new model and rebuild the tree against the previous one.
    fn commit(&mut self, model: Value) {
        self.model = Arc::new(model);
        self.tree = build_tree(&self.schema, &self.model, Some(&self.tree));
    }
}

pub struct MemoryEngine {
    state: Arc<Mutex<EngineState>>,
}

/// [`EngineFactory`] producing [`MemoryEngine`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryEngineFactory;

impl EngineFactory for MemoryEngineFactory {
    fn create(
        &self,
        schema: FormSchema,
        initial_model: Option<Value>,
    ) -> Result<Arc<dyn FormEngine>, EngineError> {
        Ok(MemoryEngine::new(schema, initial_model)? as Arc<dyn FormEngine>)
    }
}

impl MemoryEngine {
    pub fn new(schema: FormSchema, initial_model: Option<Value>) -> Result<Arc<Self>, EngineError> {
        let mut model = initial_model.unwrap_or_else(Value::empty_object);
        if !matches!(model, Value::Object(_)) {
            return Err(EngineError::Schema {
                message: format!("initial model must be an object, got {}", model.type_name()),
            });
        }
        apply_defaults(&schema.fields, "", &mut model)?;
        let model = Arc::new(model);
        let tree = build_tree(&schema, &model, None);
        Ok(Arc::new(Self {
            state: Arc::new(Mutex::new(EngineState {
                schema,
                initial: (*model).clone(),
                model,
                tree,
                listeners: BTreeMap::new(),
                next_id: 0,
                destroyed: false,
            })),
        }))
    }

    pub fn factory() -> MemoryEngineFactory {
        MemoryEngineFactory
    }

    fn emit(listeners: &[ChangeListener], events: &[ChangeEvent]) {
        for event in events {
            for listener in listeners {
                listener(event);
            }
        }
    }

    /// Apply `f` to the list at `path` (created when missing) and emit a
    /// structure change.
    fn mutate_list(
        &self,
        path: &str,
        f: impl FnOnce(&mut Vec<Value>) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let listeners = {
            let mut state = lock(&self.state);
            state.live()?;
            let mut model = (*state.model).clone();
            if model.get_path(path).is_none() {
                model.set_path(path, Some(Value::Array(Vec::new())))?;
            }
            match model.get_path_mut(path) {
                Some(Value::Array(items)) => f(items)?,
                _ => {
                    return Err(EngineError::NotAList {
                        path: path.to_string(),
                    })
                }
            }
            state.commit(model);
            state.listeners()
        };
        Self::emit(
            &listeners,
            &[
                ChangeEvent::structure(path, Some(ChangePhase::Immediate)),
                ChangeEvent::structure(path, Some(ChangePhase::Computed)),
            ],
        );
        Ok(())
    }
}

fn out_of_range(path: &str, index: usize, len: usize) -> EngineError {
    EngineError::IndexOutOfRange {
        path: path.to_string(),
        index,
        len,
    }
}

fn apply_defaults(fields: &[FieldSchema], parent: &str, model: &mut Value) -> Result<(), EngineError> {
    for field in fields {
        let path = join(parent, &field.field);
        match field.node_type {
            NodeType::Field => {
                if let Some(default) = &field.default_value {
                    if model.get_path(&path).is_none() {
                        model.set_path(&path, Some(default.clone()))?;
                    }
                }
            }
            NodeType::Layout => apply_defaults(&field.children, &path, model)?,
            // row templates get their defaults when rows are added by the host
            NodeType::List => {}
        }
    }
    Ok(())
}

fn build_tree(schema: &FormSchema, model: &Value, prev: Option<&Arc<RenderNode>>) -> Arc<RenderNode> {
    let children = schema
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| build_node(field, "", model, prev_child(prev, i)))
        .collect();
    reuse_or_new(
        prev,
        RenderNode {
            path: String::new(),
            component: schema.component.clone(),
            props: Default::default(),
            computed: ComputedState::default(),
            children,
        },
    )
}

fn prev_child(prev: Option<&Arc<RenderNode>>, index: usize) -> Option<&Arc<RenderNode>> {
    prev.and_then(|p| p.children.get(index))
}

fn build_node(
    field: &FieldSchema,
    parent: &str,
    model: &Value,
    prev: Option<&Arc<RenderNode>>,
) -> Arc<RenderNode> {
    let path = join(parent, &field.field);
    let if_show = field
        .show_when
        .as_ref()
        .map(|c| model.get_path(&c.path) == Some(&c.equals))
        .unwrap_or(true);
    let computed = ComputedState {
        show: true,
        if_show,
        disabled: field.disabled,
        readonly: field.readonly,
        required: field.required,
    };

    let children = match field.node_type {
        NodeType::Field => Vec::new(),
        NodeType::Layout => field
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| build_node(child, &path, model, prev_child(prev, i)))
            .collect(),
        NodeType::List => {
            let rows = model
                .get_path(&path)
                .and_then(Value::as_array)
                .map(|items| items.len())
                .unwrap_or(0);
            (0..rows)
                .map(|row| {
                    let row_path = join(&path, &row.to_string());
                    let prev_row = prev_child(prev, row);
                    let cells = field
                        .children
                        .iter()
                        .enumerate()
                        .map(|(i, cell)| build_node(cell, &row_path, model, prev_child(prev_row, i)))
                        .collect();
                    reuse_or_new(
                        prev_row,
                        RenderNode {
                            path: row_path,
                            component: ROW_COMPONENT.to_string(),
                            props: Default::default(),
                            computed: ComputedState::default(),
                            children: cells,
                        },
                    )
                })
                .collect()
        }
    };

    reuse_or_new(
        prev,
        RenderNode {
            path,
            component: field.component.clone(),
            props: field.props.clone(),
            computed,
            children,
        },
    )
}

/// Keep `prev` when `node` has identical content and reused children.
fn reuse_or_new(prev: Option<&Arc<RenderNode>>, node: RenderNode) -> Arc<RenderNode> {
    if let Some(prev) = prev {
        let same = prev.path == node.path
            && prev.component == node.component
            && prev.props == node.props
            && prev.computed == node.computed
            && prev.children.len() == node.children.len()
            && prev
                .children
                .iter()
                .zip(&node.children)
                .all(|(a, b)| Arc::ptr_eq(a, b));
        if same {
            return Arc::clone(prev);
        }
    }
    Arc::new(node)
}

fn collect_required(node: &RenderNode, model: &Value, errors: &mut Vec<FieldError>) {
    if !node.computed.is_visible() {
        return;
    }
    if node.computed.required && model.get_path(&node.path).map_or(true, Value::is_blank) {
        errors.push(FieldError {
            path: node.path.clone(),
            message: "required".to_string(),
        });
    }
    for child in &node.children {
        collect_required(child, model, errors);
    }
}

impl FormEngine for MemoryEngine {
    fn get_value(&self, path: Option<&str>) -> Option<Value> {
        lock(&self.state)
            .model
            .get_path(path.unwrap_or(""))
            .cloned()
    }

    fn value_model(&self) -> Arc<Value> {
        Arc::clone(&lock(&self.state).model)
    }

    fn render_tree(&self) -> Arc<RenderNode> {
        Arc::clone(&lock(&self.state).tree)
    }

    fn update_value(&self, path: &str, value: Option<Value>) -> Result<(), EngineError> {
        let (listeners, prev) = {
            let mut state = lock(&self.state);
            state.live()?;
            let prev = state.model.get_path(path).cloned();
            if prev == value {
                return Ok(());
            }
            let mut model = (*state.model).clone();
            model.set_path(path, value.clone())?;
            state.commit(model);
            (state.listeners(), prev)
        };
        Self::emit(
            &listeners,
            &[
                ChangeEvent::value(path, Some(ChangePhase::Immediate))
                    .with_values(prev.clone(), value.clone()),
                ChangeEvent::value(path, Some(ChangePhase::Computed)).with_values(prev, value),
            ],
        );
        Ok(())
    }

    fn update_values(&self, updates: Vec<(String, Option<Value>)>) -> Result<(), EngineError> {
        let (listeners, mut events) = {
            let mut state = lock(&self.state);
            state.live()?;
            let mut model = (*state.model).clone();
            let mut events = Vec::new();
            for (path, value) in updates {
                let prev = model.get_path(&path).cloned();
                if prev == value {
                    continue;
                }
                model.set_path(&path, value.clone())?;
                events.push(
                    ChangeEvent::value(path, Some(ChangePhase::Immediate)).with_values(prev, value),
                );
            }
            if events.is_empty() {
                return Ok(());
            }
            state.commit(model);
            (state.listeners(), events)
        };
        debug!("Applied aggregate write of {} path(s)", events.len());
        events.push(ChangeEvent::value("", Some(ChangePhase::Computed)));
        Self::emit(&listeners, &events);
        Ok(())
    }

    fn on_value_change(&self, listener: ChangeListener) -> Unsubscribe {
        let id = {
            let mut state = lock(&self.state);
            if state.destroyed {
                return Unsubscribe::noop();
            }
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

    fn set_form_schema(&self, schema: FormSchema) -> Result<(), EngineError> {
        let mut state = lock(&self.state);
        state.live()?;
        let mut model = (*state.model).clone();
        apply_defaults(&schema.fields, "", &mut model)?;
        state.schema = schema;
        state.commit(model);
        Ok(())
    }

    fn reset(&self, target: Option<&str>) -> Result<(), EngineError> {
        let mut state = lock(&self.state);
        state.live()?;
        let model = match target {
            None => state.initial.clone(),
            Some(path) => {
                let mut model = (*state.model).clone();
                model.set_path(path, state.initial.get_path(path).cloned())?;
                model
            }
        };
        state.commit(model);
        Ok(())
    }

    fn validate(&self, paths: Option<&[String]>) -> ValidationResult {
        let state = lock(&self.state);
        let mut errors = Vec::new();
        collect_required(&state.tree, &state.model, &mut errors);
        if let Some(paths) = paths {
            errors.retain(|e| paths.iter().any(|p| is_within(&e.path, p)));
        }
        ValidationResult { errors }
    }

    fn list_append(&self, path: &str, row: Value) -> Result<(), EngineError> {
        self.mutate_list(path, |items| {
            items.push(row);
            Ok(())
        })
    }

    fn list_insert(&self, path: &str, index: usize, row: Value) -> Result<(), EngineError> {
        self.mutate_list(path, |items| {
            if index > items.len() {
                return Err(out_of_range(path, index, items.len()));
            }
            items.insert(index, row);
            Ok(())
        })
    }

    fn list_remove(&self, path: &str, index: usize) -> Result<(), EngineError> {
        self.mutate_list(path, |items| {
            if index >= items.len() {
                return Err(out_of_range(path, index, items.len()));
            }
            items.remove(index);
            Ok(())
        })
    }

    fn list_move(&self, path: &str, from: usize, to: usize) -> Result<(), EngineError> {
        self.mutate_list(path, |items| {
            let len = items.len();
            if from >= len || to >= len {
                return Err(out_of_range(path, from.max(to), len));
            }
            let row = items.remove(from);
            items.insert(to, row);
            Ok(())
        })
    }

    fn list_swap(&self, path: &str, a: usize, b: usize) -> Result<(), EngineError> {
        self.mutate_list(path, |items| {
            let len = items.len();
            if a >= len || b >= len {
                return Err(out_of_range(path, a.max(b), len));
            }
            items.swap(a, b);
            Ok(())
        })
    }

    fn list_replace(&self, path: &str, index: usize, row: Value) -> Result<(), EngineError> {
        self.mutate_list(path, |items| {
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or_else(|| out_of_range(path, index, len))?;
            *slot = row;
            Ok(())
        })
    }

    fn list_clear(&self, path: &str) -> Result<(), EngineError> {
        self.mutate_list(path, |items| {
            items.clear();
            Ok(())
        })
    }

    fn destroy(&self) {
        let mut state = lock(&self.state);
        state.destroyed = true;
        state.listeners.clear();
    }
}
