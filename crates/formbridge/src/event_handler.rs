//! UI-originated interaction events.
//!
//! The handler turns widget events into engine writes: it resolves the
//! component, converts the widget value with the component's transformer and
//! routes the result either straight to the engine or through a batcher.
//! List events always flush pending writes first so rows are added, removed
//! or moved against an up-to-date model.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, warn};

use formbridge_api::Value;
use formbridge_core::{CanonicalEvent, ComponentDefinition, EventMapping, TransformError};

use crate::batcher::{PendingUpdate, UpdateBatcher};
use crate::state_engine::StateEngine;
use crate::{lock, BridgeError, Result};

/// Where field writes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRouting {
    /// Straight to the engine
    Direct,
    /// Through the bridge's batcher (direct if the bridge has none)
    Shared,
    /// Through a batcher owned by this handler, with its own window
    Owned(Duration),
}

/// What became of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Written to the engine
    Written,
    /// Queued in a batcher
    Queued,
    /// Dropped because the value could not be transformed
    Suppressed,
    /// Nothing to write (destroyed, unmapped event, focus/blur)
    Ignored,
}

/// A transform failure, as handed to the error reporter.
#[derive(Debug, Clone)]
pub struct TransformFailure {
    pub error: TransformError,
    pub path: String,
    pub value: Option<Value>,
}

pub type ErrorReporter = Arc<dyn Fn(&TransformFailure) + Send + Sync>;

/// Focus/blur hook, called with `(path, component_name)`.
pub type FieldHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

fn log_reporter() -> ErrorReporter {
    Arc::new(|failure: &TransformFailure| {
        warn!(
            "Transform failed at '{}': {} (value: {:?})",
            failure.path, failure.error, failure.value
        );
    })
}

enum Route {
    Direct,
    Batched { batcher: UpdateBatcher, owned: bool },
}

#[derive(Default)]
struct Hooks {
    focus: Vec<FieldHook>,
    blur: Vec<FieldHook>,
}

pub struct EventHandler {
    bridge: StateEngine,
    route: Route,
    reporter: ErrorReporter,
    hooks: Mutex<Hooks>,
    destroyed: AtomicBool,
}

impl EventHandler {
    pub fn new(bridge: StateEngine, routing: BatchRouting) -> Self {
        let route = match routing {
            BatchRouting::Direct => Route::Direct,
            BatchRouting::Shared => match bridge.batcher() {
                Some(batcher) => Route::Batched {
                    batcher: batcher.clone(),
                    owned: false,
                },
                None => {
                    debug!("Bridge has batching disabled; handler writes directly");
                    Route::Direct
                }
            },
            BatchRouting::Owned(delay) => {
                let target = bridge.clone();
                let batcher = UpdateBatcher::new(
                    delay,
                    Arc::new(move |updates: Vec<PendingUpdate>| -> Result<()> {
                        target.update_values(updates.into_iter().map(Into::into).collect())
                    }),
                );
                bridge.tie_batcher(&batcher);
                Route::Batched {
                    batcher,
                    owned: true,
                }
            }
        };
        Self {
            bridge,
            route,
            reporter: log_reporter(),
            hooks: Mutex::new(Hooks::default()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Handler sharing the bridge's batcher when batching is enabled.
    pub fn for_bridge(bridge: &StateEngine) -> Self {
        Self::new(bridge.clone(), BatchRouting::Shared)
    }

    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn on_focus(&self, hook: impl Fn(&str, &str) + Send + Sync + 'static) {
        lock(&self.hooks).focus.push(Arc::new(hook));
    }

    pub fn on_blur(&self, hook: impl Fn(&str, &str) + Send + Sync + 'static) {
        lock(&self.hooks).blur.push(Arc::new(hook));
    }

    fn is_live(&self, operation: &str) -> bool {
        if self.destroyed.load(Ordering::SeqCst) || self.bridge.is_destroyed() {
            warn!("Ignoring {} on a destroyed event handler", operation);
            return false;
        }
        true
    }

    fn definition(&self, component_name: &str) -> Option<&ComponentDefinition> {
        self.bridge.registry().get(component_name)
    }

    fn report(&self, error: TransformError, path: &str, value: Option<Value>) {
        let failure = TransformFailure {
            error,
            path: path.to_string(),
            value,
        };
        if catch_unwind(AssertUnwindSafe(|| (self.reporter)(&failure))).is_err() {
            error!("Error reporter panicked");
        }
    }

    /// Widget value changed.
    pub fn handle_field_change(
        &self,
        path: &str,
        raw: Value,
        component_name: &str,
    ) -> Result<ChangeOutcome> {
        if !self.is_live("field change") {
            return Ok(ChangeOutcome::Ignored);
        }
        let value = match self.definition(component_name) {
            None => {
                warn!(
                    "Unknown component '{}' at '{}'; writing raw value",
                    component_name, path
                );
                Some(raw)
            }
            Some(definition) => match definition.value_transformer() {
                None => Some(raw),
                Some(transformer) => match transformer.from_component(raw.clone()) {
                    Ok(value) => value,
                    Err(error) => {
                        self.report(error, path, Some(raw));
                        return Ok(ChangeOutcome::Suppressed);
                    }
                },
            },
        };
        self.write(path, value)
    }

    fn write(&self, path: &str, value: Option<Value>) -> Result<ChangeOutcome> {
        match &self.route {
            Route::Direct => {
                debug!("Writing '{}' directly", path);
                self.bridge.update_value(path, value)?;
                Ok(ChangeOutcome::Written)
            }
            Route::Batched { batcher, .. } => {
                if batcher.add(path, value) {
                    Ok(ChangeOutcome::Queued)
                } else {
                    Ok(ChangeOutcome::Ignored)
                }
            }
        }
    }

    pub fn handle_field_focus(&self, path: &str, component_name: &str) {
        if self.is_live("focus") {
            let hooks = lock(&self.hooks).focus.clone();
            run_hooks(&hooks, path, component_name);
        }
    }

    pub fn handle_field_blur(&self, path: &str, component_name: &str) {
        if self.is_live("blur") {
            let hooks = lock(&self.hooks).blur.clone();
            run_hooks(&hooks, path, component_name);
        }
    }

    /// Append a row (an empty object when `initial_row` is `None`).
    pub fn handle_list_add(&self, path: &str, initial_row: Option<Value>) -> Result<()> {
        if !self.is_live("list add") {
            return Ok(());
        }
        self.flush()?;
        self.bridge
            .list_operator(path)
            .append(initial_row.unwrap_or_else(Value::empty_object))
    }

    pub fn handle_list_remove(&self, path: &str, index: usize) -> Result<()> {
        if !self.is_live("list remove") {
            return Ok(());
        }
        self.flush()?;
        self.bridge.list_operator(path).remove(index)
    }

    pub fn handle_list_move(&self, path: &str, from: usize, to: usize) -> Result<()> {
        if !self.is_live("list move") {
            return Ok(());
        }
        self.flush()?;
        self.bridge.list_operator(path).move_item(from, to)
    }

    /// Route a native event through the component's event mapping.
    ///
    /// Payloads: the widget value for change; the row (or nothing) for
    /// list add; an index for list remove; `{from, to}` or `[from, to]` for
    /// list move. Focus and blur ignore the payload.
    pub fn dispatch(
        &self,
        path: &str,
        native_event: &str,
        payload: Value,
        component_name: &str,
    ) -> Result<ChangeOutcome> {
        let default_mapping = EventMapping::new();
        let mapping = self
            .definition(component_name)
            .and_then(|d| d.event_mapping())
            .unwrap_or(&default_mapping);
        let Some(event) = mapping.canonical_for(native_event) else {
            debug!(
                "'{}' on '{}' has no canonical mapping",
                native_event, component_name
            );
            return Ok(ChangeOutcome::Ignored);
        };

        match event {
            CanonicalEvent::Change => self.handle_field_change(path, payload, component_name),
            CanonicalEvent::Focus => {
                self.handle_field_focus(path, component_name);
                Ok(ChangeOutcome::Ignored)
            }
            CanonicalEvent::Blur => {
                self.handle_field_blur(path, component_name);
                Ok(ChangeOutcome::Ignored)
            }
            CanonicalEvent::ListAdd => {
                let row = (!payload.is_null()).then_some(payload);
                self.handle_list_add(path, row)?;
                Ok(ChangeOutcome::Written)
            }
            CanonicalEvent::ListRemove => {
                let index = payload_index(event, &payload)?;
                self.handle_list_remove(path, index)?;
                Ok(ChangeOutcome::Written)
            }
            CanonicalEvent::ListMove => {
                let (from, to) = payload_move(event, &payload)?;
                self.handle_list_move(path, from, to)?;
                Ok(ChangeOutcome::Written)
            }
        }
    }

    /// Engine value at `path`, converted for display by `component_name`.
    ///
    /// `None` when there is nothing to show: no value and no transformer, or
    /// a transform failure (reported, render suppressed).
    pub fn component_value(&self, path: &str, component_name: &str) -> Option<Value> {
        let value = self.bridge.get_value(Some(path));
        let Some(definition) = self.definition(component_name) else {
            warn!("Unknown component '{}' at '{}'", component_name, path);
            return value;
        };
        match definition.value_transformer() {
            None => value,
            Some(transformer) => match transformer.to_component(value.as_ref()) {
                Ok(shown) => Some(shown),
                Err(error) => {
                    self.report(error, path, value);
                    None
                }
            },
        }
    }

    pub fn flush(&self) -> Result<()> {
        match &self.route {
            Route::Direct => Ok(()),
            Route::Batched { batcher, .. } => batcher.flush(),
        }
    }

    /// The batcher writes go through, if any.
    pub fn batcher(&self) -> Option<&UpdateBatcher> {
        match &self.route {
            Route::Direct => None,
            Route::Batched { batcher, .. } => Some(batcher),
        }
    }

    pub async fn wait_flush(&self) {
        if let Route::Batched { batcher, .. } = &self.route {
            batcher.wait_flush().await;
        }
    }

    /// Idempotent. Disposes an owned batcher; a shared one belongs to the bridge.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Route::Batched {
            batcher,
            owned: true,
        } = &self.route
        {
            batcher.dispose();
        }
        let mut hooks = lock(&self.hooks);
        hooks.focus.clear();
        hooks.blur.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

fn run_hooks(hooks: &[FieldHook], path: &str, component_name: &str) {
    for hook in hooks {
        if catch_unwind(AssertUnwindSafe(|| hook(path, component_name))).is_err() {
            error!("Field hook panicked");
        }
    }
}

/// Non-negative integers only; `2.0` passes, `1.7` and NaN do not.
fn as_index(value: &Value) -> Option<usize> {
    match value {
        Value::Integer(i) => usize::try_from(*i).ok(),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 && *f >= 0.0 => {
            usize::try_from(*f as u64).ok()
        }
        _ => None,
    }
}

fn invalid_payload(event: CanonicalEvent, message: &str) -> BridgeError {
    BridgeError::InvalidPayload {
        event: event.to_string(),
        message: message.to_string(),
    }
}

fn payload_index(event: CanonicalEvent, payload: &Value) -> Result<usize> {
    as_index(payload)
        .or_else(|| payload.get_path("index").and_then(as_index))
        .ok_or_else(|| invalid_payload(event, "expected a non-negative index"))
}

fn payload_move(event: CanonicalEvent, payload: &Value) -> Result<(usize, usize)> {
    let pair = match payload {
        Value::Array(items) if items.len() == 2 => as_index(&items[0]).zip(as_index(&items[1])),
        Value::Object(_) => payload
            .get_path("from")
            .and_then(as_index)
            .zip(payload.get_path("to").and_then(as_index)),
        _ => None,
    };
    pair.ok_or_else(|| invalid_payload(event, "expected {from, to} or [from, to]"))
}
