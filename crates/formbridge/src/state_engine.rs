//! The reactive bridge.
//!
//! A [`StateEngine`] owns exactly one form engine and mirrors its settled
//! snapshot. Pull-based runtimes read it through [`StateEngine::snapshot`] and
//! [`StateEngine::subscribe`]; push-based runtimes attach a
//! [`SnapshotSink`]; async consumers take a [`StateEngine::snapshots`] stream.
//!
//! Only computed-phase (or untagged) change events refresh the mirror. The
//! references handed out are the engine's own, so `Arc::ptr_eq` on two
//! snapshots tells whether anything changed.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, warn};

use formbridge_api::{
    ChangeEvent, EngineFactory, FormEngine, FormSchema, Snapshot, Unsubscribe, ValidationResult,
    Value,
};
use formbridge_core::{ComponentDefinition, ComponentRegistry};

use crate::batcher::{PendingUpdate, UpdateBatcher, WeakBatcher};
use crate::config::BridgeConfig;
use crate::list_operator::ListOperator;
use crate::runtime::SnapshotSink;
use crate::{lock, Result};

pub type SnapshotListener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

struct Mirror {
    current: Snapshot,
    listeners: BTreeMap<u64, SnapshotListener>,
    sinks: BTreeMap<u64, Arc<dyn SnapshotSink>>,
    next_id: u64,
    /// Bumped on every refresh; a pass stops delivering once it is stale
    generation: u64,
    /// Handler-owned batchers writing to this bridge, disposed with it
    dependents: Vec<WeakBatcher>,
    engine_subscription: Option<Unsubscribe>,
    stream_tx: Option<watch::Sender<Snapshot>>,
}

impl Mirror {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

struct Inner {
    engine: Arc<dyn FormEngine>,
    registry: ComponentRegistry,
    config: BridgeConfig,
    batcher: Option<UpdateBatcher>,
    destroyed: AtomicBool,
    mirror: Mutex<Mirror>,
}

/// Bridge between one form engine and the host runtime. Cloning shares it.
#[derive(Clone)]
pub struct StateEngine {
    inner: Arc<Inner>,
}

impl StateEngine {
    pub fn new(
        schema: FormSchema,
        initial_model: Option<Value>,
        factory: &dyn EngineFactory,
        registry: ComponentRegistry,
        config: BridgeConfig,
    ) -> Result<Self> {
        let engine = factory.create(schema, initial_model)?;
        let current = Snapshot::new(engine.render_tree(), engine.value_model());

        let batcher = config.batch.enabled.then(|| {
            let target = Arc::clone(&engine);
            UpdateBatcher::new(
                config.batch.delay(),
                Arc::new(move |updates: Vec<PendingUpdate>| -> Result<()> {
                    target.update_values(updates.into_iter().map(Into::into).collect())?;
                    Ok(())
                }),
            )
        });

        let (stream_tx, _) = watch::channel(current.clone());
        let inner = Arc::new(Inner {
            engine,
            registry,
            config,
            batcher,
            destroyed: AtomicBool::new(false),
            mirror: Mutex::new(Mirror {
                current,
                listeners: BTreeMap::new(),
                sinks: BTreeMap::new(),
                next_id: 0,
                generation: 0,
                dependents: Vec::new(),
                engine_subscription: None,
                stream_tx: Some(stream_tx),
            }),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let subscription = inner.engine.on_value_change(Arc::new(move |event: &ChangeEvent| {
            if let Some(inner) = weak.upgrade() {
                StateEngine { inner }.handle_change(event);
            }
        }));
        lock(&inner.mirror).engine_subscription = Some(subscription);

        debug!(
            "Bridge created ({} registered components, batching {})",
            inner.registry.len(),
            if inner.batcher.is_some() { "on" } else { "off" }
        );
        Ok(Self { inner })
    }

    fn handle_change(&self, event: &ChangeEvent) {
        if self.is_destroyed() {
            return;
        }
        if !event.is_settled() {
            debug!("Skipping immediate change at '{}'", event.path);
            return;
        }
        self.refresh();
    }

    /// Re-read the engine, replace the mirror, push to sinks, then notify.
    ///
    /// A write from inside a sink or listener runs a nested refresh that
    /// delivers the newer snapshot to everyone; the outer pass then stops so
    /// nobody after the writer is handed the older one.
    fn refresh(&self) {
        let snapshot = Snapshot::new(
            self.inner.engine.render_tree(),
            self.inner.engine.value_model(),
        );
        let (generation, sinks, listeners) = {
            let mut mirror = lock(&self.inner.mirror);
            mirror.generation = mirror.generation.wrapping_add(1);
            mirror.current = snapshot.clone();
            if let Some(tx) = &mirror.stream_tx {
                tx.send_replace(snapshot.clone());
            }
            (
                mirror.generation,
                mirror.sinks.values().cloned().collect::<Vec<_>>(),
                mirror.listeners.values().cloned().collect::<Vec<_>>(),
            )
        };

        for sink in sinks {
            if catch_unwind(AssertUnwindSafe(|| sink.store(&snapshot))).is_err() {
                error!("Snapshot sink panicked");
            }
            if self.superseded(generation) {
                return;
            }
        }
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&snapshot))).is_err() {
                error!("Snapshot listener panicked");
            }
            if self.superseded(generation) {
                return;
            }
        }
    }

    fn superseded(&self, generation: u64) -> bool {
        if self.is_destroyed() {
            return true;
        }
        let current = lock(&self.inner.mirror).generation;
        if current != generation {
            debug!("Refresh superseded by a nested write");
            return true;
        }
        false
    }

    fn is_live(&self, operation: &str) -> bool {
        if self.is_destroyed() {
            warn!("Ignoring {} on a destroyed bridge", operation);
            return false;
        }
        true
    }

    /// Current settled snapshot.
    pub fn snapshot(&self) -> Snapshot {
        lock(&self.inner.mirror).current.clone()
    }

    /// Called synchronously after every refresh, in subscription order.
    pub fn subscribe(&self, listener: impl Fn(&Snapshot) + Send + Sync + 'static) -> Unsubscribe {
        if !self.is_live("subscribe") {
            return Unsubscribe::noop();
        }
        let id = {
            let mut mirror = lock(&self.inner.mirror);
            let id = mirror.next_id();
            mirror.listeners.insert(id, Arc::new(listener));
            id
        };
        let weak = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.mirror).listeners.remove(&id);
            }
        })
    }

    /// Push the current snapshot into `sink` now and on every refresh.
    pub fn attach_sink(&self, sink: Arc<dyn SnapshotSink>) -> Unsubscribe {
        if !self.is_live("attach_sink") {
            return Unsubscribe::noop();
        }
        let (id, current) = {
            let mut mirror = lock(&self.inner.mirror);
            let id = mirror.next_id();
            mirror.sinks.insert(id, Arc::clone(&sink));
            (id, mirror.current.clone())
        };
        sink.store(&current);
        let weak = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.mirror).sinks.remove(&id);
            }
        })
    }

    /// Stream of settled snapshots, starting with the current one. Ends when
    /// the bridge is destroyed.
    pub fn snapshots(&self) -> WatchStream<Snapshot> {
        let mirror = lock(&self.inner.mirror);
        match &mirror.stream_tx {
            Some(tx) => WatchStream::new(tx.subscribe()),
            None => {
                // destroyed: a stream that yields the final snapshot and ends
                let (tx, rx) = watch::channel(mirror.current.clone());
                drop(tx);
                WatchStream::new(rx)
            }
        }
    }

    pub fn get_value(&self, path: Option<&str>) -> Option<Value> {
        if self.is_destroyed() {
            return self
                .snapshot()
                .value_model
                .get_path(path.unwrap_or(""))
                .cloned();
        }
        self.inner.engine.get_value(path)
    }

    pub fn update_value(&self, path: &str, value: Option<Value>) -> Result<()> {
        if !self.is_live("update_value") {
            return Ok(());
        }
        self.inner.engine.update_value(path, value)?;
        Ok(())
    }

    pub fn update_values(&self, updates: Vec<(String, Option<Value>)>) -> Result<()> {
        if !self.is_live("update_values") {
            return Ok(());
        }
        self.inner.engine.update_values(updates)?;
        Ok(())
    }

    /// Write through the batcher, or directly when batching is disabled.
    pub fn queue_update(&self, path: &str, value: Option<Value>) -> Result<()> {
        if !self.is_live("queue_update") {
            return Ok(());
        }
        match &self.inner.batcher {
            Some(batcher) => {
                batcher.add(path, value);
                Ok(())
            }
            None => self.update_value(path, value),
        }
    }

    /// Pending batched writes are applied first, then the schema is swapped
    /// and listeners are notified.
    pub fn set_form_schema(&self, schema: FormSchema) -> Result<()> {
        if !self.is_live("set_form_schema") {
            return Ok(());
        }
        self.flush()?;
        self.inner.engine.set_form_schema(schema)?;
        self.refresh();
        Ok(())
    }

    pub fn reset(&self, target: Option<&str>) -> Result<()> {
        if !self.is_live("reset") {
            return Ok(());
        }
        self.flush()?;
        self.inner.engine.reset(target)?;
        self.refresh();
        Ok(())
    }

    pub fn validate(&self, paths: Option<&[String]>) -> ValidationResult {
        if !self.is_live("validate") {
            return ValidationResult::default();
        }
        if let Err(e) = self.flush() {
            warn!("Validating after a failed batched write: {}", e);
        }
        self.inner.engine.validate(paths)
    }

    pub fn list_operator(&self, path: impl Into<String>) -> ListOperator {
        ListOperator::new(self.clone(), path.into())
    }

    pub(crate) fn list_append(&self, path: &str, row: Value) -> Result<()> {
        if self.is_live("list_append") {
            self.inner.engine.list_append(path, row)?;
        }
        Ok(())
    }

    pub(crate) fn list_insert(&self, path: &str, index: usize, row: Value) -> Result<()> {
        if self.is_live("list_insert") {
            self.inner.engine.list_insert(path, index, row)?;
        }
        Ok(())
    }

    pub(crate) fn list_remove(&self, path: &str, index: usize) -> Result<()> {
        if self.is_live("list_remove") {
            self.inner.engine.list_remove(path, index)?;
        }
        Ok(())
    }

    pub(crate) fn list_move(&self, path: &str, from: usize, to: usize) -> Result<()> {
        if self.is_live("list_move") {
            self.inner.engine.list_move(path, from, to)?;
        }
        Ok(())
    }

    pub(crate) fn list_swap(&self, path: &str, a: usize, b: usize) -> Result<()> {
        if self.is_live("list_swap") {
            self.inner.engine.list_swap(path, a, b)?;
        }
        Ok(())
    }

    pub(crate) fn list_replace(&self, path: &str, index: usize, row: Value) -> Result<()> {
        if self.is_live("list_replace") {
            self.inner.engine.list_replace(path, index, row)?;
        }
        Ok(())
    }

    pub(crate) fn list_clear(&self, path: &str) -> Result<()> {
        if self.is_live("list_clear") {
            self.inner.engine.list_clear(path)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        match &self.inner.batcher {
            Some(batcher) => batcher.flush(),
            None => Ok(()),
        }
    }

    pub async fn wait_flush(&self) {
        if let Some(batcher) = &self.inner.batcher {
            batcher.wait_flush().await;
        }
    }

    /// Dispose `batcher` when this bridge is destroyed (right away if it
    /// already is).
    pub(crate) fn tie_batcher(&self, batcher: &UpdateBatcher) {
        {
            let mut mirror = lock(&self.inner.mirror);
            if !self.is_destroyed() {
                mirror.dependents.retain(|weak| weak.upgrade().is_some());
                mirror.dependents.push(batcher.downgrade());
                return;
            }
        }
        batcher.dispose();
    }

    pub fn batcher(&self) -> Option<&UpdateBatcher> {
        self.inner.batcher.as_ref()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.inner.registry
    }

    pub fn resolve_component(&self, name: &str) -> Option<&ComponentDefinition> {
        let definition = self.inner.registry.get(name);
        if definition.is_none() {
            warn!("No component registered as '{}'", name);
        }
        definition
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Idempotent teardown.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(batcher) = &self.inner.batcher {
            batcher.dispose();
        }
        let (subscription, dependents) = {
            let mut mirror = lock(&self.inner.mirror);
            mirror.listeners.clear();
            mirror.sinks.clear();
            mirror.stream_tx = None;
            (
                mirror.engine_subscription.take(),
                std::mem::take(&mut mirror.dependents),
            )
        };
        for batcher in dependents.iter().filter_map(WeakBatcher::upgrade) {
            batcher.dispose();
        }
        if let Some(mut subscription) = subscription {
            subscription.unsubscribe();
        }
        self.inner.engine.destroy();
        debug!("Bridge destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::memory_engine::MemoryEngine;
    use crate::runtime::ExternalStore;
    use crate::testing::{EngineCall, RecordingEngine};
    use formbridge_api::{ChangePhase, EngineError, FieldSchema, RenderNode};
    use std::sync::atomic::AtomicUsize;
    use tokio_stream::StreamExt;

    fn bridge_over(engine: &Arc<RecordingEngine>, batch: BatchConfig) -> StateEngine {
        StateEngine::new(
            FormSchema::new(Vec::new()),
            None,
            &engine.factory(),
            ComponentRegistry::new(),
            BridgeConfig {
                batch,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn counter(bridge: &StateEngine) -> (Arc<AtomicUsize>, Unsubscribe) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = bridge.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, handle)
    }

    #[test]
    fn test_immediate_events_are_ignored() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        let before = bridge.snapshot();
        let (count, _sub) = counter(&bridge);

        engine.set_model(Value::from(serde_json::json!({"a": 1})));
        engine.emit(&ChangeEvent::value("a", Some(ChangePhase::Immediate)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(bridge.snapshot().ptr_eq(&before));

        engine.emit(&ChangeEvent::value("a", Some(ChangePhase::Computed)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&bridge.snapshot().value_model, &engine.value_model()));
    }

    #[test]
    fn test_untagged_event_refreshes() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        let (count, _sub) = counter(&bridge);
        engine.emit(&ChangeEvent::structure("items", None));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_references_pass_through() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        let before = bridge.snapshot();
        engine.emit(&ChangeEvent::value("a", Some(ChangePhase::Computed)));
        assert!(bridge.snapshot().ptr_eq(&before));

        engine.set_render_tree(Arc::new(RenderNode::new("", "Other")));
        engine.emit(&ChangeEvent::value("a", None));
        let after = bridge.snapshot();
        assert!(!Arc::ptr_eq(&after.render_tree, &before.render_tree));
        assert!(Arc::ptr_eq(&after.value_model, &before.value_model));
    }

    #[test]
    fn test_listeners_notified_in_order_and_isolated() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        let order = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (order.clone(), order.clone());
        let _first = bridge.subscribe(move |_| a.lock().unwrap().push(1));
        let _bad = bridge.subscribe(|_| panic!("listener failure"));
        let _third = bridge.subscribe(move |_| b.lock().unwrap().push(3));

        engine.emit(&ChangeEvent::value("x", None));
        assert_eq!(*order.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_unsubscribe_during_notification() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));

        let s = slot.clone();
        let first = bridge.subscribe(move |_| {
            if let Some(mut handle) = s.lock().unwrap().take() {
                handle.unsubscribe();
            }
        });
        let c = count.clone();
        let second = bridge.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        *slot.lock().unwrap() = Some(second);

        // already copied for this round
        engine.emit(&ChangeEvent::value("x", None));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        engine.emit(&ChangeEvent::value("x", None));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(first);
    }

    #[test]
    fn test_reentrant_write_from_listener() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        let inner = bridge.clone();
        let _sub = bridge.subscribe(move |snapshot| {
            if snapshot.value("done").is_none() {
                inner
                    .update_value("done", Some(Value::Boolean(true)))
                    .unwrap();
            }
        });
        engine.emit(&ChangeEvent::value("x", None));
        assert_eq!(
            engine.calls(),
            vec![EngineCall::UpdateValue {
                path: "done".to_string(),
                value: Some(Value::Boolean(true)),
            }]
        );
    }

    #[test]
    fn test_write_errors_propagate() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        engine.fail_next_write(EngineError::InvalidPath {
            path: "a.b".to_string(),
        });
        assert!(bridge.update_value("a.b", None).is_err());
    }

    #[test]
    fn test_set_form_schema_refreshes_eagerly() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        let (count, _sub) = counter(&bridge);
        bridge.set_form_schema(FormSchema::new(Vec::new())).unwrap();
        bridge.reset(None).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(
            engine.calls(),
            vec![EngineCall::SetFormSchema, EngineCall::Reset(None)]
        );
    }

    #[test]
    fn test_queue_update_without_batching_writes_directly() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        bridge.queue_update("a", Some(Value::Integer(1))).unwrap();
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_update_batches() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::default());
        bridge.queue_update("a", Some(Value::Integer(1))).unwrap();
        bridge.queue_update("b", Some(Value::Integer(2))).unwrap();
        assert!(engine.calls().is_empty());
        bridge.wait_flush().await;
        assert_eq!(
            engine.calls(),
            vec![EngineCall::UpdateValues(vec![
                ("a".to_string(), Some(Value::Integer(1))),
                ("b".to_string(), Some(Value::Integer(2))),
            ])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_is_idempotent_and_terminal() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::default());
        let (count, _sub) = counter(&bridge);
        bridge.queue_update("a", Some(Value::Integer(1))).unwrap();

        bridge.destroy();
        bridge.destroy();
        assert!(bridge.is_destroyed());
        assert!(engine.is_destroyed());
        assert_eq!(engine.listener_count(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        bridge.update_value("a", Some(Value::Integer(2))).unwrap();
        bridge.list_operator("items").append(Value::empty_object()).unwrap();
        assert!(bridge.validate(None).is_valid());
        engine.emit(&ChangeEvent::value("a", None));

        assert_eq!(engine.calls(), vec![EngineCall::Destroy]);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!bridge.subscribe(|_| {}).is_active());
    }

    #[test]
    fn test_sinks_receive_before_listeners() {
        struct OrderSink(Arc<Mutex<Vec<&'static str>>>);
        impl SnapshotSink for OrderSink {
            fn store(&self, _snapshot: &Snapshot) {
                self.0.lock().unwrap().push("sink");
            }
        }

        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        let order = Arc::new(Mutex::new(Vec::new()));
        let o = order.clone();
        let _sub = bridge.subscribe(move |_| o.lock().unwrap().push("listener"));
        let _sink = bridge.attach_sink(Arc::new(OrderSink(order.clone())));
        assert_eq!(*order.lock().unwrap(), vec!["sink"]);

        engine.emit(&ChangeEvent::value("a", None));
        assert_eq!(*order.lock().unwrap(), vec!["sink", "sink", "listener"]);
    }

    #[tokio::test]
    async fn test_snapshot_stream_ends_on_destroy() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        let mut stream = bridge.snapshots();
        let first = stream.next().await.unwrap();
        assert!(first.ptr_eq(&bridge.snapshot()));

        engine.set_model(Value::from(serde_json::json!({"a": 1})));
        engine.emit(&ChangeEvent::value("a", None));
        let second = stream.next().await.unwrap();
        assert_eq!(second.value("a"), Some(&Value::Integer(1)));

        bridge.destroy();
        assert!(stream.next().await.is_none());
    }

    fn memory_bridge() -> StateEngine {
        StateEngine::new(
            FormSchema::new(vec![
                FieldSchema::field("a", "Input"),
                FieldSchema::field("b", "Input"),
            ]),
            None,
            &MemoryEngine::factory(),
            ComponentRegistry::new(),
            BridgeConfig {
                batch: BatchConfig::disabled(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn needs_b(snapshot: &Snapshot) -> bool {
        snapshot.value("a").is_some() && snapshot.value("b").is_none()
    }

    #[test]
    fn test_write_back_from_listener_reaches_later_listeners() {
        let bridge = memory_bridge();
        let writer = bridge.clone();
        let _first = bridge.subscribe(move |snapshot: &Snapshot| {
            if needs_b(snapshot) {
                writer.update_value("b", Some(Value::Integer(2))).unwrap();
            }
        });
        let seen: Arc<Mutex<Vec<Snapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _second = bridge.subscribe(move |snapshot: &Snapshot| {
            s.lock().unwrap().push(snapshot.clone());
        });

        bridge.update_value("a", Some(Value::Integer(1))).unwrap();

        let seen = seen.lock().unwrap();
        // the older snapshot is never delivered after the newer one
        assert_eq!(seen.len(), 1);
        assert!(seen[0].ptr_eq(&bridge.snapshot()));
        assert_eq!(seen[0].value("b"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_write_back_from_sink_reaches_later_sinks() {
        struct WriteBack(StateEngine);
        impl SnapshotSink for WriteBack {
            fn store(&self, snapshot: &Snapshot) {
                if needs_b(snapshot) {
                    self.0.update_value("b", Some(Value::Integer(2))).unwrap();
                }
            }
        }

        let bridge = memory_bridge();
        let _writer = bridge.attach_sink(Arc::new(WriteBack(bridge.clone())));
        let (store, _detach) = ExternalStore::connect(&bridge);
        let notified = Arc::new(AtomicUsize::new(0));
        let n = notified.clone();
        let _sub = bridge.subscribe(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        });

        bridge.update_value("a", Some(Value::Integer(1))).unwrap();

        assert!(store.get_snapshot().ptr_eq(&bridge.snapshot()));
        assert_eq!(store.get_snapshot().value("b"), Some(&Value::Integer(2)));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        bridge.destroy();
    }

    #[test]
    fn test_wait_flush_applies_updates_queued_outside_runtime() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::default());
        bridge.queue_update("a", Some(Value::Integer(1))).unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        runtime.block_on(async {
            tokio::time::timeout(std::time::Duration::from_millis(500), bridge.wait_flush())
                .await
                .expect("queued write should be applied");
        });

        assert_eq!(
            engine.calls(),
            vec![EngineCall::UpdateValues(vec![(
                "a".to_string(),
                Some(Value::Integer(1))
            )])]
        );
    }

    #[test]
    fn test_resolve_component() {
        let engine = RecordingEngine::new();
        let bridge = bridge_over(&engine, BatchConfig::disabled());
        assert!(bridge.resolve_component("Missing").is_none());
    }
}
