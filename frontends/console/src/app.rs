//! Interactive console session over a [`StateEngine`].

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use formbridge::{
    BridgeConfig, ChangeOutcome, EventHandler, ExternalStore, MemoryEngine, StateEngine,
    TransformFailure,
};
use formbridge_api::{FormSchema, Unsubscribe};
use formbridge_core::{ComponentRegistry, PresetManifest};

use crate::command::{Command, HELP};
use crate::render::render_snapshot;

pub const DEFAULT_SCHEMA: &str = include_str!("../assets/schema.yaml");
pub const DEFAULT_PRESET: &str = include_str!("../assets/preset.yaml");
pub const DEFAULT_CONFIG: &str = include_str!("../assets/config.yaml");

pub fn parse_schema(yaml: &str) -> Result<FormSchema> {
    serde_yaml::from_str(yaml).context("Failed to parse form schema YAML")
}

pub fn load_schema(path: &Path) -> Result<FormSchema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))?;
    parse_schema(&content).with_context(|| path.display().to_string())
}

/// Result of one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue(Vec<String>),
    Quit,
}

pub struct ConsoleApp {
    bridge: StateEngine,
    handler: EventHandler,
    store: Arc<ExternalStore>,
    revisions: Arc<AtomicUsize>,
    failures: Arc<Mutex<Vec<String>>>,
    store_subscription: Unsubscribe,
    detach: Unsubscribe,
}

impl ConsoleApp {
    pub async fn new(
        config: BridgeConfig,
        schema: FormSchema,
        preset: &PresetManifest,
    ) -> Result<Self> {
        let mut registry = ComponentRegistry::new();
        registry
            .register_preset(preset)
            .await
            .with_context(|| format!("Failed to register preset '{}'", preset.name))?;
        info!("Registered {} components", registry.len());

        let bridge = StateEngine::new(schema, None, &MemoryEngine::factory(), registry, config)?;

        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let handler = EventHandler::for_bridge(&bridge).with_error_reporter(Arc::new(
            move |failure: &TransformFailure| {
                if let Ok(mut failures) = sink.lock() {
                    failures.push(format!("{}: {}", failure.path, failure.error));
                }
            },
        ));
        handler.on_focus(|path, component| debug!("focus {} ({})", path, component));
        handler.on_blur(|path, component| debug!("blur {} ({})", path, component));

        let (store, detach) = ExternalStore::connect(&bridge);
        let revisions = Arc::new(AtomicUsize::new(0));
        let counter = revisions.clone();
        let store_subscription = store.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        Ok(Self {
            bridge,
            handler,
            store,
            revisions,
            failures,
            store_subscription,
            detach,
        })
    }

    /// Session over the bundled schema, preset and config.
    pub async fn with_defaults() -> Result<Self> {
        let config = BridgeConfig::from_yaml_str(DEFAULT_CONFIG)?;
        let preset = PresetManifest::from_yaml_str(DEFAULT_PRESET)?;
        Self::new(config, parse_schema(DEFAULT_SCHEMA)?, &preset).await
    }

    pub fn bridge(&self) -> &StateEngine {
        &self.bridge
    }

    /// Number of distinct snapshots published so far.
    pub fn revision(&self) -> usize {
        self.revisions.load(Ordering::SeqCst)
    }

    fn component_at(&self, path: &str) -> Result<String> {
        self.store
            .get_snapshot()
            .render_tree
            .find(path)
            .map(|node| node.component.clone())
            .ok_or_else(|| anyhow!("No rendered node at '{}'", path))
    }

    fn outcome(&self, outcome: ChangeOutcome) -> Vec<String> {
        let mut lines: Vec<String> = match self.failures.lock() {
            Ok(mut failures) => failures.drain(..).map(|f| format!("error: {f}")).collect(),
            Err(_) => Vec::new(),
        };
        if lines.is_empty() {
            lines.push(format!("{outcome:?}").to_lowercase());
        }
        lines
    }

    pub fn execute(&self, command: Command) -> Result<Step> {
        let lines = match command {
            Command::Quit => return Ok(Step::Quit),
            Command::Help => HELP.lines().map(str::to_string).collect(),
            Command::Set { path, value } => {
                let component = self.component_at(&path)?;
                let outcome = self.handler.handle_field_change(&path, value, &component)?;
                self.outcome(outcome)
            }
            Command::Event {
                path,
                native,
                payload,
            } => {
                let component = self.component_at(&path)?;
                let outcome = self
                    .handler
                    .dispatch(&path, &native, payload, &component)?;
                self.outcome(outcome)
            }
            Command::Focus(path) => {
                let component = self.component_at(&path)?;
                self.handler.handle_field_focus(&path, &component);
                Vec::new()
            }
            Command::Blur(path) => {
                let component = self.component_at(&path)?;
                self.handler.handle_field_blur(&path, &component);
                Vec::new()
            }
            Command::Append { path, row } => {
                self.handler.handle_list_add(&path, row)?;
                vec!["written".to_string()]
            }
            Command::Remove { path, index } => {
                self.handler.handle_list_remove(&path, index)?;
                vec!["written".to_string()]
            }
            Command::Move { path, from, to } => {
                self.handler.handle_list_move(&path, from, to)?;
                vec!["written".to_string()]
            }
            Command::Reset(path) => {
                self.bridge.reset(path.as_deref())?;
                vec!["reset".to_string()]
            }
            Command::Validate => {
                let result = self.bridge.validate(None);
                if result.is_valid() {
                    vec!["valid".to_string()]
                } else {
                    result
                        .errors
                        .iter()
                        .map(|e| format!("{}: {}", e.path, e.message))
                        .collect()
                }
            }
            Command::Flush => {
                self.handler.flush()?;
                vec!["flushed".to_string()]
            }
            Command::Show => {
                let mut lines = vec![format!("revision {}", self.revision())];
                lines.extend(render_snapshot(
                    &self.store.get_snapshot(),
                    self.bridge.registry(),
                    &self.handler,
                ));
                lines
            }
            Command::Json => vec![self.store.get_snapshot().value_model.to_json_string()],
            Command::Components => self
                .bridge
                .registry()
                .get_all()
                .into_iter()
                .map(|d| {
                    let target = d
                        .render_target
                        .as_ref()
                        .map(|t| t.label().to_string())
                        .unwrap_or_default();
                    format!("{} ({}) -> {}", d.name, d.kind(), target)
                })
                .collect(),
        };
        Ok(Step::Continue(lines))
    }

    /// Wait for queued writes to reach the engine.
    pub async fn settle(&self) {
        self.handler.wait_flush().await;
    }

    /// Read commands line by line until `quit` or end of input.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        writer.write_all(b"> ").await?;
        writer.flush().await?;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                writer.write_all(b"> ").await?;
                writer.flush().await?;
                continue;
            }
            let output = match line.parse::<Command>() {
                Err(e) => vec![e.to_string()],
                Ok(command) => match self.execute(command) {
                    Ok(Step::Quit) => break,
                    Ok(Step::Continue(output)) => output,
                    Err(e) => vec![format!("error: {e:#}")],
                },
            };
            self.settle().await;
            for line in output {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            writer.write_all(b"> ").await?;
            writer.flush().await?;
        }
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if let Err(e) = self.handler.flush() {
            debug!("Final flush failed: {}", e);
        }
        self.store_subscription.unsubscribe();
        self.detach.unsubscribe();
        self.handler.destroy();
        self.bridge.destroy();
    }

    /// Whether the session still tracks snapshot changes.
    pub fn is_attached(&self) -> bool {
        self.store_subscription.is_active() && self.detach.is_active()
    }
}
