//! Component registry: name → definition store for every renderable unit.
//!
//! A registry is an explicit value owned by one bridge. Presets bundle a set
//! of definitions (optionally after an async setup step) and can be written
//! in code or loaded from YAML manifests.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use formbridge_api::{Props, Value};

use crate::event_mapping::{CanonicalEvent, EventMapping};
use crate::transform::{TransformerKind, ValueTransformer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("component definition has an empty name")]
    MissingName,

    #[error("component '{name}' has no render target")]
    MissingRenderTarget { name: String },

    #[error("component '{name}' has invalid kind '{kind}' (expected field, layout, list or form)")]
    InvalidKind { name: String, kind: String },

    #[error("component '{name}' maps event '{event}' to an empty native name")]
    InvalidEventMapping { name: String, event: String },

    #[error("preset '{preset}' setup failed: {message}")]
    PresetSetup { preset: String, message: String },
}

/// The closed set of component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Field,
    Layout,
    List,
    Form,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Field => "field",
            ComponentKind::Layout => "layout",
            ComponentKind::List => "list",
            ComponentKind::Form => "form",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "field" => Ok(ComponentKind::Field),
            "layout" => Ok(ComponentKind::Layout),
            "list" => Ok(ComponentKind::List),
            "form" => Ok(ComponentKind::Form),
            other => Err(other.to_string()),
        }
    }
}

/// Opaque handle to whatever a UI runtime renders for a component.
///
/// The bridge never looks inside; frontends downcast to their own widget type.
#[derive(Clone)]
pub struct RenderTarget {
    label: String,
    target: Arc<dyn Any + Send + Sync>,
}

impl RenderTarget {
    pub fn new<T: Any + Send + Sync>(label: impl Into<String>, target: T) -> Self {
        Self {
            label: label.into(),
            target: Arc::new(target),
        }
    }

    /// Target identified by name only, as declared in manifests.
    pub fn named(label: &str) -> Self {
        Self::new(label, label.to_string())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.target.downcast_ref::<T>()
    }
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RenderTarget").field(&self.label).finish()
    }
}

/// Kind-specific part of a definition.
#[derive(Clone)]
pub enum ComponentVariant {
    Field {
        value_transformer: Option<Arc<dyn ValueTransformer>>,
        event_mapping: EventMapping,
    },
    Layout,
    List {
        event_mapping: EventMapping,
    },
    Form,
}

impl fmt::Debug for ComponentVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentVariant::Field {
                value_transformer,
                event_mapping,
            } => f
                .debug_struct("Field")
                .field(
                    "value_transformer",
                    &value_transformer.as_ref().map(|t| t.name().to_string()),
                )
                .field("event_mapping", event_mapping)
                .finish(),
            ComponentVariant::Layout => f.write_str("Layout"),
            ComponentVariant::List { event_mapping } => f
                .debug_struct("List")
                .field("event_mapping", event_mapping)
                .finish(),
            ComponentVariant::Form => f.write_str("Form"),
        }
    }
}

/// A registered renderable unit.
#[derive(Debug, Clone)]
pub struct ComponentDefinition {
    pub name: String,
    pub render_target: Option<RenderTarget>,
    pub default_props: Props,
    pub needs_wrapper: bool,
    pub variant: ComponentVariant,
}

impl ComponentDefinition {
    fn with_variant(name: impl Into<String>, target: RenderTarget, variant: ComponentVariant) -> Self {
        let needs_wrapper = matches!(variant, ComponentVariant::Field { .. });
        Self {
            name: name.into(),
            render_target: Some(target),
            default_props: Props::new(),
            needs_wrapper,
            variant,
        }
    }

    pub fn field(name: impl Into<String>, target: RenderTarget) -> Self {
        Self::with_variant(
            name,
            target,
            ComponentVariant::Field {
                value_transformer: None,
                event_mapping: EventMapping::new(),
            },
        )
    }

    pub fn layout(name: impl Into<String>, target: RenderTarget) -> Self {
        Self::with_variant(name, target, ComponentVariant::Layout)
    }

    pub fn list(name: impl Into<String>, target: RenderTarget) -> Self {
        Self::with_variant(
            name,
            target,
            ComponentVariant::List {
                event_mapping: EventMapping::new(),
            },
        )
    }

    pub fn form(name: impl Into<String>, target: RenderTarget) -> Self {
        Self::with_variant(name, target, ComponentVariant::Form)
    }

    /// Attach a transformer. Ignored for kinds other than field.
    pub fn with_transformer(mut self, transformer: Arc<dyn ValueTransformer>) -> Self {
        if let ComponentVariant::Field {
            value_transformer, ..
        } = &mut self.variant
        {
            *value_transformer = Some(transformer);
        }
        self
    }

    /// Map a canonical event to a native name. Ignored for layout and form.
    pub fn with_event(
        mut self,
        canonical: CanonicalEvent,
        native: impl Into<String>,
    ) -> Self {
        match &mut self.variant {
            ComponentVariant::Field { event_mapping, .. }
            | ComponentVariant::List { event_mapping } => event_mapping.insert(canonical, native),
            ComponentVariant::Layout | ComponentVariant::Form => {}
        }
        self
    }

    pub fn with_default_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_props.insert(key.into(), value.into());
        self
    }

    pub fn with_wrapper(mut self, needs_wrapper: bool) -> Self {
        self.needs_wrapper = needs_wrapper;
        self
    }

    pub fn kind(&self) -> ComponentKind {
        match self.variant {
            ComponentVariant::Field { .. } => ComponentKind::Field,
            ComponentVariant::Layout => ComponentKind::Layout,
            ComponentVariant::List { .. } => ComponentKind::List,
            ComponentVariant::Form => ComponentKind::Form,
        }
    }

    pub fn value_transformer(&self) -> Option<&Arc<dyn ValueTransformer>> {
        match &self.variant {
            ComponentVariant::Field {
                value_transformer, ..
            } => value_transformer.as_ref(),
            _ => None,
        }
    }

    pub fn event_mapping(&self) -> Option<&EventMapping> {
        match &self.variant {
            ComponentVariant::Field { event_mapping, .. }
            | ComponentVariant::List { event_mapping } => Some(event_mapping),
            _ => None,
        }
    }

    /// Node props layered over the definition's default props.
    pub fn merged_props(&self, node_props: &Props) -> Props {
        let mut props = self.default_props.clone();
        props.extend(node_props.iter().map(|(k, v)| (k.clone(), v.clone())));
        props
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::MissingName);
        }
        if self.render_target.is_none() {
            return Err(RegistryError::MissingRenderTarget {
                name: self.name.clone(),
            });
        }
        if let Some(mapping) = self.event_mapping() {
            if let Some((event, _)) = mapping.iter().find(|(_, native)| native.trim().is_empty()) {
                return Err(RegistryError::InvalidEventMapping {
                    name: self.name.clone(),
                    event: event.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A bundle of component definitions with an optional async setup step.
#[async_trait]
pub trait Preset: Send + Sync {
    fn name(&self) -> &str;

    fn components(&self) -> Result<Vec<ComponentDefinition>, RegistryError>;

    /// Runs before any component of the preset is registered.
    async fn setup(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// Name → definition store.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: IndexMap<String, ComponentDefinition>,
    active_preset: Option<String>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert, replacing any definition with the same name.
    pub fn register(&mut self, definition: ComponentDefinition) -> Result<(), RegistryError> {
        definition.validate()?;
        debug!(
            "Registering component '{}' ({})",
            definition.name,
            definition.kind()
        );
        self.components.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Register in order. The first failure stops the batch; earlier entries stay.
    pub fn register_batch(
        &mut self,
        definitions: impl IntoIterator<Item = ComponentDefinition>,
    ) -> Result<(), RegistryError> {
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(())
    }

    pub async fn register_preset(&mut self, preset: &dyn Preset) -> Result<(), RegistryError> {
        preset.setup().await?;
        self.register_batch(preset.components()?)?;
        self.active_preset = Some(preset.name().to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ComponentDefinition> {
        self.components.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn get_by_kind(&self, kind: ComponentKind) -> Vec<&ComponentDefinition> {
        self.components
            .values()
            .filter(|d| d.kind() == kind)
            .collect()
    }

    pub fn get_all(&self) -> Vec<&ComponentDefinition> {
        self.components.values().collect()
    }

    pub fn get_names(&self) -> Vec<&str> {
        self.components.keys().map(|s| s.as_str()).collect()
    }

    /// Copy entries from `other`. Without `overwrite` existing names win.
    pub fn merge(&mut self, other: &ComponentRegistry, overwrite: bool) {
        for (name, definition) in &other.components {
            if overwrite || !self.components.contains_key(name) {
                self.components.insert(name.clone(), definition.clone());
            }
        }
    }

    pub fn active_preset(&self) -> Option<&str> {
        self.active_preset.as_deref()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Declarative form of a [`ComponentDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentManifest {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub render_target: Option<String>,
    #[serde(default)]
    pub transformer: Option<TransformerKind>,
    #[serde(default)]
    pub events: EventMapping,
    #[serde(default)]
    pub default_props: BTreeMap<String, Value>,
    #[serde(default)]
    pub needs_wrapper: Option<bool>,
}

impl TryFrom<ComponentManifest> for ComponentDefinition {
    type Error = RegistryError;

    fn try_from(manifest: ComponentManifest) -> Result<Self, Self::Error> {
        let kind = manifest
            .kind
            .parse::<ComponentKind>()
            .map_err(|kind| RegistryError::InvalidKind {
                name: manifest.name.clone(),
                kind,
            })?;
        let variant = match kind {
            ComponentKind::Field => ComponentVariant::Field {
                value_transformer: manifest.transformer.map(TransformerKind::build),
                event_mapping: manifest.events,
            },
            ComponentKind::Layout => ComponentVariant::Layout,
            ComponentKind::List => ComponentVariant::List {
                event_mapping: manifest.events,
            },
            ComponentKind::Form => ComponentVariant::Form,
        };
        Ok(ComponentDefinition {
            needs_wrapper: manifest.needs_wrapper.unwrap_or(kind == ComponentKind::Field),
            render_target: manifest.render_target.as_deref().map(RenderTarget::named),
            default_props: manifest.default_props,
            name: manifest.name,
            variant,
        })
    }
}

/// Preset loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetManifest {
    pub name: String,
    #[serde(default)]
    pub components: Vec<ComponentManifest>,
}

impl PresetManifest {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse preset manifest")
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preset file: {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid preset file: {}", path.display()))
    }
}

#[async_trait]
impl Preset for PresetManifest {
    fn name(&self) -> &str {
        &self.name
    }

    fn components(&self) -> Result<Vec<ComponentDefinition>, RegistryError> {
        self.components
            .iter()
            .cloned()
            .map(ComponentDefinition::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::StringTransformer;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn input() -> ComponentDefinition {
        ComponentDefinition::field("Input", RenderTarget::named("TextInput"))
            .with_transformer(Arc::new(StringTransformer))
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ComponentRegistry::new();
        registry.register(input()).unwrap();
        registry
            .register(ComponentDefinition::layout("Group", RenderTarget::named("Box")))
            .unwrap();

        assert!(registry.has("Input"));
        assert!(registry.get("Missing").is_none());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("Input").unwrap().kind(), ComponentKind::Field);
        assert!(registry.get("Input").unwrap().needs_wrapper);
        assert!(!registry.get("Group").unwrap().needs_wrapper);
        assert_eq!(registry.get_by_kind(ComponentKind::Layout).len(), 1);

        let mut names = registry.get_names();
        names.sort();
        assert_eq!(names, vec!["Group", "Input"]);
    }

    #[test]
    fn test_register_rejects_invalid_definitions() {
        let mut registry = ComponentRegistry::new();

        let err = registry
            .register(ComponentDefinition::field("", RenderTarget::named("x")))
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingName);

        let mut no_target = input();
        no_target.render_target = None;
        let err = registry.register(no_target).unwrap_err();
        assert_eq!(
            err,
            RegistryError::MissingRenderTarget {
                name: "Input".to_string()
            }
        );

        let err = registry
            .register(input().with_event(CanonicalEvent::Change, " "))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidEventMapping { ref event, .. } if event == "change"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_batch_stops_at_first_failure() {
        let mut registry = ComponentRegistry::new();
        let result = registry.register_batch(vec![
            input(),
            ComponentDefinition::field("", RenderTarget::named("x")),
            ComponentDefinition::layout("Group", RenderTarget::named("Box")),
        ]);
        assert!(result.is_err());
        assert!(registry.has("Input"));
        assert!(!registry.has("Group"));
    }

    #[test]
    fn test_register_overwrites_by_name() {
        let mut registry = ComponentRegistry::new();
        registry.register(input()).unwrap();
        registry
            .register(ComponentDefinition::field("Input", RenderTarget::named("Other")))
            .unwrap();
        assert_eq!(registry.len(), 1);
        let def = registry.get("Input").unwrap();
        assert_eq!(def.render_target.as_ref().unwrap().label(), "Other");
        assert!(def.value_transformer().is_none());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut registry = ComponentRegistry::new();
        registry.register(input()).unwrap();
        let mut copy = registry.clone();
        copy.register(ComponentDefinition::layout("Group", RenderTarget::named("Box")))
            .unwrap();
        assert!(!registry.has("Group"));
        assert!(copy.has("Input"));
    }

    #[test]
    fn test_merge_first_wins_and_overwrite() {
        let mut base = ComponentRegistry::new();
        base.register(input()).unwrap();

        let mut other = ComponentRegistry::new();
        other
            .register(ComponentDefinition::field("Input", RenderTarget::named("Fancy")))
            .unwrap();
        other
            .register(ComponentDefinition::list("Table", RenderTarget::named("Grid")))
            .unwrap();

        let mut first_wins = base.clone();
        first_wins.merge(&other, false);
        assert_eq!(first_wins.len(), 2);
        assert_eq!(
            first_wins.get("Input").unwrap().render_target.as_ref().unwrap().label(),
            "TextInput"
        );

        base.merge(&other, true);
        assert_eq!(
            base.get("Input").unwrap().render_target.as_ref().unwrap().label(),
            "Fancy"
        );
    }

    #[test]
    fn test_merged_props() {
        let def = input()
            .with_default_prop("size", "md")
            .with_default_prop("clearable", true);
        let mut node = Props::new();
        node.insert("size".to_string(), Value::from("lg"));
        let merged = def.merged_props(&node);
        assert_eq!(merged.get("size"), Some(&Value::from("lg")));
        assert_eq!(merged.get("clearable"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_render_target_downcast() {
        #[derive(Debug, PartialEq)]
        struct Widget(u32);
        let target = RenderTarget::new("widget", Widget(7));
        assert_eq!(target.downcast_ref::<Widget>(), Some(&Widget(7)));
        assert!(target.downcast_ref::<String>().is_none());
    }

    const PRESET: &str = r#"
name: console
components:
  - name: Input
    kind: field
    render_target: text
    transformer: string
    events:
      change: input
  - name: Switch
    kind: field
    render_target: toggle
    transformer: boolean
  - name: Group
    kind: layout
    render_target: box
  - name: Table
    kind: list
    render_target: grid
    events:
      list_add: add-row
"#;

    #[test]
    fn test_manifest_conversion() {
        let manifest = PresetManifest::from_yaml_str(PRESET).unwrap();
        let defs = manifest.components().unwrap();
        assert_eq!(defs.len(), 4);
        assert_eq!(defs[0].value_transformer().unwrap().name(), "string");
        assert_eq!(
            defs[0].event_mapping().unwrap().native_name(CanonicalEvent::Change),
            "input"
        );
        assert_eq!(defs[2].kind(), ComponentKind::Layout);
        assert!(!defs[3].needs_wrapper);
    }

    #[test]
    fn test_manifest_invalid_kind() {
        let manifest = ComponentManifest {
            name: "Weird".to_string(),
            kind: "widget".to_string(),
            render_target: Some("x".to_string()),
            transformer: None,
            events: EventMapping::new(),
            default_props: BTreeMap::new(),
            needs_wrapper: None,
        };
        let err = ComponentDefinition::try_from(manifest).unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidKind {
                name: "Weird".to_string(),
                kind: "widget".to_string()
            }
        );
    }

    #[test]
    fn test_manifest_without_target_fails_registration() {
        let manifest = PresetManifest::from_yaml_str(
            "name: broken\ncomponents:\n  - name: Input\n    kind: field\n",
        )
        .unwrap();
        let defs = manifest.components().unwrap();
        let mut registry = ComponentRegistry::new();
        assert!(matches!(
            registry.register_batch(defs),
            Err(RegistryError::MissingRenderTarget { .. })
        ));
    }

    struct SlowPreset {
        ready: AtomicBool,
        fail: bool,
    }

    #[async_trait]
    impl Preset for SlowPreset {
        fn name(&self) -> &str {
            "slow"
        }

        fn components(&self) -> Result<Vec<ComponentDefinition>, RegistryError> {
            assert!(self.ready.load(Ordering::SeqCst), "setup must run first");
            Ok(vec![input()])
        }

        async fn setup(&self) -> Result<(), RegistryError> {
            tokio::task::yield_now().await;
            if self.fail {
                return Err(RegistryError::PresetSetup {
                    preset: "slow".to_string(),
                    message: "assets unavailable".to_string(),
                });
            }
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_preset_awaits_setup() {
        let mut registry = ComponentRegistry::new();
        let preset = SlowPreset {
            ready: AtomicBool::new(false),
            fail: false,
        };
        registry.register_preset(&preset).await.unwrap();
        assert!(registry.has("Input"));
        assert_eq!(registry.active_preset(), Some("slow"));
    }

    #[tokio::test]
    async fn test_register_preset_setup_failure() {
        let mut registry = ComponentRegistry::new();
        let preset = SlowPreset {
            ready: AtomicBool::new(false),
            fail: true,
        };
        let err = registry.register_preset(&preset).await.unwrap_err();
        assert!(matches!(err, RegistryError::PresetSetup { .. }));
        assert!(registry.is_empty());
        assert_eq!(registry.active_preset(), None);
    }

    #[tokio::test]
    async fn test_register_manifest_preset() {
        let manifest = PresetManifest::from_yaml_str(PRESET).unwrap();
        let mut registry = ComponentRegistry::new();
        registry.register_preset(&manifest).await.unwrap();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.active_preset(), Some("console"));
    }
}
