//! Component registry, value transformers and event mapping.
//!
//! Everything here is runtime-agnostic data: the bridge in the `formbridge`
//! crate consults it, frontends populate it.

pub mod event_mapping;
pub mod registry;
pub mod transform;

pub use event_mapping::{CanonicalEvent, EventMapping};
pub use registry::{
    ComponentDefinition, ComponentKind, ComponentManifest, ComponentRegistry, ComponentVariant,
    Preset, PresetManifest, RegistryError, RenderTarget,
};
pub use transform::{
    ArrayTransformer, BooleanTransformer, DateTransformer, FnTransformer, NumberTransformer,
    StringTransformer, TransformError, TransformerKind, ValueTransformer, DEFAULT_DATE_FORMAT,
};
