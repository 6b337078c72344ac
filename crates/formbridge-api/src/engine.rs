//! Interface of the form engine the bridge drives.
//!
//! The engine is an external collaborator: it owns the value model, evaluates
//! the schema and hands out structurally shared snapshots. Everything the
//! bridge needs from it is expressed by [`FormEngine`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::render::{Props, RenderNode};
use crate::streaming::{ChangeListener, Unsubscribe};
use crate::{EngineError, Value};

/// Shape of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Field,
    Layout,
    List,
}

/// Visibility condition: the node renders only while `path` holds `equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub path: String,
    pub equals: Value,
}

/// One node of a form schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Key relative to the parent; empty for pure layout nodes
    #[serde(default)]
    pub field: String,
    pub component: String,
    #[serde(default, rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub props: Props,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub show_when: Option<Condition>,
    /// Nested nodes; for lists this is the row template
    #[serde(default)]
    pub children: Vec<FieldSchema>,
}

impl FieldSchema {
    pub fn field(field: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            component: component.into(),
            node_type: NodeType::Field,
            props: Props::new(),
            default_value: None,
            required: false,
            disabled: false,
            readonly: false,
            show_when: None,
            children: Vec::new(),
        }
    }

    pub fn layout(
        field: impl Into<String>,
        component: impl Into<String>,
        children: Vec<FieldSchema>,
    ) -> Self {
        Self {
            node_type: NodeType::Layout,
            children,
            ..Self::field(field, component)
        }
    }

    pub fn list(
        field: impl Into<String>,
        component: impl Into<String>,
        row: Vec<FieldSchema>,
    ) -> Self {
        Self {
            node_type: NodeType::List,
            children: row,
            ..Self::field(field, component)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn show_when(mut self, path: impl Into<String>, equals: impl Into<Value>) -> Self {
        self.show_when = Some(Condition {
            path: path.into(),
            equals: equals.into(),
        });
        self
    }
}

fn default_root_component() -> String {
    "Form".to_string()
}

/// Complete form schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default = "default_root_component")]
    pub component: String,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl FormSchema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self {
            component: default_root_component(),
            fields,
        }
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

/// Result of `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors_for(&self, path: &str) -> impl Iterator<Item = &FieldError> {
        let path = path.to_string();
        self.errors.iter().filter(move |e| e.path == path)
    }
}

/// Operations the bridge consumes from a form engine.
///
/// Implementations must release any internal lock before invoking change
/// listeners: listeners re-enter the engine to read the settled snapshot.
pub trait FormEngine: Send + Sync {
    /// Value at `path`, or the whole model for `None`
    fn get_value(&self, path: Option<&str>) -> Option<Value>;

    /// Current value model (structurally shared)
    fn value_model(&self) -> Arc<Value>;

    /// Current render tree (structurally shared)
    fn render_tree(&self) -> Arc<RenderNode>;

    /// Write a single path; `None` clears the value
    fn update_value(&self, path: &str, value: Option<Value>) -> Result<(), EngineError>;

    /// Aggregate write: every entry is applied before any settled event is emitted
    fn update_values(&self, updates: Vec<(String, Option<Value>)>) -> Result<(), EngineError>;

    fn on_value_change(&self, listener: ChangeListener) -> Unsubscribe;

    fn set_form_schema(&self, schema: FormSchema) -> Result<(), EngineError>;

    /// Reset the whole model (`None`) or one path to its initial value
    fn reset(&self, target: Option<&str>) -> Result<(), EngineError>;

    fn validate(&self, paths: Option<&[String]>) -> ValidationResult;

    fn list_append(&self, path: &str, row: Value) -> Result<(), EngineError>;
    fn list_insert(&self, path: &str, index: usize, row: Value) -> Result<(), EngineError>;
    fn list_remove(&self, path: &str, index: usize) -> Result<(), EngineError>;
    fn list_move(&self, path: &str, from: usize, to: usize) -> Result<(), EngineError>;
    fn list_swap(&self, path: &str, a: usize, b: usize) -> Result<(), EngineError>;
    fn list_replace(&self, path: &str, index: usize, row: Value) -> Result<(), EngineError>;
    fn list_clear(&self, path: &str) -> Result<(), EngineError>;

    fn destroy(&self);
}

/// Builds the engine instance a bridge owns.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        schema: FormSchema,
        initial_model: Option<Value>,
    ) -> Result<Arc<dyn FormEngine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: Fn(FormSchema, Option<Value>) -> Result<Arc<dyn FormEngine>, EngineError> + Send + Sync,
{
    fn create(
        &self,
        schema: FormSchema,
        initial_model: Option<Value>,
    ) -> Result<Arc<dyn FormEngine>, EngineError> {
        self(schema, initial_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_from_yaml() {
        let yaml = r#"
fields:
  - field: user
    component: Group
    type: layout
    children:
      - field: name
        component: Input
        required: true
  - field: items
    component: Table
    type: list
    children:
      - field: title
        component: Input
  - field: note
    component: Input
    show_when:
      path: user.name
      equals: Ada
"#;
        let schema: FormSchema = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.component, "Form");
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[0].node_type, NodeType::Layout);
        assert!(schema.fields[0].children[0].required);
        assert_eq!(schema.fields[1].node_type, NodeType::List);
        assert_eq!(
            schema.fields[2].show_when,
            Some(Condition {
                path: "user.name".to_string(),
                equals: Value::from("Ada"),
            })
        );
    }

    #[test]
    fn test_validation_result_helpers() {
        let result = ValidationResult {
            errors: vec![FieldError {
                path: "user.name".to_string(),
                message: "required".to_string(),
            }],
        };
        assert!(!result.is_valid());
        assert_eq!(result.errors_for("user.name").count(), 1);
        assert_eq!(result.errors_for("other").count(), 0);
        assert!(ValidationResult::default().is_valid());
    }
}
