//! Value transformers: mapping between engine values and widget values.
//!
//! Every transformer tolerates a missing engine value and hands the widget a
//! safe default instead of `Null`. In the other direction a cleared widget
//! (`""` or `Null`) means "no value" and maps to `None`. Boolean and array
//! widgets are the exception: `false` and `[]` are real values there.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use formbridge_api::Value;

/// Default format of dates stored in the engine.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("{transformer} transformer cannot handle a {found} value")]
    Unsupported {
        transformer: &'static str,
        found: &'static str,
    },

    #[error("{transformer} transformer could not parse '{input}': {message}")]
    Parse {
        transformer: &'static str,
        input: String,
        message: String,
    },

    #[error("{0}")]
    Custom(String),
}

/// Bidirectional mapping between the engine's canonical value and a
/// component's native value.
pub trait ValueTransformer: Send + Sync {
    /// Engine value to widget value. Must never return `Value::Null`.
    fn to_component(&self, value: Option<&Value>) -> Result<Value, TransformError>;

    /// Widget value to engine value. `None` means "no value".
    fn from_component(&self, value: Value) -> Result<Option<Value>, TransformError>;

    fn name(&self) -> &str {
        "custom"
    }
}

/// Names of the built-in transformers, as used in component manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformerKind {
    Boolean,
    Number,
    String,
    Array,
    Date,
}

impl TransformerKind {
    pub fn build(self) -> Arc<dyn ValueTransformer> {
        match self {
            TransformerKind::Boolean => Arc::new(BooleanTransformer),
            TransformerKind::Number => Arc::new(NumberTransformer),
            TransformerKind::String => Arc::new(StringTransformer),
            TransformerKind::Array => Arc::new(ArrayTransformer),
            TransformerKind::Date => Arc::new(DateTransformer::default()),
        }
    }
}

fn unsupported(transformer: &'static str, value: &Value) -> TransformError {
    TransformError::Unsupported {
        transformer,
        found: value.type_name(),
    }
}

/// Text inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringTransformer;

impl ValueTransformer for StringTransformer {
    fn to_component(&self, value: Option<&Value>) -> Result<Value, TransformError> {
        match value {
            None | Some(Value::Null) => Ok(Value::String(String::new())),
            Some(Value::String(s)) | Some(Value::DateTime(s)) => Ok(Value::String(s.clone())),
            Some(Value::Integer(i)) => Ok(Value::String(i.to_string())),
            Some(Value::Float(f)) => Ok(Value::String(f.to_string())),
            Some(Value::Boolean(b)) => Ok(Value::String(b.to_string())),
            Some(other) => Err(unsupported("string", other)),
        }
    }

    fn from_component(&self, value: Value) -> Result<Option<Value>, TransformError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) => Ok(Some(Value::String(s))),
            Value::Integer(i) => Ok(Some(Value::String(i.to_string()))),
            Value::Float(f) => Ok(Some(Value::String(f.to_string()))),
            Value::Boolean(b) => Ok(Some(Value::String(b.to_string()))),
            other => Err(unsupported("string", &other)),
        }
    }

    fn name(&self) -> &str {
        "string"
    }
}

/// Numeric inputs. Widgets may report numbers or numeric text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberTransformer;

impl NumberTransformer {
    fn parse(input: &str) -> Result<Value, TransformError> {
        let trimmed = input.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Value::Integer(i));
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Value::Float(f)),
            Ok(_) => Err(TransformError::Parse {
                transformer: "number",
                input: input.to_string(),
                message: "not a finite number".to_string(),
            }),
            Err(e) => Err(TransformError::Parse {
                transformer: "number",
                input: input.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

impl ValueTransformer for NumberTransformer {
    fn to_component(&self, value: Option<&Value>) -> Result<Value, TransformError> {
        match value {
            None | Some(Value::Null) => Ok(Value::String(String::new())),
            Some(Value::Integer(i)) => Ok(Value::Integer(*i)),
            Some(Value::Float(f)) => Ok(Value::Float(*f)),
            Some(Value::String(s)) if s.is_empty() => Ok(Value::String(String::new())),
            Some(Value::String(s)) => Self::parse(s),
            Some(other) => Err(unsupported("number", other)),
        }
    }

    fn from_component(&self, value: Value) -> Result<Option<Value>, TransformError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Self::parse(&s).map(Some),
            Value::Integer(i) => Ok(Some(Value::Integer(i))),
            Value::Float(f) => Ok(Some(Value::Float(f))),
            other => Err(unsupported("number", &other)),
        }
    }

    fn name(&self) -> &str {
        "number"
    }
}

/// Switches and checkboxes. `false` is a value, not a cleared state.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanTransformer;

impl ValueTransformer for BooleanTransformer {
    fn to_component(&self, value: Option<&Value>) -> Result<Value, TransformError> {
        match value {
            None | Some(Value::Null) => Ok(Value::Boolean(false)),
            Some(Value::Boolean(b)) => Ok(Value::Boolean(*b)),
            Some(Value::Integer(i)) => Ok(Value::Boolean(*i != 0)),
            Some(Value::String(s)) => match s.as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" | "" => Ok(Value::Boolean(false)),
                _ => Err(TransformError::Parse {
                    transformer: "boolean",
                    input: s.clone(),
                    message: "expected 'true' or 'false'".to_string(),
                }),
            },
            Some(other) => Err(unsupported("boolean", other)),
        }
    }

    fn from_component(&self, value: Value) -> Result<Option<Value>, TransformError> {
        match value {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(Value::Boolean(b))),
            other => Err(unsupported("boolean", &other)),
        }
    }

    fn name(&self) -> &str {
        "boolean"
    }
}

/// Multi-selects, checkbox groups, tag inputs. `[]` is a value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayTransformer;

impl ValueTransformer for ArrayTransformer {
    fn to_component(&self, value: Option<&Value>) -> Result<Value, TransformError> {
        match value {
            None | Some(Value::Null) => Ok(Value::Array(Vec::new())),
            Some(Value::Array(items)) => Ok(Value::Array(items.clone())),
            Some(other @ Value::Object(_)) => Err(unsupported("array", other)),
            Some(scalar) => Ok(Value::Array(vec![scalar.clone()])),
        }
    }

    fn from_component(&self, value: Value) -> Result<Option<Value>, TransformError> {
        match value {
            // cleared widget, unlike a real `[]`
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::Array(items) => Ok(Some(Value::Array(items))),
            Value::Object(_) => Err(unsupported("array", &value)),
            scalar => Ok(Some(Value::Array(vec![scalar]))),
        }
    }

    fn name(&self) -> &str {
        "array"
    }
}

/// Date pickers.
///
/// The engine stores dates as text in `format`; widgets work with
/// [`Value::DateTime`] at midnight UTC.
#[derive(Debug, Clone)]
pub struct DateTransformer {
    format: String,
}

impl Default for DateTransformer {
    fn default() -> Self {
        Self::with_format(DEFAULT_DATE_FORMAT)
    }
}

impl DateTransformer {
    pub fn with_format(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    fn parse_engine(&self, input: &str) -> Result<DateTime<Utc>, TransformError> {
        let date = NaiveDate::parse_from_str(input, &self.format).map_err(|e| {
            TransformError::Parse {
                transformer: "date",
                input: input.to_string(),
                message: e.to_string(),
            }
        })?;
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| TransformError::Parse {
            transformer: "date",
            input: input.to_string(),
            message: "no midnight for date".to_string(),
        })?;
        Ok(midnight.and_utc())
    }

    fn parse_component(&self, input: &str) -> Result<DateTime<Utc>, TransformError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Ok(dt.with_timezone(&Utc));
        }
        self.parse_engine(input)
    }

    fn format(&self, dt: DateTime<Utc>) -> Value {
        Value::String(dt.format(&self.format).to_string())
    }
}

impl ValueTransformer for DateTransformer {
    fn to_component(&self, value: Option<&Value>) -> Result<Value, TransformError> {
        match value {
            None | Some(Value::Null) => Ok(Value::String(String::new())),
            Some(Value::String(s)) if s.is_empty() => Ok(Value::String(String::new())),
            Some(Value::String(s)) => self.parse_engine(s).map(Value::from_datetime),
            Some(Value::DateTime(s)) => self.parse_component(s).map(Value::from_datetime),
            Some(other) => Err(unsupported("date", other)),
        }
    }

    fn from_component(&self, value: Value) -> Result<Option<Value>, TransformError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) | Value::DateTime(s) => {
                self.parse_component(&s).map(|dt| Some(self.format(dt)))
            }
            other => Err(unsupported("date", &other)),
        }
    }

    fn name(&self) -> &str {
        "date"
    }
}

type ToComponentFn = dyn Fn(Option<&Value>) -> Result<Value, TransformError> + Send + Sync;
type FromComponentFn = dyn Fn(Value) -> Result<Option<Value>, TransformError> + Send + Sync;

/// Transformer assembled from two closures.
pub struct FnTransformer {
    name: String,
    to: Box<ToComponentFn>,
    from: Box<FromComponentFn>,
}

impl FnTransformer {
    pub fn new(
        name: impl Into<String>,
        to: impl Fn(Option<&Value>) -> Result<Value, TransformError> + Send + Sync + 'static,
        from: impl Fn(Value) -> Result<Option<Value>, TransformError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            to: Box::new(to),
            from: Box::new(from),
        }
    }
}

impl fmt::Debug for FnTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformer")
            .field("name", &self.name)
            .finish()
    }
}

impl ValueTransformer for FnTransformer {
    fn to_component(&self, value: Option<&Value>) -> Result<Value, TransformError> {
        (self.to)(value)
    }

    fn from_component(&self, value: Value) -> Result<Option<Value>, TransformError> {
        (self.from)(value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(t: &dyn ValueTransformer, v: &Value) -> Option<Value> {
        let shown = t.to_component(Some(v)).unwrap();
        t.from_component(shown).unwrap()
    }

    #[test]
    fn test_nullish_engine_values_get_widget_defaults() {
        let cases: Vec<(Arc<dyn ValueTransformer>, Value)> = vec![
            (TransformerKind::String.build(), Value::String(String::new())),
            (TransformerKind::Number.build(), Value::String(String::new())),
            (TransformerKind::Boolean.build(), Value::Boolean(false)),
            (TransformerKind::Array.build(), Value::Array(vec![])),
            (TransformerKind::Date.build(), Value::String(String::new())),
        ];
        for (t, expected) in cases {
            assert_eq!(t.to_component(None).unwrap(), expected, "{}", t.name());
            assert_eq!(
                t.to_component(Some(&Value::Null)).unwrap(),
                expected,
                "{}",
                t.name()
            );
        }
    }

    #[test]
    fn test_cleared_widgets_map_to_no_value() {
        assert_eq!(StringTransformer.from_component("".into()).unwrap(), None);
        assert_eq!(NumberTransformer.from_component("  ".into()).unwrap(), None);
        assert_eq!(
            DateTransformer::default().from_component("".into()).unwrap(),
            None
        );
        assert_eq!(StringTransformer.from_component(Value::Null).unwrap(), None);
    }

    #[test]
    fn test_boolean_and_array_keep_empty_values() {
        assert_eq!(
            BooleanTransformer.from_component(Value::Boolean(false)).unwrap(),
            Some(Value::Boolean(false))
        );
        assert_eq!(
            ArrayTransformer.from_component(Value::Array(vec![])).unwrap(),
            Some(Value::Array(vec![]))
        );
    }

    #[test]
    fn test_cleared_boolean_and_array_mean_no_value() {
        assert_eq!(BooleanTransformer.from_component(Value::Null).unwrap(), None);
        assert_eq!(ArrayTransformer.from_component(Value::Null).unwrap(), None);
        assert_eq!(ArrayTransformer.from_component("".into()).unwrap(), None);
        assert_eq!(
            ArrayTransformer.to_component(None).unwrap(),
            Value::Array(Vec::new())
        );
    }

    #[test]
    fn test_number_parses_text() {
        assert_eq!(
            NumberTransformer.from_component("42".into()).unwrap(),
            Some(Value::Integer(42))
        );
        assert_eq!(
            NumberTransformer.from_component(" 2.5 ".into()).unwrap(),
            Some(Value::Float(2.5))
        );
        let err = NumberTransformer.from_component("abc".into()).unwrap_err();
        assert!(matches!(err, TransformError::Parse { transformer: "number", .. }));
    }

    #[test]
    fn test_date_conversions() {
        let t = DateTransformer::default();
        let shown = t.to_component(Some(&"2024-03-01".into())).unwrap();
        assert_eq!(shown, Value::DateTime("2024-03-01T00:00:00+00:00".to_string()));
        assert_eq!(
            t.from_component(shown).unwrap(),
            Some(Value::from("2024-03-01"))
        );
        assert!(t.to_component(Some(&"01/03/2024".into())).is_err());

        let custom = DateTransformer::with_format("%d/%m/%Y");
        assert_eq!(
            custom
                .from_component(Value::DateTime("2024-03-01T00:00:00+00:00".into()))
                .unwrap(),
            Some(Value::from("01/03/2024"))
        );
    }

    #[test]
    fn test_unsupported_values_error() {
        let err = StringTransformer
            .from_component(Value::Array(vec![]))
            .unwrap_err();
        assert_eq!(
            err,
            TransformError::Unsupported {
                transformer: "string",
                found: "array"
            }
        );
        assert!(BooleanTransformer.from_component("yes".into()).is_err());
    }

    #[test]
    fn test_fn_transformer() {
        let upper = FnTransformer::new(
            "upper",
            |v| Ok(v.cloned().unwrap_or_else(|| Value::from(""))),
            |v| match v {
                Value::String(s) => Ok(Some(Value::String(s.to_uppercase()))),
                other => Err(TransformError::Custom(format!(
                    "unexpected {}",
                    other.type_name()
                ))),
            },
        );
        assert_eq!(upper.name(), "upper");
        assert_eq!(
            upper.from_component("abc".into()).unwrap(),
            Some(Value::from("ABC"))
        );
        assert!(upper.from_component(Value::Integer(1)).is_err());
    }

    #[test]
    fn test_transformer_kind_from_yaml() {
        let kind: TransformerKind = serde_yaml::from_str("date").unwrap();
        assert_eq!(kind, TransformerKind::Date);
        assert_eq!(kind.build().name(), "date");
    }

    proptest! {
        #[test]
        fn prop_string_roundtrip(s in "[a-zA-Z0-9 ]{1,24}") {
            let v = Value::String(s);
            prop_assert_eq!(roundtrip(&StringTransformer, &v), Some(v));
        }

        #[test]
        fn prop_integer_roundtrip(i in any::<i64>()) {
            let v = Value::Integer(i);
            prop_assert_eq!(roundtrip(&NumberTransformer, &v), Some(v));
        }

        #[test]
        fn prop_float_roundtrip(f in -1.0e9f64..1.0e9f64) {
            let v = Value::Float(f);
            prop_assert_eq!(roundtrip(&NumberTransformer, &v), Some(v));
        }

        #[test]
        fn prop_boolean_roundtrip(b in any::<bool>()) {
            let v = Value::Boolean(b);
            prop_assert_eq!(roundtrip(&BooleanTransformer, &v), Some(v));
        }

        #[test]
        fn prop_array_roundtrip(items in proptest::collection::vec(any::<i64>(), 0..8)) {
            let v = Value::Array(items.into_iter().map(Value::Integer).collect());
            prop_assert_eq!(roundtrip(&ArrayTransformer, &v), Some(v));
        }

        #[test]
        fn prop_date_roundtrip(year in 1900i32..2200, ordinal in 1u32..=365) {
            let date = NaiveDate::from_yo_opt(year, ordinal).unwrap();
            let v = Value::String(date.format(DEFAULT_DATE_FORMAT).to_string());
            let t = DateTransformer::default();
            prop_assert_eq!(roundtrip(&t, &v), Some(v));
        }

        #[test]
        fn prop_to_component_never_null(kind in prop_oneof![
            Just(TransformerKind::Boolean),
            Just(TransformerKind::Number),
            Just(TransformerKind::String),
            Just(TransformerKind::Array),
            Just(TransformerKind::Date),
        ]) {
            let t = kind.build();
            prop_assert!(!t.to_component(None).unwrap().is_null());
            prop_assert!(!t.to_component(Some(&Value::Null)).unwrap().is_null());
        }
    }
}
