//! Dot-path addressing into a value model.
//!
//! Paths look like `user.name` or `items.0.title`. Numeric segments index
//! arrays, everything else indexes objects. The empty path is the root.

use crate::{EngineError, Value};
use std::collections::BTreeMap;

/// Split a dot path into its segments. The empty path has no segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Join a parent path and a child key.
pub fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else if key.is_empty() {
        parent.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// True if `path` equals `prefix` or lies below it.
pub fn is_within(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'.'))
}

impl Value {
    /// Look up the value at `path`. Returns None for missing keys.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in segments(path) {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Mutable lookup, same rules as [`Value::get_path`].
    pub fn get_path_mut(&mut self, path: &str) -> Option<&mut Value> {
        let mut current = self;
        for segment in segments(path) {
            current = match current {
                Value::Object(map) => map.get_mut(segment)?,
                Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write `value` at `path`, creating intermediate objects as needed.
    ///
    /// `None` removes the key (the "no value" state). Writing the root with
    /// `None` resets it to an empty object.
    pub fn set_path(&mut self, path: &str, value: Option<Value>) -> Result<(), EngineError> {
        let parts: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            *self = value.unwrap_or_else(Value::empty_object);
            return Ok(());
        };

        let mut current = self;
        for segment in parents {
            if current.is_null() {
                *current = Value::empty_object();
            }
            current = match current {
                Value::Object(map) => map
                    .entry(segment.to_string())
                    .or_insert_with(Value::empty_object),
                Value::Array(items) => {
                    let index = parse_index(path, segment)?;
                    items.get_mut(index).ok_or_else(|| invalid(path))?
                }
                _ => return Err(invalid(path)),
            };
        }

        if current.is_null() {
            *current = Value::Object(BTreeMap::new());
        }
        match current {
            Value::Object(map) => {
                match value {
                    Some(v) => {
                        map.insert(last.to_string(), v);
                    }
                    None => {
                        map.remove(*last);
                    }
                }
                Ok(())
            }
            Value::Array(items) => {
                let index = parse_index(path, last)?;
                match (index.cmp(&items.len()), value) {
                    (std::cmp::Ordering::Less, v) => {
                        items[index] = v.unwrap_or(Value::Null);
                        Ok(())
                    }
                    (std::cmp::Ordering::Equal, Some(v)) => {
                        items.push(v);
                        Ok(())
                    }
                    (std::cmp::Ordering::Equal, None) => Ok(()),
                    (std::cmp::Ordering::Greater, _) => Err(invalid(path)),
                }
            }
            _ => Err(invalid(path)),
        }
    }

    /// Remove and return the value at `path`.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        let parts: Vec<&str> = segments(path).collect();
        let (last, parents) = parts.split_last()?;
        let parent_path = parents.join(".");
        match self.get_path_mut(&parent_path)? {
            Value::Object(map) => map.remove(*last),
            Value::Array(items) => {
                let index = last.parse::<usize>().ok()?;
                (index < items.len()).then(|| items.remove(index))
            }
            _ => None,
        }
    }
}

fn parse_index(path: &str, segment: &str) -> Result<usize, EngineError> {
    segment.parse::<usize>().map_err(|_| invalid(path))
}

fn invalid(path: &str) -> EngineError {
    EngineError::InvalidPath {
        path: path.to_string(),
    }
}
