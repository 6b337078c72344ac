//! Declarative mapping between canonical interaction events and the native
//! event names a component library emits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Interaction events the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalEvent {
    Change,
    Focus,
    Blur,
    ListAdd,
    ListRemove,
    ListMove,
}

impl CanonicalEvent {
    pub const ALL: [CanonicalEvent; 6] = [
        CanonicalEvent::Change,
        CanonicalEvent::Focus,
        CanonicalEvent::Blur,
        CanonicalEvent::ListAdd,
        CanonicalEvent::ListRemove,
        CanonicalEvent::ListMove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalEvent::Change => "change",
            CanonicalEvent::Focus => "focus",
            CanonicalEvent::Blur => "blur",
            CanonicalEvent::ListAdd => "list_add",
            CanonicalEvent::ListRemove => "list_remove",
            CanonicalEvent::ListMove => "list_move",
        }
    }
}

impl fmt::Display for CanonicalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown canonical event '{}'", s))
    }
}

/// Canonical → native event name table.
///
/// Events without an entry use their canonical name, so an empty mapping
/// describes a component that already speaks the canonical vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMapping {
    entries: BTreeMap<CanonicalEvent, String>,
}

impl EventMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, canonical: CanonicalEvent, native: impl Into<String>) -> Self {
        self.entries.insert(canonical, native.into());
        self
    }

    pub fn insert(&mut self, canonical: CanonicalEvent, native: impl Into<String>) {
        self.entries.insert(canonical, native.into());
    }

    pub fn native_name(&self, canonical: CanonicalEvent) -> &str {
        self.entries
            .get(&canonical)
            .map(|s| s.as_str())
            .unwrap_or_else(|| canonical.as_str())
    }

    /// Reverse lookup. An explicit entry wins over a canonical name, so a
    /// library that emits `input` for change does not also match `change`
    /// unless nothing else claims it.
    pub fn canonical_for(&self, native: &str) -> Option<CanonicalEvent> {
        if let Some((canonical, _)) = self.entries.iter().find(|(_, n)| n.as_str() == native) {
            return Some(*canonical);
        }
        CanonicalEvent::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == native && !self.entries.contains_key(e))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalEvent, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(CanonicalEvent, String)> for EventMapping {
    fn from_iter<I: IntoIterator<Item = (CanonicalEvent, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
