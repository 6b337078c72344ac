use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::Value;

/// What a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A field value changed
    Value,
    /// The shape of the tree changed (list rows added, removed or moved)
    Structure,
}

/// Point in the engine's evaluation at which a change is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangePhase {
    /// Raw write applied, derived state not yet recomputed
    Immediate,
    /// Derived state has settled
    Computed,
}

/// Change notification emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ChangePhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_value: Option<Value>,
}

impl ChangeEvent {
    pub fn value(path: impl Into<String>, phase: Option<ChangePhase>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Value,
            phase,
            prev_value: None,
            next_value: None,
        }
    }

    pub fn structure(path: impl Into<String>, phase: Option<ChangePhase>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Structure,
            phase,
            prev_value: None,
            next_value: None,
        }
    }

    pub fn with_values(mut self, prev: Option<Value>, next: Option<Value>) -> Self {
        self.prev_value = prev;
        self.next_value = next;
        self
    }

    /// Settled events (computed or untagged) are the only ones a mirror may act on.
    pub fn is_settled(&self) -> bool {
        !matches!(self.phase, Some(ChangePhase::Immediate))
    }
}

/// Listener for engine change events.
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle returned by every `subscribe`-style call.
///
/// Calling [`Unsubscribe::unsubscribe`] more than once is harmless. Dropping the
/// handle without calling it leaves the subscription in place.
pub struct Unsubscribe {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Handle that does nothing, for subscriptions that were never registered.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_settled_phases() {
        assert!(!ChangeEvent::value("a", Some(ChangePhase::Immediate)).is_settled());
        assert!(ChangeEvent::value("a", Some(ChangePhase::Computed)).is_settled());
        assert!(ChangeEvent::structure("items", None).is_settled());
    }

    #[test]
    fn test_unsubscribe_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut handle = Unsubscribe::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handle.is_active());
        handle.unsubscribe();
        handle.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_change_event_serialization() {
        let event = ChangeEvent::value("user.name", Some(ChangePhase::Computed))
            .with_values(None, Some(Value::from("Ada")));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"phase\":\"computed\""));
        assert!(!json.contains("prev_value"));
        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
