//! Shared, versioned, watchable value cell.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use formbridge_api::Unsubscribe;
use tracing::error;

use crate::lock;

type Watcher<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct CellState<T> {
    value: T,
    version: u64,
    next_id: u64,
    watchers: BTreeMap<u64, Watcher<T>>,
}

/// Reactive container. Cloning shares the cell.
///
/// Every accepted write bumps the version by one and notifies watchers in
/// registration order. Watchers run without the cell locked, so they may
/// read or write the cell.
pub struct ReactiveCell<T> {
    state: Arc<Mutex<CellState<T>>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> ReactiveCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(CellState {
                value,
                version: 0,
                next_id: 0,
                watchers: BTreeMap::new(),
            })),
        }
    }

    pub fn get(&self) -> T {
        lock(&self.state).value.clone()
    }

    /// Read without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&lock(&self.state).value)
    }

    pub fn version(&self) -> u64 {
        lock(&self.state).version
    }

    /// Unconditional write: always bumps and notifies.
    pub fn set(&self, value: T) {
        self.set_if(value, |_, _| true);
    }

    /// Write only when `changed(old, new)` holds. Returns whether it did.
    pub fn set_if(&self, value: T, changed: impl FnOnce(&T, &T) -> bool) -> bool {
        let (current, watchers) = {
            let mut state = lock(&self.state);
            if !changed(&state.value, &value) {
                return false;
            }
            state.value = value;
            state.version += 1;
            let watchers: Vec<Watcher<T>> = state.watchers.values().cloned().collect();
            (state.value.clone(), watchers)
        };
        for watcher in watchers {
            if catch_unwind(AssertUnwindSafe(|| watcher(&current))).is_err() {
                error!("Reactive cell watcher panicked");
            }
        }
        true
    }

    pub fn watch(&self, watcher: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe {
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_id;
            state.next_id += 1;
            state.watchers.insert(id, Arc::new(watcher));
            id
        };
        let weak = Arc::downgrade(&self.state);
        Unsubscribe::new(move || {
            if let Some(state) = weak.upgrade() {
                lock(&state).watchers.remove(&id);
            }
        })
    }

    pub fn watcher_count(&self) -> usize {
        lock(&self.state).watchers.len()
    }
}

impl<T: fmt::Debug> fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ReactiveCell")
            .field("value", &state.value)
            .field("version", &state.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_bumps_version_and_notifies_in_order() {
        let cell = ReactiveCell::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());
        let _first = cell.watch(move |v| a.lock().unwrap().push(("first", *v)));
        let _second = cell.watch(move |v| b.lock().unwrap().push(("second", *v)));

        cell.set(5);
        assert_eq!(cell.get(), 5);
        assert_eq!(cell.version(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 5), ("second", 5)]);
    }

    #[test]
    fn test_set_if_skips_unchanged() {
        let cell = ReactiveCell::new(1);
        assert!(!cell.set_if(1, |old, new| old != new));
        assert_eq!(cell.version(), 0);
        assert!(cell.set_if(2, |old, new| old != new));
        assert_eq!(cell.version(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let cell = ReactiveCell::new(0);
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let mut handle = cell.watch(move |_| *c.lock().unwrap() += 1);
        cell.set(1);
        handle.unsubscribe();
        cell.set(2);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(cell.watcher_count(), 0);
    }

    #[test]
    fn test_watcher_may_write_cell() {
        let cell = ReactiveCell::new(0);
        let inner = cell.clone();
        let _w = cell.watch(move |v| {
            if *v < 3 {
                inner.set(v + 1);
            }
        });
        cell.set(1);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn test_panicking_watcher_is_isolated() {
        let cell = ReactiveCell::new(0);
        let hit = Arc::new(Mutex::new(false));
        let h = hit.clone();
        let _bad = cell.watch(|_| panic!("watcher failure"));
        let _good = cell.watch(move |_| *h.lock().unwrap() = true);
        cell.set(1);
        assert!(*hit.lock().unwrap());
    }
}
