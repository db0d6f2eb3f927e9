//! The shared counter store.
//!
//! One `CounterStore` is created in `main` and handed to every view. Clones
//! are handles to the same state. Listeners are held weakly: the
//! [`Subscription`] returned by [`CounterStore::subscribe`] owns the
//! callback, the store only dispatches to it while it is alive.

mod subscription;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

pub use subscription::Subscription;

/// The whole application state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterState {
    pub count: i64,
}

/// Point-in-time read of the store.
///
/// `version` increases by one per mutation and is what staleness is judged
/// by, so `+1` followed by `-1` yields a new snapshot with an old count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    version: u64,
    state: CounterState,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> &CounterState {
        &self.state
    }

    pub fn count(&self) -> i64 {
        self.state.count
    }
}

type Listener = dyn Fn(&Snapshot);

struct Registration {
    id: u64,
    listener: Weak<Listener>,
}

pub(crate) struct StoreInner {
    current: Snapshot,
    next_id: u64,
    registrations: Vec<Registration>,
}

impl StoreInner {
    pub(crate) fn deregister(&mut self, id: u64) {
        self.registrations.retain(|r| r.id != id);
    }
}

#[derive(Clone)]
pub struct CounterStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CounterStore")
            .field("current", &inner.current)
            .field("registrations", &inner.registrations.len())
            .finish()
    }
}

impl CounterStore {
    /// A store at count 0, version 0, with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                current: Snapshot { version: 0, state: CounterState::default() },
                next_id: 0,
                registrations: Vec::new(),
            })),
        }
    }

    pub fn get_snapshot(&self) -> Snapshot {
        self.inner.borrow().current
    }

    pub fn version(&self) -> u64 {
        self.inner.borrow().current.version
    }

    pub fn increase(&self) {
        self.apply(|s| CounterState { count: s.count.saturating_add(1) });
    }

    pub fn decrease(&self) {
        self.apply(|s| CounterState { count: s.count.saturating_sub(1) });
    }

    /// Apply `selector` to the current snapshot.
    pub fn select<T>(&self, selector: impl FnOnce(&CounterState) -> T) -> T {
        let snapshot = self.get_snapshot();
        selector(snapshot.state())
    }

    /// True if the store has moved past `seen`. Renderers call this right
    /// before committing output derived from `seen`.
    pub fn is_stale(&self, seen: &Snapshot) -> bool {
        self.inner.borrow().current.version != seen.version
    }

    /// Register `on_change` to run whenever `selector`'s output changes.
    ///
    /// The first selected value is taken at registration and is not
    /// delivered; only later differences are.
    pub fn subscribe<T, S, F>(&self, selector: S, on_change: F) -> Subscription
    where
        T: Clone + PartialEq + 'static,
        S: Fn(&CounterState) -> T + 'static,
        F: Fn(&T) + 'static,
    {
        let last = RefCell::new(self.select(&selector));
        let listener: Rc<Listener> = Rc::new(move |snapshot: &Snapshot| {
            let next = selector(snapshot.state());
            if *last.borrow() == next {
                return;
            }
            last.replace(next.clone());
            on_change(&next);
        });

        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.registrations.push(Registration {
                id,
                listener: Rc::downgrade(&listener),
            });
            id
        };
        trace!(id, "subscribed");
        Subscription::new(id, listener, Rc::downgrade(&self.inner))
    }

    /// Registrations whose owner is still alive.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .registrations
            .iter()
            .filter(|r| r.listener.strong_count() > 0)
            .count()
    }

    fn apply(&self, f: impl FnOnce(&CounterState) -> CounterState) {
        let current = {
            let mut inner = self.inner.borrow_mut();
            let next = f(&inner.current.state);
            inner.current = Snapshot {
                version: inner.current.version + 1,
                state: next,
            };
            inner.current
        };
        trace!(version = current.version, count = current.count(), "store updated");
        self.notify();
    }

    fn notify(&self) {
        let listeners: Vec<Weak<Listener>> = {
            let mut inner = self.inner.borrow_mut();
            inner.registrations.retain(|r| r.listener.strong_count() > 0);
            inner
                .registrations
                .iter()
                .map(|r| Weak::clone(&r.listener))
                .collect()
        };

        // Re-read the snapshot per listener: a callback may mutate the store,
        // and nobody later in the list may see an older value than it did.
        for weak in listeners {
            let Some(listener) = weak.upgrade() else {
                continue;
            };
            let snapshot = self.get_snapshot();
            listener(&snapshot);
        }
    }
}
