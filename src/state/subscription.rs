use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::{Listener, StoreInner};

/// Owning handle for a store listener.
///
/// The store only holds a `Weak` to the callback, so releasing this handle
/// (via [`Subscription::unsubscribe`] or drop) is what ends notifications.
pub struct Subscription {
    id: u64,
    listener: Option<Rc<Listener>>,
    store: Weak<RefCell<StoreInner>>,
}

impl Subscription {
    pub(super) fn new(id: u64, listener: Rc<Listener>, store: Weak<RefCell<StoreInner>>) -> Self {
        Self {
            id,
            listener: Some(listener),
            store,
        }
    }

    /// Stop receiving notifications. Calling this again does nothing.
    pub fn unsubscribe(&mut self) {
        if self.listener.take().is_none() {
            return;
        }
        if let Some(store) = self.store.upgrade() {
            store.borrow_mut().deregister(self.id);
        }
        trace!(id = self.id, "unsubscribed");
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
