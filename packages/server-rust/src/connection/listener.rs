//! Connection event notification.
//!
//! A managed connection has a single listener slot. Registration replaces
//! whatever was there; removal only succeeds for the exact registered
//! instance. The slot holds a weak reference, so a listener that has been
//! dropped elsewhere simply stops receiving events.

use std::sync::{Arc, Weak};

use super::managed::ManagedConnectionId;

/// Lifecycle events emitted by a managed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The physical connection was destroyed.
    Closed,
    /// A call failed in a way that makes the connection unusable.
    ErrorOccurred(String),
}

/// Receiver of [`ConnectionEvent`]s, typically the pool's bookkeeping.
pub trait ConnectionEventListener: Send + Sync {
    fn on_event(&self, connection: ManagedConnectionId, event: &ConnectionEvent);
}

/// Single-slot, weakly held listener registration.
#[derive(Default)]
pub struct ListenerSlot {
    slot: Option<Weak<dyn ConnectionEventListener>>,
}

impl ListenerSlot {
    /// Stores `listener`, replacing any previous registration.
    pub fn set(&mut self, listener: &Arc<dyn ConnectionEventListener>) {
        self.slot = Some(Arc::downgrade(listener));
    }

    /// Clears the slot if it currently holds `listener` (by identity).
    ///
    /// Returns `false` and leaves the slot untouched otherwise.
    pub fn remove(&mut self, listener: &Arc<dyn ConnectionEventListener>) -> bool {
        let matches = self
            .slot
            .as_ref()
            .is_some_and(|current| std::ptr::addr_eq(current.as_ptr(), Arc::as_ptr(listener)));
        if matches {
            self.slot = None;
        }
        matches
    }

    /// `true` if a listener is registered and still alive.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.slot.as_ref().is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Delivers `event` to the registered listener, if it is still alive.
    pub fn notify(&self, connection: ManagedConnectionId, event: &ConnectionEvent) {
        if let Some(listener) = self.slot.as_ref().and_then(Weak::upgrade) {
            listener.on_event(connection, event);
        }
    }
}

impl std::fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("bound", &self.is_bound())
            .finish()
    }
}
