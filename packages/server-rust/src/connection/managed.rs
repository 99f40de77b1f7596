//! Pool-aware wrapper owning one physical [`Connection`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bridge_core::CredentialRef;
use tracing::{debug, info};

use super::listener::{ConnectionEvent, ConnectionEventListener, ListenerSlot};
use super::physical::Connection;

/// Product name reported in connection metadata.
pub const PRODUCT_NAME: &str = "Suite Bridge";

/// Product version reported in connection metadata.
pub const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pool-assigned identifier of a managed connection. Starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagedConnectionId(pub u64);

impl fmt::Display for ManagedConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mc-{}", self.0)
    }
}

/// Descriptive metadata about the adapter behind a managed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMetadata {
    pub product_name: &'static str,
    pub product_version: &'static str,
    pub max_connections: usize,
}

/// Owns a physical connection and mediates its lifecycle.
///
/// A managed connection is held either by the pool's idle set or by exactly
/// one checked-out guard, never both, so no two sessions use it at once.
pub struct ManagedConnection {
    id: ManagedConnectionId,
    credential: CredentialRef,
    connection: Option<Connection>,
    listener: ListenerSlot,
    max_connections: usize,
    created_at: Instant,
    last_used_at: Instant,
}

impl ManagedConnection {
    #[must_use]
    pub fn new(id: ManagedConnectionId, connection: Connection, max_connections: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            credential: connection.credential().clone(),
            connection: Some(connection),
            listener: ListenerSlot::default(),
            max_connections,
            created_at: now,
            last_used_at: now,
        }
    }

    #[must_use]
    pub fn id(&self) -> ManagedConnectionId {
        self.id
    }

    #[must_use]
    pub fn credential(&self) -> &CredentialRef {
        &self.credential
    }

    /// The physical connection, or `None` once destroyed.
    #[must_use]
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.connection.is_none()
    }

    /// `true` if the connection exists and has not been marked broken.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| !c.is_broken())
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    #[must_use]
    pub fn metadata(&self) -> ConnectionMetadata {
        ConnectionMetadata {
            product_name: PRODUCT_NAME,
            product_version: PRODUCT_VERSION,
            max_connections: self.max_connections,
        }
    }

    /// Registers `listener`, replacing any previous one.
    pub fn add_listener(&mut self, listener: &Arc<dyn ConnectionEventListener>) {
        self.listener.set(listener);
    }

    /// Unregisters `listener` if it is the one currently bound.
    ///
    /// Returns `true` if the slot was cleared.
    pub fn remove_listener(&mut self, listener: &Arc<dyn ConnectionEventListener>) -> bool {
        self.listener.remove(listener)
    }

    /// Reports a connection-level error to the listener.
    pub fn notify_error(&self, message: impl Into<String>) {
        self.listener
            .notify(self.id, &ConnectionEvent::ErrorOccurred(message.into()));
    }

    /// Resets per-session state before the connection returns to the idle set.
    ///
    /// The physical connection is kept.
    pub fn cleanup(&mut self) {
        self.last_used_at = Instant::now();
        debug!(connection_id = %self.id, "managed connection cleaned up");
    }

    /// Releases the physical connection and notifies the listener.
    ///
    /// Idempotent: returns `false` and emits nothing if already destroyed.
    pub fn destroy(&mut self) -> bool {
        let Some(connection) = self.connection.take() else {
            return false;
        };
        drop(connection);
        info!(connection_id = %self.id, credential = %self.credential, "managed connection destroyed");
        self.listener.notify(self.id, &ConnectionEvent::Closed);
        true
    }
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("id", &self.id)
            .field("credential", &self.credential)
            .field("destroyed", &self.is_destroyed())
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::listener::tests::RecordingListener;
    use crate::remote::loopback::LoopbackBackend;

    fn managed(id: u64) -> ManagedConnection {
        let backend = Arc::new(LoopbackBackend::new());
        let creds = crate::remote::loopback::tests::credentials("svc@x.test");
        let connection = Connection::new(
            creds.reference(),
            backend.clone(),
            backend.clone(),
            backend,
        );
        ManagedConnection::new(ManagedConnectionId(id), connection, 4)
    }

    fn listener() -> (Arc<RecordingListener>, Arc<dyn ConnectionEventListener>) {
        let concrete = Arc::new(RecordingListener::default());
        let erased: Arc<dyn ConnectionEventListener> = concrete.clone();
        (concrete, erased)
    }

    #[test]
    fn metadata_reports_product_and_limit() {
        let mc = managed(1);
        let meta = mc.metadata();
        assert_eq!(meta.product_name, PRODUCT_NAME);
        assert_eq!(meta.product_version, PRODUCT_VERSION);
        assert_eq!(meta.max_connections, 4);
    }

    #[test]
    fn destroy_is_idempotent_and_fires_once() {
        let (events, erased) = listener();
        let mut mc = managed(7);
        mc.add_listener(&erased);

        assert!(mc.destroy());
        assert!(!mc.destroy());

        assert!(mc.is_destroyed());
        assert!(!mc.is_healthy());
        let seen = events.events.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (ManagedConnectionId(7), ConnectionEvent::Closed));
    }

    #[test]
    fn removed_listener_receives_nothing() {
        let (events, erased) = listener();
        let mut mc = managed(1);
        mc.add_listener(&erased);
        assert!(mc.remove_listener(&erased));

        mc.notify_error("boom");
        mc.destroy();
        assert!(events.events.lock().is_empty());
    }

    #[test]
    fn removing_unregistered_listener_is_noop() {
        let (events, erased) = listener();
        let (_, stranger) = listener();
        let mut mc = managed(1);
        mc.add_listener(&erased);

        assert!(!mc.remove_listener(&stranger));
        mc.destroy();
        assert_eq!(events.events.lock().len(), 1);
    }

    #[test]
    fn cleanup_keeps_connection() {
        let mut mc = managed(1);
        let before = mc.last_used_at();
        mc.cleanup();
        assert!(mc.connection().is_some());
        assert!(mc.last_used_at() >= before);
    }

    #[test]
    fn broken_connection_is_unhealthy() {
        let mc = managed(1);
        assert!(mc.is_healthy());
        mc.connection().unwrap().mark_broken();
        assert!(!mc.is_healthy());
    }
}
