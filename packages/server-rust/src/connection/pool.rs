//! Credential-keyed pool of managed connections.
//!
//! A semaphore with `max_size` permits bounds the number of checked-out
//! connections. Idle connections are kept per credential identity; when a
//! new connection is needed and the pool is full, the least recently used
//! idle connection of another credential is destroyed to make room.
//! Idle, checked-out and in-handshake connections together never exceed
//! `max_size`.
//!
//! Exhaustion policy: `acquire` blocks for up to `acquire_timeout`, then fails
//! with [`PoolError::Exhausted`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bridge_core::{CredentialRef, CredentialSet, RemoteError};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use super::connector::Connector;
use super::listener::{ConnectionEvent, ConnectionEventListener};
use super::managed::{ManagedConnection, ManagedConnectionId};
use super::physical::Connection;
use crate::config::PoolConfig;

/// Errors returned by [`ConnectionPool::acquire`] and checked-out guards.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no connection became available within {timeout_ms}ms")]
    Exhausted { timeout_ms: u64 },
    #[error("connection could not be established: {0}")]
    Construction(#[source] RemoteError),
    #[error("connection pool is closed")]
    Closed,
    #[error("connection has been destroyed")]
    Destroyed,
}

/// Point-in-time view of pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Physical connections alive (idle + active).
    pub total: usize,
    pub idle: usize,
    pub active: usize,
    /// Callers currently blocked in `acquire`.
    pub waiting: usize,
    /// Connections ever constructed.
    pub created: u64,
    /// Close events observed from managed connections.
    pub closed_events: u64,
    /// Error events observed from managed connections.
    pub error_events: u64,
}

/// Listener the pool registers on every connection it creates.
#[derive(Debug, Default)]
struct PoolEvents {
    closed: AtomicU64,
    errors: AtomicU64,
}

impl ConnectionEventListener for PoolEvents {
    fn on_event(&self, connection: ManagedConnectionId, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Closed => {
                self.closed.fetch_add(1, Ordering::Relaxed);
                debug!(connection_id = %connection, "pool observed connection close");
            }
            ConnectionEvent::ErrorOccurred(message) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(connection_id = %connection, error = %message, "pool observed connection error");
            }
        }
    }
}

struct PoolShared {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    idle: Mutex<HashMap<CredentialRef, VecDeque<ManagedConnection>>>,
    semaphore: Arc<Semaphore>,
    next_id: AtomicU64,
    active: AtomicUsize,
    /// Handshakes in flight; each holds a reserved slot.
    creating: AtomicUsize,
    waiting: AtomicUsize,
    created: AtomicU64,
    events: Arc<PoolEvents>,
    closed: AtomicBool,
}

/// Pool of managed connections shared by the dispatcher and scheduled jobs.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size));
        Self {
            shared: Arc::new(PoolShared {
                config,
                connector,
                idle: Mutex::new(HashMap::new()),
                semaphore,
                next_id: AtomicU64::new(1),
                active: AtomicUsize::new(0),
                creating: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                created: AtomicU64::new(0),
                events: Arc::new(PoolEvents::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Checks out a connection for `credentials`.
    ///
    /// Reuses a healthy idle connection for the same credential identity if
    /// one exists; otherwise constructs a new one. Waits up to the configured
    /// acquire timeout when `max_size` connections are already checked out.
    ///
    /// # Errors
    ///
    /// - `PoolError::Exhausted` if no slot frees up in time
    /// - `PoolError::Construction` if the handshake fails; nothing is added
    ///   to the pool and the slot is released
    /// - `PoolError::Closed` after [`close`](Self::close)
    pub async fn acquire(&self, credentials: &CredentialSet) -> Result<PooledConnection, PoolError> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        let reference = credentials.reference();

        let permit = {
            let _waiting = Counted::enter(&shared.waiting);
            tokio::time::timeout(
                shared.config.acquire_timeout,
                Arc::clone(&shared.semaphore).acquire_owned(),
            )
            .await
        };

        let permit = match permit {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                let timeout_ms =
                    u64::try_from(shared.config.acquire_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(credential = %reference, timeout_ms, "connection pool exhausted");
                return Err(PoolError::Exhausted { timeout_ms });
            }
        };

        let managed = match shared.take_idle(&reference) {
            Some(managed) => {
                debug!(connection_id = %managed.id(), credential = %reference, "reusing idle connection");
                managed
            }
            None => shared.create(credentials, &reference).await?,
        };

        Ok(PooledConnection {
            managed: Some(managed),
            pool: Arc::clone(shared),
            _permit: permit,
        })
    }

    /// Returns a checked-out connection. Equivalent to dropping the guard.
    ///
    /// Healthy connections go back to the idle set; broken ones are destroyed.
    pub fn release(&self, connection: PooledConnection) {
        drop(connection);
    }

    /// Destroys a checked-out connection instead of returning it.
    pub fn destroy(&self, mut connection: PooledConnection) {
        if let Some(mut managed) = connection.managed.take() {
            managed.destroy();
            self.shared.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Destroys all idle connections and rejects further acquisitions.
    ///
    /// Connections still checked out are destroyed when returned.
    pub fn close(&self) {
        let shared = &self.shared;
        shared.closed.store(true, Ordering::Release);
        shared.semaphore.close();
        let drained: Vec<ManagedConnection> = shared
            .idle
            .lock()
            .drain()
            .flat_map(|(_, queue)| queue)
            .collect();
        let count = drained.len();
        for mut managed in drained {
            managed.destroy();
        }
        info!(destroyed = count, "connection pool closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        let idle = shared.idle_count();
        let active = shared.active.load(Ordering::SeqCst);
        PoolStats {
            total: idle + active,
            idle,
            active,
            waiting: shared.waiting.load(Ordering::SeqCst),
            created: shared.created.load(Ordering::Relaxed),
            closed_events: shared.events.closed.load(Ordering::Relaxed),
            error_events: shared.events.errors.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl PoolShared {
    fn idle_count(&self) -> usize {
        self.idle.lock().values().map(VecDeque::len).sum()
    }

    /// Pops the oldest healthy idle connection for `reference` and counts it
    /// active, destroying any unhealthy ones found ahead of it.
    fn take_idle(&self, reference: &CredentialRef) -> Option<ManagedConnection> {
        let mut discarded = Vec::new();
        let found = {
            let mut idle = self.idle.lock();
            let mut found = None;
            if let Some(queue) = idle.get_mut(reference) {
                while let Some(managed) = queue.pop_front() {
                    if managed.is_healthy() {
                        found = Some(managed);
                        break;
                    }
                    discarded.push(managed);
                }
                if queue.is_empty() {
                    idle.remove(reference);
                }
            }
            if found.is_some() {
                self.active.fetch_add(1, Ordering::SeqCst);
            }
            found
        };
        for mut managed in discarded {
            managed.destroy();
        }
        found
    }

    /// Reserves a slot for a new connection, evicting the least recently
    /// used idle connection if the pool is full. The slot stays reserved
    /// until the returned guard drops.
    fn reserve_slot(&self) -> Counted<'_> {
        let (victim, reservation) = {
            let mut idle = self.idle.lock();
            let idle_count: usize = idle.values().map(VecDeque::len).sum();
            let occupied = idle_count
                + self.active.load(Ordering::SeqCst)
                + self.creating.load(Ordering::SeqCst);
            let victim = if occupied < self.config.max_size {
                None
            } else {
                let oldest = idle
                    .iter()
                    .filter_map(|(key, queue)| queue.front().map(|m| (key.clone(), m.last_used_at())))
                    .min_by_key(|(_, last_used)| *last_used)
                    .map(|(key, _)| key);
                oldest.and_then(|key| {
                    let queue = idle.get_mut(&key)?;
                    let managed = queue.pop_front();
                    if queue.is_empty() {
                        idle.remove(&key);
                    }
                    managed
                })
            };
            (victim, Counted::enter(&self.creating))
        };
        if let Some(mut managed) = victim {
            debug!(connection_id = %managed.id(), "evicting idle connection to make room");
            managed.destroy();
        }
        reservation
    }

    async fn create(
        &self,
        credentials: &CredentialSet,
        reference: &CredentialRef,
    ) -> Result<ManagedConnection, PoolError> {
        let reservation = self.reserve_slot();
        let connection: Connection = self.connector.connect(credentials).await.map_err(|err| {
            warn!(credential = %reference, error = %err, "connection handshake failed");
            PoolError::Construction(err)
        })?;

        let id = ManagedConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut managed = ManagedConnection::new(id, connection, self.config.max_size);
        let listener: Arc<dyn ConnectionEventListener> = self.events.clone();
        managed.add_listener(&listener);

        self.created.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bridge_pool_connections_created_total").increment(1);
        info!(connection_id = %id, credential = %reference, "connection established");
        self.active.fetch_add(1, Ordering::SeqCst);
        drop(reservation);
        Ok(managed)
    }

    fn return_connection(&self, mut managed: ManagedConnection) {
        if !managed.is_healthy() {
            managed.notify_error("connection failed with a non-recoverable transport error");
            managed.destroy();
            self.active.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        if self.closed.load(Ordering::Acquire) {
            managed.destroy();
            self.active.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        managed.cleanup();
        let mut idle = self.idle.lock();
        idle.entry(managed.credential().clone())
            .or_default()
            .push_back(managed);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Holds a counter incremented until dropped, including when the owning
/// future is cancelled.
struct Counted<'a>(&'a AtomicUsize);

impl<'a> Counted<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Counted<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connection checked out of the pool.
///
/// Dropping the guard returns the connection to the pool.
pub struct PooledConnection {
    managed: Option<ManagedConnection>,
    pool: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// The physical connection.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Destroyed` if the connection has been torn down.
    pub fn connection(&self) -> Result<&Connection, PoolError> {
        self.managed
            .as_ref()
            .and_then(ManagedConnection::connection)
            .ok_or(PoolError::Destroyed)
    }

    /// The managed wrapper, for metadata and listener registration.
    #[must_use]
    pub fn managed(&self) -> Option<&ManagedConnection> {
        self.managed.as_ref()
    }

    #[must_use]
    pub fn id(&self) -> Option<ManagedConnectionId> {
        self.managed.as_ref().map(ManagedConnection::id)
    }

    /// Forces the connection to be destroyed rather than reused on release.
    pub fn mark_broken(&self) {
        if let Some(connection) = self.managed.as_ref().and_then(ManagedConnection::connection) {
            connection.mark_broken();
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(managed) = self.managed.take() {
            self.pool.return_connection(managed);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("managed", &self.managed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::remote::loopback::tests::credentials;
    use crate::remote::loopback::LoopbackConnector;

    fn config(max_size: usize, timeout_ms: u64) -> PoolConfig {
        PoolConfig {
            max_size,
            acquire_timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn pool(max_size: usize, timeout_ms: u64) -> (ConnectionPool, Arc<LoopbackConnector>) {
        let connector = Arc::new(LoopbackConnector::new());
        (
            ConnectionPool::new(config(max_size, timeout_ms), connector.clone()),
            connector,
        )
    }

    /// Fails the first `failures` handshakes, then delegates to loopback.
    struct FlakyConnector {
        failures: AtomicUsize,
        inner: LoopbackConnector,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn connect(&self, credentials: &CredentialSet) -> Result<Connection, RemoteError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(RemoteError::Auth("handshake refused".into()));
            }
            self.inner.connect(credentials).await
        }
    }

    /// Delays every handshake so concurrent acquires overlap.
    struct SlowConnector {
        delay: Duration,
        inner: LoopbackConnector,
    }

    #[async_trait]
    impl Connector for SlowConnector {
        async fn connect(&self, credentials: &CredentialSet) -> Result<Connection, RemoteError> {
            tokio::time::sleep(self.delay).await;
            self.inner.connect(credentials).await
        }
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let (pool, connector) = pool(2, 100);
        let creds = credentials("svc@x.test");

        let first = pool.acquire(&creds).await.unwrap();
        let first_id = first.id();
        pool.release(first);

        let second = pool.acquire(&creds).await.unwrap();
        assert_eq!(second.id(), first_id);
        assert_eq!(connector.handshakes(), 1);
        assert_eq!(pool.stats().created, 1);
    }

    #[tokio::test]
    async fn exhausted_pool_fails_after_timeout() {
        let (pool, _) = pool(1, 50);
        let creds = credentials("svc@x.test");

        let held = pool.acquire(&creds).await.unwrap();
        let err = pool.acquire(&creds).await.unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { timeout_ms: 50 }));

        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.created, 1);
        drop(held);
    }

    #[tokio::test]
    async fn waiter_proceeds_when_connection_released() {
        let (pool, connector) = pool(1, 2_000);
        let creds = credentials("svc@x.test");

        let held = pool.acquire(&creds).await.unwrap();
        let waiter = {
            let pool = pool.clone();
            let creds = creds.clone();
            tokio::spawn(async move { pool.acquire(&creds).await.map(|c| c.id()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let held_id = held.id();
        drop(held);

        let reacquired = waiter.await.unwrap().unwrap();
        assert_eq!(reacquired, held_id);
        assert_eq!(connector.handshakes(), 1);
    }

    #[tokio::test]
    async fn distinct_credentials_get_distinct_connections() {
        let (pool, connector) = pool(4, 100);
        let a = pool.acquire(&credentials("a@x.test")).await.unwrap();
        let b = pool.acquire(&credentials("b@x.test")).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(
            a.connection().unwrap().credential(),
            b.connection().unwrap().credential()
        );
        assert_eq!(connector.handshakes(), 2);
    }

    #[tokio::test]
    async fn construction_failure_leaves_bookkeeping_clean() {
        let connector = Arc::new(FlakyConnector {
            failures: AtomicUsize::new(1),
            inner: LoopbackConnector::new(),
        });
        let pool = ConnectionPool::new(config(1, 100), connector);
        let creds = credentials("svc@x.test");

        let err = pool.acquire(&creds).await.unwrap_err();
        assert!(matches!(err, PoolError::Construction(RemoteError::Auth(_))));
        assert_eq!(pool.stats(), PoolStats::default());

        // The slot was released: a retry succeeds within the single permit.
        let conn = pool.acquire(&creds).await.unwrap();
        assert!(conn.connection().is_ok());
        assert_eq!(pool.stats().created, 1);
    }

    #[tokio::test]
    async fn broken_connection_is_destroyed_on_release() {
        let (pool, connector) = pool(2, 100);
        let creds = credentials("svc@x.test");

        let conn = pool.acquire(&creds).await.unwrap();
        let broken_id = conn.id();
        conn.mark_broken();
        pool.release(conn);

        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.closed_events, 1);
        assert_eq!(stats.error_events, 1);

        let fresh = pool.acquire(&creds).await.unwrap();
        assert_ne!(fresh.id(), broken_id);
        assert_eq!(connector.handshakes(), 2);
    }

    #[tokio::test]
    async fn fatal_remote_error_poisons_connection() {
        let (pool, connector) = pool(2, 100);
        let creds = credentials("svc@x.test");

        let conn = pool.acquire(&creds).await.unwrap();
        connector.backend().fail_next(RemoteError::Transport {
            message: "connection reset".into(),
            recoverable: false,
        });
        assert!(conn.connection().unwrap().update_apps_top().await.is_err());
        drop(conn);

        assert_eq!(pool.stats().idle, 0);
        let _fresh = pool.acquire(&creds).await.unwrap();
        assert_eq!(connector.handshakes(), 2);
    }

    #[tokio::test]
    async fn recoverable_remote_error_keeps_connection() {
        let (pool, connector) = pool(2, 100);
        let creds = credentials("svc@x.test");

        let conn = pool.acquire(&creds).await.unwrap();
        connector
            .backend()
            .fail_next(RemoteError::Service("quota exceeded".into()));
        assert!(conn.connection().unwrap().update_apps_top().await.is_err());
        drop(conn);

        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn explicit_destroy_fires_single_close_event() {
        let (pool, _) = pool(2, 100);
        let conn = pool.acquire(&credentials("svc@x.test")).await.unwrap();
        pool.destroy(conn);

        let stats = pool.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.closed_events, 1);
    }

    #[tokio::test]
    async fn full_pool_evicts_idle_connection_of_other_credential() {
        let (pool, _) = pool(1, 100);
        let a = pool.acquire(&credentials("a@x.test")).await.unwrap();
        pool.release(a);
        assert_eq!(pool.stats().idle, 1);

        let b = pool.acquire(&credentials("b@x.test")).await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.closed_events, 1);
        drop(b);
    }

    #[tokio::test]
    async fn close_destroys_idle_and_rejects_acquire() {
        let (pool, _) = pool(2, 100);
        let creds = credentials("svc@x.test");
        let idle = pool.acquire(&creds).await.unwrap();
        let checked_out = pool.acquire(&creds).await.unwrap();
        pool.release(idle);

        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.stats().idle, 0);
        assert!(matches!(pool.acquire(&creds).await, Err(PoolError::Closed)));

        drop(checked_out);
        let stats = pool.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.closed_events, 2);
    }

    #[tokio::test]
    async fn concurrent_handshakes_never_exceed_max_size() {
        let connector = Arc::new(SlowConnector {
            delay: Duration::from_millis(50),
            inner: LoopbackConnector::new(),
        });
        let pool = ConnectionPool::new(config(2, 1_000), connector);
        let a = pool.acquire(&credentials("a@x.test")).await.unwrap();
        pool.release(a);

        let creds_b = credentials("b@x.test");
        let creds_c = credentials("c@x.test");
        let (b, c) = tokio::join!(
            pool.acquire(&creds_b),
            pool.acquire(&creds_c),
        );
        let (b, c) = (b.unwrap(), c.unwrap());

        let stats = pool.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.closed_events, 1);
        drop((b, c));
        assert_eq!(pool.stats().total, 2);
    }

    #[tokio::test]
    async fn failed_handshake_releases_its_reserved_slot() {
        let connector = Arc::new(FlakyConnector {
            failures: AtomicUsize::new(0),
            inner: LoopbackConnector::new(),
        });
        let pool = ConnectionPool::new(config(2, 100), connector.clone());
        let a = pool.acquire(&credentials("a@x.test")).await.unwrap();
        pool.release(a);
        connector.failures.store(1, Ordering::SeqCst);

        assert!(pool.acquire(&credentials("b@x.test")).await.is_err());
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.closed_events, 0);

        // The idle connection survives: the freed slot is reused without eviction.
        let _c = pool.acquire(&credentials("c@x.test")).await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.closed_events, 0);
    }

    #[tokio::test]
    async fn cancelled_acquire_is_not_counted_as_waiting() {
        let (pool, _) = pool(1, 5_000);
        let creds = credentials("svc@x.test");
        let held = pool.acquire(&creds).await.unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(20), pool.acquire(&creds)).await;
        assert!(pending.is_err());
        assert_eq!(pool.stats().waiting, 0);
        drop(held);
    }
}
