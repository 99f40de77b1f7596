//! Resource adapter: owner of the connection pool and the adapter status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::CredentialSet;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::connection::managed::{PRODUCT_NAME, PRODUCT_VERSION};
use crate::connection::{ConnectionFactory, ConnectionPool, Connector};
use crate::lifecycle::{AdapterStatus, Lifecycle};

/// How long `stop` waits for in-flight dispatches by default.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the pool; hands out connection factories to the dispatcher and jobs.
pub struct ResourceAdapter {
    pool: ConnectionPool,
    status: Arc<AdapterStatus>,
    drain_timeout: Duration,
}

impl ResourceAdapter {
    #[must_use]
    pub fn new(config: &BridgeConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            pool: ConnectionPool::new(config.pool.clone(), connector),
            status: Arc::new(AdapterStatus::new()),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    #[must_use]
    pub fn status(&self) -> &Arc<AdapterStatus> {
        &self.status
    }

    /// Creates a factory handing out pooled connections for `credentials`.
    #[must_use]
    pub fn connection_factory(&self, credentials: CredentialSet) -> ConnectionFactory {
        ConnectionFactory::new(Arc::new(self.pool.clone()), credentials)
    }
}

#[async_trait]
impl Lifecycle for ResourceAdapter {
    fn name(&self) -> &'static str {
        "resource-adapter"
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.status.set_ready();
        info!(
            product = PRODUCT_NAME,
            version = PRODUCT_VERSION,
            max_connections = self.pool.config().max_size,
            "resource adapter ready"
        );
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if !self.status.drain(self.drain_timeout).await {
            warn!(
                in_flight = self.status.in_flight_count(),
                "drain timed out; closing pool with dispatches in flight"
            );
        }
        self.pool.close();
        Ok(())
    }
}
