//! Client-facing connection handle.
//!
//! Components ask a [`ConnectionFactory`] for a connection; the factory asks
//! its [`ConnectionManager`], which may hand back a pooled physical
//! connection without the caller knowing.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_core::{CredentialRef, CredentialSet};

use super::pool::{ConnectionPool, PoolError, PooledConnection};

/// Allocates connections on behalf of a factory.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn allocate(&self, credentials: &CredentialSet) -> Result<PooledConnection, PoolError>;
}

#[async_trait]
impl ConnectionManager for ConnectionPool {
    async fn allocate(&self, credentials: &CredentialSet) -> Result<PooledConnection, PoolError> {
        self.acquire(credentials).await
    }
}

/// Hands out connections for one credential set.
#[derive(Clone)]
pub struct ConnectionFactory {
    manager: Arc<dyn ConnectionManager>,
    credentials: Arc<CredentialSet>,
}

impl ConnectionFactory {
    #[must_use]
    pub fn new(manager: Arc<dyn ConnectionManager>, credentials: CredentialSet) -> Self {
        Self {
            manager,
            credentials: Arc::new(credentials),
        }
    }

    /// Credential identity connections from this factory are bound to.
    #[must_use]
    pub fn credential(&self) -> CredentialRef {
        self.credentials.reference()
    }

    /// Requests a connection from the manager.
    ///
    /// # Errors
    ///
    /// Propagates the manager's `PoolError`.
    pub async fn get_connection(&self) -> Result<PooledConnection, PoolError> {
        self.manager.allocate(&self.credentials).await
    }
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("credential", &self.credential())
            .finish_non_exhaustive()
    }
}
