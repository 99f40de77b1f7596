use async_trait::async_trait;
use bridge_core::{CredentialSet, RemoteError};

use super::physical::Connection;

/// Establishes physical connections.
///
/// `connect` performs the remote authentication handshake and is the
/// expensive path the pool exists to avoid repeating.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Builds a connection with live handles to all three sub-services.
    async fn connect(&self, credentials: &CredentialSet) -> Result<Connection, RemoteError>;
}
