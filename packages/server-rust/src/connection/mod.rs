//! Connection lifecycle: physical connections, managed wrappers, event
//! listeners, pooling, and the client-facing factory.

pub mod connector;
pub mod factory;
pub mod listener;
pub mod managed;
pub mod physical;
pub mod pool;

pub use connector::Connector;
pub use factory::{ConnectionFactory, ConnectionManager};
pub use listener::{ConnectionEvent, ConnectionEventListener};
pub use managed::{ConnectionMetadata, ManagedConnection, ManagedConnectionId};
pub use physical::Connection;
pub use pool::{ConnectionPool, PoolError, PoolStats, PooledConnection};
