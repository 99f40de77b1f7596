//! Suite Bridge server: pooled remote connections, message dispatch, the
//! scheduled maintenance job, and the audit trail.

pub mod adapter;
pub mod audit;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod job;
pub mod lifecycle;
pub mod remote;
pub mod traits;
pub mod transport;

pub use adapter::ResourceAdapter;
pub use audit::{AuditSink, MemoryAuditStore};
pub use config::{BridgeConfig, ConfigError};
pub use dispatch::{DispatchError, MessageDispatcher};
pub use job::{JobSchedule, ScheduledJobRunner};
pub use lifecycle::{Lifecycle, LifecycleRegistry};
pub use traits::AuditStore;
pub use transport::InProcessBroker;
