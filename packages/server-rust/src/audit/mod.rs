//! Audit trail: best-effort sink over pluggable stores.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sink;

pub use memory::MemoryAuditStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresAuditStore;
pub use sink::AuditSink;
