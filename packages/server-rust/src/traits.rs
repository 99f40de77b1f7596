use async_trait::async_trait;
use bridge_core::AuditRecord;

/// Pluggable persistence backend for audit records.
/// Implementations: memory (default, tests), `PostgreSQL` (`postgres` feature).
///
/// Query results are ordered by creation time, most recent first.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a record and return its assigned identifier.
    async fn insert(&self, record: &AuditRecord) -> anyhow::Result<i64>;

    /// All records written on behalf of `user_id`.
    async fn find_by_user(&self, user_id: i64) -> anyhow::Result<Vec<AuditRecord>>;

    /// All records with the given operation tag.
    async fn find_by_operation(&self, operation: &str) -> anyhow::Result<Vec<AuditRecord>>;

    /// All failure records.
    async fn find_with_errors(&self) -> anyhow::Result<Vec<AuditRecord>>;

    /// Create tables and indexes. Must be idempotent.
    async fn initialize(&self) -> anyhow::Result<()>;
}
