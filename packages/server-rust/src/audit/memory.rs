//! In-memory [`AuditStore`].

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bridge_core::AuditRecord;
use parking_lot::RwLock;

use crate::traits::AuditStore;

/// Append-only audit store kept in process memory.
///
/// Default backend when no database is configured. Records are lost on
/// restart.
#[derive(Debug)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
    next_id: AtomicI64,
}

impl MemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Snapshot of every stored record in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    fn select(&self, predicate: impl Fn(&AuditRecord) -> bool) -> Vec<AuditRecord> {
        let mut matched: Vec<AuditRecord> = self
            .records
            .read()
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        // Newest first; ties broken by id so later inserts win.
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matched
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, record: &AuditRecord) -> anyhow::Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.records.write().push(record.clone().with_id(id));
        Ok(id)
    }

    async fn find_by_user(&self, user_id: i64) -> anyhow::Result<Vec<AuditRecord>> {
        Ok(self.select(|record| record.user_id == Some(user_id)))
    }

    async fn find_by_operation(&self, operation: &str) -> anyhow::Result<Vec<AuditRecord>> {
        Ok(self.select(|record| record.operation == operation))
    }

    async fn find_with_errors(&self) -> anyhow::Result<Vec<AuditRecord>> {
        Ok(self.select(|record| record.error.is_some()))
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = MemoryAuditStore::new();
        let a = store
            .insert(&AuditRecord::success(None, "op", "t", "ok"))
            .await
            .unwrap();
        let b = store
            .insert(&AuditRecord::success(None, "op", "t", "ok"))
            .await
            .unwrap();
        assert!(b > a);
        assert_eq!(store.all()[0].id, Some(a));
    }

    #[tokio::test]
    async fn queries_filter_and_order_newest_first() {
        let store = MemoryAuditStore::new();
        store
            .insert(&AuditRecord::success(Some(1), "createForm", "f", "ok"))
            .await
            .unwrap();
        store
            .insert(&AuditRecord::failure(Some(2), "createForm", "f", "boom"))
            .await
            .unwrap();
        store
            .insert(&AuditRecord::success(Some(1), "upload", "u", "ok"))
            .await
            .unwrap();

        let by_user = store.find_by_user(1).await.unwrap();
        assert_eq!(by_user.len(), 2);
        assert_eq!(by_user[0].operation, "upload");

        let by_op = store.find_by_operation("createForm").await.unwrap();
        assert_eq!(by_op.len(), 2);
        assert_eq!(by_op[0].user_id, Some(2));

        let errors = store.find_with_errors().await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn empty_results_are_not_errors() {
        let store = MemoryAuditStore::new();
        store.initialize().await.unwrap();
        assert!(store.find_by_user(99).await.unwrap().is_empty());
        assert!(store.find_by_operation("none").await.unwrap().is_empty());
    }
}
