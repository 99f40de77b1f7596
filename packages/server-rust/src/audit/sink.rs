//! Best-effort audit sink.
//!
//! Callers hand a record to [`AuditSink::save`] after the operation it
//! documents has finished. A failed write is logged and counted, never
//! returned: the operation's outcome stands regardless of the audit trail.

use std::sync::Arc;

use bridge_core::AuditRecord;
use tracing::{debug, error};

use crate::traits::AuditStore;

/// Wraps an [`AuditStore`] and swallows write failures.
#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn AuditStore>,
}

impl AuditSink {
    /// Initializes the store schema and returns the sink.
    ///
    /// # Errors
    ///
    /// Propagates the store's `initialize` failure; a sink whose schema
    /// cannot be created is a startup error.
    pub async fn open(store: Arc<dyn AuditStore>) -> anyhow::Result<Self> {
        store.initialize().await?;
        Ok(Self { store })
    }

    /// Persists `record`. Returns the assigned id, or `None` if the write
    /// failed.
    pub async fn save(&self, record: &AuditRecord) -> Option<i64> {
        match self.store.insert(record).await {
            Ok(id) => {
                debug!(record_id = id, operation = %record.operation, "audit record saved");
                Some(id)
            }
            Err(err) => {
                error!(
                    operation = %record.operation,
                    target = %record.target_value,
                    error = %err,
                    "audit write failed; record dropped"
                );
                metrics::counter!("bridge_audit_write_failures_total").increment(1);
                None
            }
        }
    }

    /// Records written for `user_id`, most recent first.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn find_by_user(&self, user_id: i64) -> anyhow::Result<Vec<AuditRecord>> {
        self.store.find_by_user(user_id).await
    }

    /// Records with the given operation tag, most recent first.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn find_by_operation(&self, operation: &str) -> anyhow::Result<Vec<AuditRecord>> {
        self.store.find_by_operation(operation).await
    }

    /// Failure records, most recent first.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn find_with_errors(&self) -> anyhow::Result<Vec<AuditRecord>> {
        self.store.find_with_errors().await
    }
}

impl std::fmt::Debug for AuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditSink").finish_non_exhaustive()
    }
}
