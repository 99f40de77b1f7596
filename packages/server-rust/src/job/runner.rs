//! Scheduled maintenance job: refreshes the top-apps aggregate and records
//! the outcome in the audit trail.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bridge_core::{AuditRecord, RemoteError};
use tracing::{info, warn};

use super::trigger::ScheduledJob;
use crate::audit::AuditSink;
use crate::connection::{ConnectionFactory, PoolError};

/// Operation tag written to the audit trail.
pub const JOB_OPERATION: &str = "updateAppsTop";
/// Target description written to the audit trail.
pub const JOB_TARGET: &str = "all spreadsheets";
/// Result text of a successful refresh.
pub const JOB_SUCCESS_MESSAGE: &str = "Apps top updated successfully";

/// Idle -> Running -> {Succeeded, Failed} -> Idle
///
/// The terminal state holds while the audit record is written; the outcome
/// stays readable through [`ScheduledJobRunner::last_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("connection unavailable: {0}")]
    Pool(#[from] PoolError),
    #[error("maintenance call failed: {0}")]
    Remote(#[from] RemoteError),
}

/// Runs the maintenance call once per tick.
///
/// Assumes single entrancy; overlapping ticks are skipped by the trigger.
pub struct ScheduledJobRunner {
    factory: ConnectionFactory,
    sink: Option<Arc<AuditSink>>,
    state: ArcSwap<JobState>,
    last_outcome: ArcSwap<Option<AuditRecord>>,
}

impl ScheduledJobRunner {
    #[must_use]
    pub fn new(factory: ConnectionFactory, sink: Option<Arc<AuditSink>>) -> Self {
        Self {
            factory,
            sink,
            state: ArcSwap::from_pointee(JobState::Idle),
            last_outcome: ArcSwap::from_pointee(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        **self.state.load()
    }

    /// Audit record built by the most recent tick, whether or not it was
    /// persisted.
    #[must_use]
    pub fn last_outcome(&self) -> Option<AuditRecord> {
        (**self.last_outcome.load()).clone()
    }

    /// Runs one tick: invokes the maintenance call, writes the audit record,
    /// and returns to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns the pool or remote failure after the failure record has been
    /// handed to the sink.
    pub async fn tick(&self) -> Result<(), JobError> {
        self.state.store(Arc::new(JobState::Running));
        let outcome = self.refresh().await;

        let record = match &outcome {
            Ok(()) => {
                self.state.store(Arc::new(JobState::Succeeded));
                info!(operation = JOB_OPERATION, "maintenance tick succeeded");
                AuditRecord::success(None, JOB_OPERATION, JOB_TARGET, JOB_SUCCESS_MESSAGE)
            }
            Err(err) => {
                self.state.store(Arc::new(JobState::Failed));
                warn!(operation = JOB_OPERATION, error = %err, "maintenance tick failed");
                AuditRecord::failure(None, JOB_OPERATION, JOB_TARGET, failure_text(err))
            }
        };

        if let Some(sink) = &self.sink {
            sink.save(&record).await;
        }
        self.last_outcome.store(Arc::new(Some(record)));
        self.state.store(Arc::new(JobState::Idle));
        outcome
    }

    async fn refresh(&self) -> Result<(), JobError> {
        let pooled = self.factory.get_connection().await?;
        pooled.connection()?.update_apps_top().await?;
        Ok(())
    }
}

/// Message stored in the `error` column: the underlying failure's text.
fn failure_text(err: &JobError) -> String {
    match err {
        JobError::Pool(inner) => inner.to_string(),
        JobError::Remote(inner) => inner.to_string(),
    }
}

#[async_trait]
impl ScheduledJob for ScheduledJobRunner {
    fn name(&self) -> &'static str {
        JOB_OPERATION
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.tick().await?;
        Ok(())
    }
}

impl std::fmt::Debug for ScheduledJobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJobRunner")
            .field("state", &self.state())
            .field("audited", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
