//! Periodic trigger for scheduled jobs.
//!
//! Spawns a tokio task that runs a [`ScheduledJob`] on a fixed interval and
//! on demand. Each run gets its own task, so a failed or panicking run is
//! logged and counted and the next tick still fires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::lifecycle::Lifecycle;

// ---------------------------------------------------------------------------
// ScheduledJob trait
// ---------------------------------------------------------------------------

/// A unit of work fired by [`PeriodicTrigger`].
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Runs once. An error marks the tick failed but does not stop the trigger.
    async fn run(&self) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// PeriodicTrigger
// ---------------------------------------------------------------------------

/// Fires a job on a fixed interval.
///
/// Runs are sequential within one trigger: a tick that comes due while the
/// previous run is still executing is skipped, not queued.
pub struct PeriodicTrigger {
    run_now: Option<mpsc::Sender<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTrigger {
    /// Starts the trigger. The first run happens one `interval` after start.
    #[must_use]
    pub fn start(job: Arc<dyn ScheduledJob>, interval: Duration) -> Self {
        let (run_now, mut run_now_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            info!(job = job.name(), interval = ?interval, "trigger started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => fire(&job).await,
                    request = run_now_rx.recv() => match request {
                        Some(()) => fire(&job).await,
                        None => break,
                    },
                    _ = &mut shutdown_rx => break,
                }
            }

            info!(job = job.name(), "trigger stopped");
        });

        Self {
            run_now: Some(run_now),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Requests an immediate run. Coalesced with an already pending request.
    ///
    /// # Errors
    ///
    /// Returns an error if the trigger has been stopped.
    pub fn run_now(&self) -> anyhow::Result<()> {
        match &self.run_now {
            Some(tx) => match tx.try_send(()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
                Err(mpsc::error::TrySendError::Closed(())) => {
                    Err(anyhow::anyhow!("trigger task has exited"))
                }
            },
            None => Err(anyhow::anyhow!("trigger not running")),
        }
    }

    /// Stops the trigger, waiting for an in-progress run to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.run_now.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

// ---------------------------------------------------------------------------
// JobSchedule
// ---------------------------------------------------------------------------

/// Lifecycle component owning the trigger of one job.
pub struct JobSchedule {
    job: Arc<dyn ScheduledJob>,
    interval: Duration,
    trigger: tokio::sync::Mutex<Option<PeriodicTrigger>>,
}

impl JobSchedule {
    #[must_use]
    pub fn new(job: Arc<dyn ScheduledJob>, interval: Duration) -> Self {
        Self {
            job,
            interval,
            trigger: tokio::sync::Mutex::new(None),
        }
    }

    /// Requests an immediate run if the schedule is started.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule is not running.
    pub async fn run_now(&self) -> anyhow::Result<()> {
        match self.trigger.lock().await.as_ref() {
            Some(trigger) => trigger.run_now(),
            None => Err(anyhow::anyhow!("schedule not started")),
        }
    }
}

#[async_trait]
impl Lifecycle for JobSchedule {
    fn name(&self) -> &'static str {
        "job-schedule"
    }

    async fn start(&self) -> anyhow::Result<()> {
        let mut slot = self.trigger.lock().await;
        if slot.is_none() {
            *slot = Some(PeriodicTrigger::start(Arc::clone(&self.job), self.interval));
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(mut trigger) = self.trigger.lock().await.take() {
            trigger.stop().await;
        }
        Ok(())
    }
}

async fn fire(job: &Arc<dyn ScheduledJob>) {
    let name = job.name();
    debug!(job = name, "tick");
    let run = tokio::spawn({
        let job = Arc::clone(job);
        async move { job.run().await }
    });
    let outcome = match run.await {
        Ok(Ok(())) => "ok",
        Err(err) => {
            error!(job = name, error = %err, "scheduled run aborted; next tick still fires");
            "panic"
        }
        Ok(Err(err)) => {
            warn!(job = name, error = %err, "scheduled run failed; next tick still fires");
            "error"
        }
    };
    metrics::counter!("bridge_job_ticks_total", "job" => name, "outcome" => outcome).increment(1);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
