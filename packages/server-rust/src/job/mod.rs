//! Scheduled maintenance: the job runner and its periodic trigger.

pub mod runner;
pub mod trigger;

pub use runner::{JobError, JobState, ScheduledJobRunner, JOB_OPERATION, JOB_TARGET};
pub use trigger::{JobSchedule, PeriodicTrigger, ScheduledJob};
