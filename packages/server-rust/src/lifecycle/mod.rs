//! Component lifecycle: start/stop ordering and adapter status.

pub mod registry;
pub mod status;

pub use registry::{Lifecycle, LifecycleRegistry};
pub use status::{AdapterState, AdapterStatus, InFlightGuard};
