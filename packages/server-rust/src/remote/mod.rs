//! Remote sub-service backends.

pub mod loopback;

pub use loopback::{LoopbackBackend, LoopbackConnector};
