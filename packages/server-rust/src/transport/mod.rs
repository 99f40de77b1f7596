//! Message transport: reply sessions and the in-process broker.

pub mod broker;
pub mod session;

pub use broker::{consume, InProcessBroker, DEFAULT_QUEUE_CAPACITY};
pub use session::{ReplySession, ReplyTransport, ScopedSession, TransportError};
