//! Short-lived producer sessions used to send replies.
//!
//! A session is opened per reply and closed afterwards; there is no producer
//! pooling. [`ScopedSession`] closes the session on every exit path,
//! including a failed send and unwinding.

use async_trait::async_trait;
use bridge_core::Message;

/// Errors raised by a message transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown destination: {0}")]
    UnknownDestination(String),
    #[error("destination {0} is full")]
    DestinationFull(String),
    #[error("transport is closed")]
    Closed,
    #[error("envelope encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// A producer session able to send messages to named destinations.
#[async_trait]
pub trait ReplySession: Send {
    async fn send(&mut self, destination: &str, message: &Message) -> Result<(), TransportError>;

    /// Releases the session. Called exactly once by [`ScopedSession`].
    fn close(&mut self);
}

/// Opens producer sessions.
pub trait ReplyTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns a `TransportError` if no session can be opened.
    fn open_session(&self) -> Result<Box<dyn ReplySession>, TransportError>;
}

/// A session that is closed when this value goes out of scope.
pub struct ScopedSession {
    session: Option<Box<dyn ReplySession>>,
}

impl ScopedSession {
    /// Opens a session on `transport`.
    ///
    /// # Errors
    ///
    /// Propagates the transport's open failure.
    pub fn open(transport: &dyn ReplyTransport) -> Result<Self, TransportError> {
        Ok(Self {
            session: Some(transport.open_session()?),
        })
    }

    /// Sends `message` to `destination`.
    ///
    /// # Errors
    ///
    /// Propagates the transport's send failure. The session is still closed
    /// when the guard is dropped.
    pub async fn send(&mut self, destination: &str, message: &Message) -> Result<(), TransportError> {
        match self.session.as_mut() {
            Some(session) => session.send(destination, message).await,
            None => Err(TransportError::Closed),
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}
