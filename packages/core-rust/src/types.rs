use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier assigned by the remote service to a created object
/// (file, spreadsheet, or form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl RemoteId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure reported by a remote sub-service or its client layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The credential handshake was refused.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The transport under the client failed.
    ///
    /// A non-recoverable transport error poisons the connection that saw it.
    #[error("transport error: {message}")]
    Transport { message: String, recoverable: bool },
    /// The service answered with an error.
    #[error("remote service error: {0}")]
    Service(String),
}

impl RemoteError {
    /// `true` if the connection that produced this error must be discarded.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport { recoverable: false, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unrecoverable_transport_errors_are_fatal() {
        assert!(RemoteError::Transport {
            message: "reset".into(),
            recoverable: false
        }
        .is_fatal());
        assert!(!RemoteError::Transport {
            message: "throttled".into(),
            recoverable: true
        }
        .is_fatal());
        assert!(!RemoteError::Service("quota".into()).is_fatal());
        assert!(!RemoteError::Auth("denied".into()).is_fatal());
    }

    #[test]
    fn remote_id_serializes_as_plain_string() {
        let id = RemoteId("abc123".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
        assert_eq!(id.to_string(), "abc123");
    }
}
