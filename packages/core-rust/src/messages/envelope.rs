//! Transport envelope: routing tag, opaque body, and correlation metadata.
//!
//! Envelopes travel over the wire as named `MsgPack` maps produced by
//! `rmp_serde::to_vec_named()` with camelCase field names.

use serde::{Deserialize, Serialize};

/// Routing and correlation properties carried alongside a message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Caller's user id. Only `createForm` consumes it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<i64>,
    /// Destination a reply should be sent to. Absent means fire-and-forget.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply_to: Option<String>,
    /// Id of the request this message answers, set on replies.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation_id: Option<String>,
}

/// A single message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Transport-assigned message id.
    pub id: String,
    /// Routing property naming the operation. `None` on replies.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation: Option<String>,
    /// Opaque body: raw bytes for uploads, JSON for structured operations.
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    /// Creates a request message with a fresh id and empty metadata.
    #[must_use]
    pub fn request(operation: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: Some(operation.into()),
            body,
            metadata: MessageMetadata::default(),
        }
    }

    /// Sets the user id property.
    #[must_use]
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.metadata.user_id = Some(user_id);
        self
    }

    /// Sets the reply destination.
    #[must_use]
    pub fn with_reply_to(mut self, destination: impl Into<String>) -> Self {
        self.metadata.reply_to = Some(destination.into());
        self
    }

    /// Builds the textual reply correlated with this message.
    #[must_use]
    pub fn reply(&self, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: None,
            body: text.as_bytes().to_vec(),
            metadata: MessageMetadata {
                user_id: None,
                reply_to: None,
                correlation_id: Some(self.id.clone()),
            },
        }
    }

    /// Interprets the body as UTF-8 text, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Encodes a message as a named `MsgPack` map.
///
/// # Errors
///
/// Returns the `rmp_serde` encode error if serialization fails.
pub fn encode(message: &Message) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(message)
}

/// Decodes a message previously produced by [`encode`].
///
/// # Errors
///
/// Returns the `rmp_serde` decode error for truncated or foreign input.
pub fn decode(bytes: &[u8]) -> Result<Message, rmp_serde::decode::Error> {
    rmp_serde::from_slice(bytes)
}
