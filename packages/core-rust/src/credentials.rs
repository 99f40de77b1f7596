//! Service-account credentials and the identity used to pool connections.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A physical credential set read from a service-account JSON file.
///
/// Each distinct credential set gets its own pooled connections; the pool
/// keys them by [`CredentialRef`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    /// Service account identity.
    pub client_email: String,
    /// Identifier of the signing key.
    pub private_key_id: String,
    /// PEM-encoded signing key.
    pub private_key: String,
    /// Owning project, when present in the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl CredentialSet {
    /// Parses a credential set from the JSON contents of a credentials file.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the document is not a
    /// valid credential object.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Computes the pooling identity for this credential set.
    #[must_use]
    pub fn reference(&self) -> CredentialRef {
        let mut hasher = Sha256::new();
        hasher.update(self.client_email.as_bytes());
        hasher.update([0]);
        hasher.update(self.private_key_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.private_key.as_bytes());
        CredentialRef {
            client_email: self.client_email.clone(),
            fingerprint: hex::encode(hasher.finalize()),
        }
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Identity of a credential set: the account email plus a SHA-256
/// fingerprint of the key material.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialRef {
    client_email: String,
    fingerprint: String,
}

impl CredentialRef {
    #[must_use]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Hex-encoded SHA-256 fingerprint of the key material.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..12).unwrap_or(&self.fingerprint);
        write!(f, "{}#{short}", self.client_email)
    }
}
