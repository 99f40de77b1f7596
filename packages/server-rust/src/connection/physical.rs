//! Physical connection: live handles to the three remote sub-services.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_core::{
    CreateFormRequest, CreateSheetRequest, CredentialRef, DocumentService, FormService, RemoteError,
    RemoteId, SheetContents, SpreadsheetService,
};
use tracing::warn;

/// A live binding to the remote service's sub-APIs for one credential set.
///
/// The handles never change after construction. The only mutable state is a
/// broken flag, raised when a call fails with a non-recoverable transport
/// error; the pool discards broken connections instead of reusing them.
pub struct Connection {
    credential: CredentialRef,
    documents: Arc<dyn DocumentService>,
    spreadsheets: Arc<dyn SpreadsheetService>,
    forms: Arc<dyn FormService>,
    broken: AtomicBool,
}

impl Connection {
    #[must_use]
    pub fn new(
        credential: CredentialRef,
        documents: Arc<dyn DocumentService>,
        spreadsheets: Arc<dyn SpreadsheetService>,
        forms: Arc<dyn FormService>,
    ) -> Self {
        Self {
            credential,
            documents,
            spreadsheets,
            forms,
            broken: AtomicBool::new(false),
        }
    }

    /// Credential identity this connection was established with.
    #[must_use]
    pub fn credential(&self) -> &CredentialRef {
        &self.credential
    }

    /// `true` once a call has failed with a fatal transport error.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Marks the connection unusable for future checkouts.
    pub fn mark_broken(&self) {
        self.broken.store(true, Ordering::Release);
    }

    /// Stores `content` under `file_name` in document storage.
    ///
    /// # Errors
    ///
    /// Propagates the remote failure.
    pub async fn upload(&self, file_name: &str, content: &[u8]) -> Result<RemoteId, RemoteError> {
        self.track(self.documents.upload(file_name, content).await)
    }

    /// # Errors
    ///
    /// Propagates the remote failure.
    pub async fn create_sheet(&self, request: &CreateSheetRequest) -> Result<RemoteId, RemoteError> {
        self.track(self.spreadsheets.create_sheet(request).await)
    }

    /// # Errors
    ///
    /// Propagates the remote failure.
    pub async fn create_sheet_with_data(
        &self,
        request: &CreateSheetRequest,
        contents: &SheetContents,
    ) -> Result<RemoteId, RemoteError> {
        self.track(self.spreadsheets.create_sheet_with_data(request, contents).await)
    }

    /// # Errors
    ///
    /// Propagates the remote failure.
    pub async fn create_form(
        &self,
        request: &CreateFormRequest,
        user_id: Option<i64>,
    ) -> Result<RemoteId, RemoteError> {
        self.track(self.forms.create_form(request, user_id).await)
    }

    /// Refreshes the top-apps aggregate across all spreadsheets.
    ///
    /// # Errors
    ///
    /// Propagates the remote failure.
    pub async fn update_apps_top(&self) -> Result<(), RemoteError> {
        self.track(self.spreadsheets.update_apps_top().await)
    }

    fn track<T>(&self, result: Result<T, RemoteError>) -> Result<T, RemoteError> {
        if let Err(err) = &result {
            if err.is_fatal() {
                warn!(credential = %self.credential, error = %err, "connection marked broken");
                self.mark_broken();
            }
        }
        result
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("credential", &self.credential)
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}
