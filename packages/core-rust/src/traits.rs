use async_trait::async_trait;

use crate::messages::{CreateFormRequest, CreateSheetRequest, SheetContents};
use crate::types::{RemoteError, RemoteId};

/// Document storage sub-service.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Stores `content` under `file_name`, returning the new file's id.
    async fn upload(&self, file_name: &str, content: &[u8]) -> Result<RemoteId, RemoteError>;
}

/// Spreadsheet sub-service.
#[async_trait]
pub trait SpreadsheetService: Send + Sync {
    /// Creates an empty spreadsheet shared with the requesting account.
    async fn create_sheet(&self, request: &CreateSheetRequest) -> Result<RemoteId, RemoteError>;

    /// Creates a spreadsheet whose first row is `contents.headers`
    /// followed by `contents.rows`.
    async fn create_sheet_with_data(
        &self,
        request: &CreateSheetRequest,
        contents: &SheetContents,
    ) -> Result<RemoteId, RemoteError>;

    /// Recomputes the top-apps aggregate across all spreadsheets.
    ///
    /// Long-running; driven by the scheduled maintenance job.
    async fn update_apps_top(&self) -> Result<(), RemoteError>;
}

/// Form sub-service.
#[async_trait]
pub trait FormService: Send + Sync {
    /// Creates a form with one question per entry in `request.fields`.
    async fn create_form(
        &self,
        request: &CreateFormRequest,
        user_id: Option<i64>,
    ) -> Result<RemoteId, RemoteError>;
}
