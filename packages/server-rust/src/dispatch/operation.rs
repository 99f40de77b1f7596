use bridge_core::{CreateFormRequest, CreateSheetRequest, RemoteError, SheetContents};

use crate::connection::PoolError;
use crate::transport::TransportError;

/// Routing tags of the known operations.
pub mod operation_names {
    pub const UPLOAD: &str = "upload";
    pub const CREATE_SHEET: &str = "createSheet";
    pub const CREATE_FORM: &str = "createForm";
}

/// File name uploads are stored under.
pub const UPLOAD_FILE_NAME: &str = "uploaded_file.txt";

/// A classified inbound message, one variant per known operation.
///
/// Tags outside the known set land in [`Command::Unknown`], which is answered
/// with a textual response instead of failing the delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Store the raw body under [`UPLOAD_FILE_NAME`].
    Upload { content: Vec<u8> },
    /// Create an empty spreadsheet.
    CreateSheet(CreateSheetRequest),
    /// Create a spreadsheet pre-populated with headers and rows.
    CreateSheetWithData {
        request: CreateSheetRequest,
        contents: SheetContents,
    },
    /// Create a form; the user id comes from the message properties.
    CreateForm {
        request: CreateFormRequest,
        user_id: Option<i64>,
    },
    Unknown { tag: String },
}

impl Command {
    /// Low-cardinality label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Upload { .. } => operation_names::UPLOAD,
            Self::CreateSheet(_) | Self::CreateSheetWithData { .. } => operation_names::CREATE_SHEET,
            Self::CreateForm { .. } => operation_names::CREATE_FORM,
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Failures while handling one message. Each aborts that message only.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed {operation} payload: {source}")]
    Deserialize {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("connection unavailable: {0}")]
    Pool(#[from] PoolError),
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("reply to {destination} failed: {source}")]
    Reply {
        destination: String,
        #[source]
        source: TransportError,
    },
    #[error("adapter is not accepting messages")]
    Unavailable,
}

/// Formats the response for a tag outside the known set.
#[must_use]
pub fn unknown_operation_response(tag: &str) -> String {
    format!("Unknown operation: {tag}")
}
