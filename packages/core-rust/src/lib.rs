//! Suite Bridge Core — message envelope, operation payloads, credentials,
//! audit records, and remote sub-service traits.

pub mod audit;
pub mod credentials;
pub mod messages;
pub mod traits;
pub mod types;

pub use audit::{AuditRecord, OPERATION_MAX_LEN};
pub use credentials::{CredentialRef, CredentialSet};
pub use messages::{CreateFormRequest, CreateSheetRequest, Message, MessageMetadata, SheetContents};
pub use traits::{DocumentService, FormService, SpreadsheetService};
pub use types::{RemoteError, RemoteId};
