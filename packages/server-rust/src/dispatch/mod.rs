//! Message dispatch: classification of inbound messages and routing to the
//! remote operations.

pub mod classify;
pub mod dispatcher;
pub mod operation;

pub use classify::classify;
pub use dispatcher::MessageDispatcher;
pub use operation::{operation_names, unknown_operation_response, Command, DispatchError, UPLOAD_FILE_NAME};
