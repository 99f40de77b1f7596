//! Message classification: routing tag + body -> typed [`Command`].

use bridge_core::{CreateFormRequest, CreateSheetRequest, MessageMetadata};
use serde::de::DeserializeOwned;

use super::operation::{operation_names, Command, DispatchError};

/// Classifies an inbound message.
///
/// Unknown tags never fail; their body is not inspected.
///
/// # Errors
///
/// Returns `DispatchError::Deserialize` if a known operation's body does not
/// match the expected JSON shape.
pub fn classify(
    tag: &str,
    body: &[u8],
    metadata: &MessageMetadata,
) -> Result<Command, DispatchError> {
    match tag {
        operation_names::UPLOAD => Ok(Command::Upload {
            content: body.to_vec(),
        }),
        operation_names::CREATE_SHEET => {
            let request: CreateSheetRequest = parse(operation_names::CREATE_SHEET, body)?;
            Ok(match request.contents() {
                Some(contents) => Command::CreateSheetWithData { request, contents },
                None => Command::CreateSheet(request),
            })
        }
        operation_names::CREATE_FORM => {
            let request: CreateFormRequest = parse(operation_names::CREATE_FORM, body)?;
            Ok(Command::CreateForm {
                request,
                user_id: metadata.user_id,
            })
        }
        other => Ok(Command::Unknown {
            tag: other.to_string(),
        }),
    }
}

fn parse<T: DeserializeOwned>(operation: &'static str, body: &[u8]) -> Result<T, DispatchError> {
    serde_json::from_slice(body).map_err(|source| DispatchError::Deserialize { operation, source })
}
