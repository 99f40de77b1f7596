//! Message envelope and operation body schemas.

pub mod envelope;
pub mod payloads;

pub use envelope::{decode, encode, Message, MessageMetadata};
pub use payloads::{CreateFormRequest, CreateSheetRequest, SheetContents};
