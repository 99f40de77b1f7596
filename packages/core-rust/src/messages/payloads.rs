//! JSON body shapes for structured operations.
//!
//! Field names are camelCase on the wire (`googleEmail`, `sheetTitle`,
//! `formTitle`) to match what producers already send.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Body of a `createSheet` message.
///
/// When `headers` is present the sheet is created pre-populated with
/// `headers` as the first row followed by `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSheetRequest {
    /// Account the new spreadsheet is shared with.
    pub google_email: String,
    pub sheet_title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub headers: Option<Vec<String>>,
    /// Data rows. Cells are arbitrary JSON values.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Vec<Vec<serde_json::Value>>>,
}

impl CreateSheetRequest {
    /// Splits off the initial contents, if the request carries any.
    ///
    /// Rows without headers are ignored; a header row with no `data` yields
    /// an empty row set.
    #[must_use]
    pub fn contents(&self) -> Option<SheetContents> {
        self.headers.as_ref().map(|headers| SheetContents {
            headers: headers.clone(),
            rows: self.data.clone().unwrap_or_default(),
        })
    }
}

/// Initial contents of a pre-populated spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetContents {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Body of a `createForm` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormRequest {
    /// Account the new form is shared with.
    pub google_email: String,
    /// Question title to question type (`text`, `paragraph`, ...).
    pub fields: BTreeMap<String, String>,
    pub form_title: String,
}
