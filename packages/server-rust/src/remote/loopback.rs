//! In-process implementation of the three remote sub-services.
//!
//! Objects live in memory and receive UUID identifiers. Used as the default
//! backend of the `bridge` binary and as the remote side in tests. Failures
//! can be injected with [`LoopbackBackend::fail_next`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_core::{
    CreateFormRequest, CreateSheetRequest, CredentialSet, DocumentService, FormService, RemoteError,
    RemoteId, SheetContents, SpreadsheetService,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::connection::{Connection, Connector};

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub content: Vec<u8>,
}

/// A stored spreadsheet. Row 0 holds the headers when present.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSheet {
    pub owner: String,
    pub title: String,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// A stored form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredForm {
    pub owner: String,
    pub title: String,
    pub questions: Vec<(String, String)>,
    pub user_id: Option<i64>,
}

/// In-memory remote service.
#[derive(Debug, Default)]
pub struct LoopbackBackend {
    files: DashMap<RemoteId, StoredFile>,
    sheets: DashMap<RemoteId, StoredSheet>,
    forms: DashMap<RemoteId, StoredForm>,
    apps_top: RwLock<Vec<(String, usize)>>,
    refreshes: AtomicU64,
    injected: Mutex<Option<RemoteError>>,
}

impl LoopbackBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call on any sub-service fail with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        *self.injected.lock() = Some(error);
    }

    #[must_use]
    pub fn file(&self, id: &RemoteId) -> Option<StoredFile> {
        self.files.get(id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn sheet(&self, id: &RemoteId) -> Option<StoredSheet> {
        self.sheets.get(id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn form(&self, id: &RemoteId) -> Option<StoredForm> {
        self.forms.get(id).map(|entry| entry.value().clone())
    }

    /// Owners ranked by number of spreadsheets, as of the last refresh.
    #[must_use]
    pub fn apps_top(&self) -> Vec<(String, usize)> {
        self.apps_top.read().clone()
    }

    /// Number of successful `update_apps_top` calls.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    fn check_injected(&self) -> Result<(), RemoteError> {
        match self.injected.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id() -> RemoteId {
        RemoteId(uuid::Uuid::new_v4().simple().to_string())
    }
}

#[async_trait]
impl DocumentService for LoopbackBackend {
    async fn upload(&self, file_name: &str, content: &[u8]) -> Result<RemoteId, RemoteError> {
        self.check_injected()?;
        let id = Self::next_id();
        self.files.insert(
            id.clone(),
            StoredFile {
                name: file_name.to_string(),
                content: content.to_vec(),
            },
        );
        debug!(file_id = %id, file_name, bytes = content.len(), "loopback file stored");
        Ok(id)
    }
}

#[async_trait]
impl SpreadsheetService for LoopbackBackend {
    async fn create_sheet(&self, request: &CreateSheetRequest) -> Result<RemoteId, RemoteError> {
        self.check_injected()?;
        let id = Self::next_id();
        self.sheets.insert(
            id.clone(),
            StoredSheet {
                owner: request.google_email.clone(),
                title: request.sheet_title.clone(),
                rows: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn create_sheet_with_data(
        &self,
        request: &CreateSheetRequest,
        contents: &SheetContents,
    ) -> Result<RemoteId, RemoteError> {
        self.check_injected()?;
        let id = Self::next_id();
        let header_row = contents
            .headers
            .iter()
            .map(|h| serde_json::Value::String(h.clone()))
            .collect();
        let mut rows = Vec::with_capacity(contents.rows.len() + 1);
        rows.push(header_row);
        rows.extend(contents.rows.iter().cloned());
        self.sheets.insert(
            id.clone(),
            StoredSheet {
                owner: request.google_email.clone(),
                title: request.sheet_title.clone(),
                rows,
            },
        );
        Ok(id)
    }

    async fn update_apps_top(&self) -> Result<(), RemoteError> {
        self.check_injected()?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in &self.sheets {
            *counts.entry(entry.value().owner.clone()).or_default() += 1;
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        *self.apps_top.write() = ranked;
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl FormService for LoopbackBackend {
    async fn create_form(
        &self,
        request: &CreateFormRequest,
        user_id: Option<i64>,
    ) -> Result<RemoteId, RemoteError> {
        self.check_injected()?;
        let id = Self::next_id();
        self.forms.insert(
            id.clone(),
            StoredForm {
                owner: request.google_email.clone(),
                title: request.form_title.clone(),
                questions: request
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                user_id,
            },
        );
        Ok(id)
    }
}

/// Connector handing out connections bound to one shared [`LoopbackBackend`].
///
/// The handshake rejects credential sets with an empty private key.
#[derive(Debug, Default)]
pub struct LoopbackConnector {
    backend: Arc<LoopbackBackend>,
    handshakes: AtomicU64,
}

impl LoopbackConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<LoopbackBackend> {
        &self.backend
    }

    /// Number of successful handshakes performed.
    #[must_use]
    pub fn handshakes(&self) -> u64 {
        self.handshakes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, credentials: &CredentialSet) -> Result<Connection, RemoteError> {
        if credentials.private_key.trim().is_empty() {
            return Err(RemoteError::Auth(format!(
                "no signing key for {}",
                credentials.client_email
            )));
        }
        self.handshakes.fetch_add(1, Ordering::Relaxed);
        let backend = Arc::clone(&self.backend);
        Ok(Connection::new(
            credentials.reference(),
            backend.clone(),
            backend.clone(),
            backend,
        ))
    }
}
