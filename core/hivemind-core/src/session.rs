//! File-backed session document.
//!
//! The store owns a single JSON document (`<root>/<store_name>.json`) and is
//! its only writer. Every mutation rewrites the full document through a temp
//! file + rename, so a crash mid-write leaves the previous version intact.
//!
//! # File Format
//!
//! ```json
//! {
//!   "init": true,
//!   "user": { "id": "1", "username": "u", "email": "e" },
//!   "token": "nonceHex:tagHex:cipherHex",
//!   "github_token": "nonceHex:tagHex:cipherHex",
//!   "activeWorkspaceId": "ws-1",
//!   "workspaces": []
//! }
//! ```
//!
//! # Defensive Design
//!
//! - Missing file: first run, default document
//! - Empty or corrupt JSON: default document, rewritten to disk, logged
//! - Missing fields: serde defaults
//! - Secrets that no longer decrypt: cleared to `null` on read

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{HivemindError, Result};
use crate::types::{User, Workspace};
use crate::vault;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDocument {
    /// Only set by a completed login; reverts solely through [`SessionStore::reset`].
    #[serde(rename = "init")]
    pub setup_complete: bool,
    #[serde(rename = "user")]
    pub current_user: Option<User>,
    #[serde(rename = "token")]
    pub primary_token_cipher: Option<String>,
    #[serde(rename = "github_token")]
    pub secondary_token_cipher: Option<String>,
    #[serde(rename = "activeWorkspaceId")]
    pub active_workspace_id: Option<String>,
    /// Last workspace list fetched from the backend.
    pub workspaces: Vec<Workspace>,
}

/// The two secrets kept encrypted at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretField {
    /// Backend API token (`token`).
    Primary,
    /// GitHub token (`github_token`).
    Secondary,
}

impl SecretField {
    pub fn wire_name(self) -> &'static str {
        match self {
            SecretField::Primary => "token",
            SecretField::Secondary => "github_token",
        }
    }

    fn slot(self, document: &mut SessionDocument) -> &mut Option<String> {
        match self {
            SecretField::Primary => &mut document.primary_token_cipher,
            SecretField::Secondary => &mut document.secondary_token_cipher,
        }
    }

    fn read(self, document: &SessionDocument) -> Option<&str> {
        match self {
            SecretField::Primary => document.primary_token_cipher.as_deref(),
            SecretField::Secondary => document.secondary_token_cipher.as_deref(),
        }
    }
}

/// Plain (unencrypted) document fields addressable by [`SessionStore::get`].
///
/// Token fields are absent on purpose: they are only reachable through
/// [`SecretField`], so plaintext can never be written into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    SetupComplete,
    CurrentUser,
    ActiveWorkspaceId,
    Workspaces,
}

/// A value for one [`SessionField`]; the variant names the field it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionValue {
    SetupComplete(bool),
    CurrentUser(Option<User>),
    ActiveWorkspaceId(Option<String>),
    Workspaces(Vec<Workspace>),
}

impl SessionValue {
    pub fn field(&self) -> SessionField {
        match self {
            SessionValue::SetupComplete(_) => SessionField::SetupComplete,
            SessionValue::CurrentUser(_) => SessionField::CurrentUser,
            SessionValue::ActiveWorkspaceId(_) => SessionField::ActiveWorkspaceId,
            SessionValue::Workspaces(_) => SessionField::Workspaces,
        }
    }
}

/// Owner of the session document, optionally backed by a file.
///
/// Create with [`SessionStore::load`] to read from disk, or
/// [`SessionStore::new_in_memory`] for tests.
pub struct SessionStore {
    document: SessionDocument,
    file_path: Option<PathBuf>,
    secret: String,
}

impl SessionStore {
    pub fn new_in_memory(secret: impl Into<String>) -> Self {
        SessionStore {
            document: SessionDocument::default(),
            file_path: None,
            secret: secret.into(),
        }
    }

    /// Loads the document at `file_path`. Never fails: unreadable or corrupt
    /// files are treated as a first run.
    pub fn load(file_path: &Path, secret: impl Into<String>) -> Self {
        let mut store = SessionStore {
            document: SessionDocument::default(),
            file_path: Some(file_path.to_path_buf()),
            secret: secret.into(),
        };

        let content = match fs_err::read_to_string(file_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %file_path.display(), "No session file; starting first run");
                return store;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read session file; using defaults");
                return store;
            }
        };

        if content.trim().is_empty() {
            tracing::warn!("Empty session file; replacing with defaults");
            store.persist_or_log();
            return store;
        }

        match serde_json::from_str::<SessionDocument>(&content) {
            Ok(document) => store.document = document,
            Err(err) => {
                tracing::warn!(error = %err, "Session file is corrupt; replacing with defaults");
                store.persist_or_log();
            }
        }

        store
    }

    pub fn document(&self) -> &SessionDocument {
        &self.document
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn setup_complete(&self) -> bool {
        self.document.setup_complete
    }

    pub fn current_user(&self) -> Option<&User> {
        self.document.current_user.as_ref()
    }

    pub fn active_workspace_id(&self) -> Option<&str> {
        self.document.active_workspace_id.as_deref()
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.document.workspaces
    }

    pub fn get(&self, field: SessionField) -> SessionValue {
        let document = &self.document;
        match field {
            SessionField::SetupComplete => SessionValue::SetupComplete(document.setup_complete),
            SessionField::CurrentUser => SessionValue::CurrentUser(document.current_user.clone()),
            SessionField::ActiveWorkspaceId => {
                SessionValue::ActiveWorkspaceId(document.active_workspace_id.clone())
            }
            SessionField::Workspaces => SessionValue::Workspaces(document.workspaces.clone()),
        }
    }

    /// Decrypts a stored secret.
    ///
    /// Returns `None` when unset. A token that fails to decrypt is cleared
    /// (and the cleared document persisted) before returning `None`.
    pub fn get_decrypted(&mut self, field: SecretField) -> Option<String> {
        let token = field.read(&self.document)?;
        match vault::decrypt(token, &self.secret) {
            Ok(plaintext) => Some(plaintext),
            Err(err) => {
                tracing::warn!(
                    field = field.wire_name(),
                    error = %err,
                    "Stored credential no longer decrypts; clearing it"
                );
                if let Err(err) = self.update(|document| *field.slot(document) = None) {
                    tracing::error!(error = %err, "Failed to persist cleared credential");
                }
                None
            }
        }
    }

    /// Setup is complete and the backend token still decrypts.
    pub fn is_authenticated(&mut self) -> bool {
        self.setup_complete() && self.get_decrypted(SecretField::Primary).is_some()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes (each one persists the full document)
    // ─────────────────────────────────────────────────────────────────────

    /// Applies `mutate` to the document, then persists it.
    pub fn update<F>(&mut self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut SessionDocument),
    {
        mutate(&mut self.document);
        self.save()
    }

    pub fn set(&mut self, value: SessionValue) -> Result<()> {
        self.update(|document| match value {
            SessionValue::SetupComplete(complete) => document.setup_complete = complete,
            SessionValue::CurrentUser(user) => document.current_user = user,
            SessionValue::ActiveWorkspaceId(id) => document.active_workspace_id = id,
            SessionValue::Workspaces(workspaces) => document.workspaces = workspaces,
        })
    }

    pub fn set_setup_complete(&mut self, complete: bool) -> Result<()> {
        self.set(SessionValue::SetupComplete(complete))
    }

    pub fn set_current_user(&mut self, user: Option<User>) -> Result<()> {
        self.set(SessionValue::CurrentUser(user))
    }

    pub fn set_active_workspace_id(&mut self, workspace_id: Option<String>) -> Result<()> {
        self.set(SessionValue::ActiveWorkspaceId(workspace_id))
    }

    pub fn set_workspaces(&mut self, workspaces: Vec<Workspace>) -> Result<()> {
        self.set(SessionValue::Workspaces(workspaces))
    }

    pub fn set_encrypted(&mut self, field: SecretField, plaintext: &str) -> Result<()> {
        let token = vault::encrypt(plaintext, &self.secret)?;
        self.update(|document| *field.slot(document) = Some(token))
    }

    /// Records a finished login in a single write.
    ///
    /// Tokens are encrypted before the document is touched, so a failure
    /// leaves the previous state in place.
    pub fn complete_setup(
        &mut self,
        user: User,
        token: Option<&str>,
        github_token: Option<&str>,
    ) -> Result<()> {
        let token = token
            .map(|value| vault::encrypt(value, &self.secret))
            .transpose()?;
        let github_token = github_token
            .map(|value| vault::encrypt(value, &self.secret))
            .transpose()?;

        self.update(|document| {
            document.current_user = Some(user);
            if let Some(token) = token {
                document.primary_token_cipher = Some(token);
            }
            if let Some(github_token) = github_token {
                document.secondary_token_cipher = Some(github_token);
            }
            document.setup_complete = true;
        })
    }

    /// Replaces the document with the unauthenticated default.
    pub fn reset(&mut self) -> Result<()> {
        tracing::info!("Resetting session document");
        self.update(|document| *document = SessionDocument::default())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    fn save(&self) -> Result<()> {
        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(&self.document)
            .map_err(|err| HivemindError::json("serializing session document", err))?;

        let parent_dir = file_path
            .parent()
            .ok_or_else(|| HivemindError::Io {
                context: "session file path has no parent directory".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
            })?;
        fs_err::create_dir_all(parent_dir)
            .map_err(|err| HivemindError::io("creating session directory", err))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|err| HivemindError::io("creating temp session file", err))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|err| HivemindError::io("writing temp session file", err))?;
        temp_file
            .flush()
            .map_err(|err| HivemindError::io("flushing temp session file", err))?;
        temp_file
            .persist(file_path)
            .map_err(|err| HivemindError::io("replacing session file", err.error))?;

        Ok(())
    }

    fn persist_or_log(&self) {
        if let Err(err) = self.save() {
            tracing::warn!(error = %err, "Failed to rewrite session file");
        }
    }
}
