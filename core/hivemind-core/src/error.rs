//! Error types for hivemind-core operations.
//!
//! The first block mirrors the recovery taxonomy callers branch on. Vault and
//! storage failures are healed close to the source; network failures travel up
//! to the view layer, which owns retry and messaging.

use hivemind_protocol::ErrorInfo;

/// All errors that can occur in hivemind-core operations.
#[derive(Debug, thiserror::Error)]
pub enum HivemindError {
    // ─────────────────────────────────────────────────────────────────────
    // Recovery taxonomy
    // ─────────────────────────────────────────────────────────────────────
    /// Stored secret could not be decrypted (rotated key, tampering, corrupt token).
    #[error("Credential vault failure: {0}")]
    Decryption(#[from] crate::vault::VaultError),

    /// Backend answered 401. The session has already been reset when this is returned.
    #[error("Session is no longer authorized")]
    Unauthorized,

    #[error("Request failed with HTTP status {status}")]
    Api { status: u16 },

    #[error("Malformed deep link: {0}")]
    DeepLinkParse(String),

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Application data directory not found")]
    NoDataDir,

    #[error("Invalid API base URL {url}: {details}")]
    InvalidBaseUrl { url: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP transport error: {context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Single-instance lock unavailable: {0}")]
    InstanceLock(String),

    // ─────────────────────────────────────────────────────────────────────
    // Action Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Window operation failed: {0}")]
    Window(String),

    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Platform not supported for this operation: {0}")]
    UnsupportedPlatform(String),
}

/// Convenience type alias for Results using HivemindError.
pub type Result<T> = std::result::Result<T, HivemindError>;

impl HivemindError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        HivemindError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        HivemindError::Json {
            context: context.into(),
            source,
        }
    }

    /// Stable protocol code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            HivemindError::Decryption(_) => "decryption_failed",
            HivemindError::Unauthorized => "unauthorized",
            HivemindError::Api { .. } => "api_error",
            HivemindError::DeepLinkParse(_) => "deep_link_parse",
            HivemindError::NoDataDir | HivemindError::InvalidBaseUrl { .. } => "config_error",
            HivemindError::Io { .. } => "io_error",
            HivemindError::Json { .. } => "json_error",
            HivemindError::Http { .. } => "network_error",
            HivemindError::InstanceLock(_) => "instance_lock",
            HivemindError::Window(_) => "window_error",
            HivemindError::CommandFailed { .. } => "command_failed",
            HivemindError::UnsupportedPlatform(_) => "unsupported_platform",
        }
    }
}

impl From<&HivemindError> for ErrorInfo {
    fn from(err: &HivemindError) -> Self {
        let info = ErrorInfo::new(err.code(), err.to_string());
        match err {
            HivemindError::Api { status } => info.with_status(*status),
            HivemindError::Unauthorized => info.with_status(401),
            _ => info,
        }
    }
}

// Conversion for string error compatibility
impl From<HivemindError> for String {
    fn from(err: HivemindError) -> String {
        err.to_string()
    }
}
