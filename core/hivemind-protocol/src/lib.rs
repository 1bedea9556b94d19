//! Control protocol for the Hivemind desktop shell.
//!
//! The view layer (and the headless stdin channel) talks to the shell with
//! newline-delimited JSON requests. A second process launch uses the same
//! framing to hand its argv to the running instance.
//!
//! Types live in their own crate so the shell and its clients cannot drift.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 256 * 1024;
pub const MAX_HANDOFF_ARGS: usize = 64;

/// Every command the view layer may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    // Window triggers
    OpenMainWindow,
    OpenSideWindow,
    SetIgnoreMouse,
    WindowClosed,
    Activate,
    Quit,

    // Session
    Init,
    StartOauth,
    WorkspaceChanged,
    GetActiveWorkspaceId,
    GetStatus,

    // Backend passthrough
    FetchWorkspaces,
    FetchWorkspace,
    FetchFeatures,
    FetchTasks,
    CreateTask,
    CreateFeature,
    CreateWorkspace,
    FetchGithubRepos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: None,
            params,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    /// HTTP status for `api_error` responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_empty(id: Option<String>) -> Self {
        Self::ok(id, Value::Null)
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self::error_with_info(id, ErrorInfo::new(code, message))
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Params
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IdParams {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceParams {
    pub workspace_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IgnoreMouseParams {
    pub ignore: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TaskFilterParams {
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub feature: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WindowParams {
    pub window_id: u64,
}

/// Decodes request params into `T`, treating absent params as JSON `null`.
pub fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorInfo> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("params did not match the expected shape: {}", err),
        )
    })
}

/// Like [`parse_params`] but additionally rejects blank string ids.
pub fn parse_id_params(params: Option<Value>) -> Result<IdParams, ErrorInfo> {
    let parsed: IdParams = parse_params(params)?;
    require_non_blank(&parsed.id, "id")?;
    Ok(parsed)
}

pub fn parse_workspace_params(params: Option<Value>) -> Result<WorkspaceParams, ErrorInfo> {
    let parsed: WorkspaceParams = parse_params(params)?;
    require_non_blank(&parsed.workspace_id, "workspace_id")?;
    Ok(parsed)
}

/// Accepts missing params as an unfiltered query.
pub fn parse_task_filter(params: Option<Value>) -> Result<TaskFilterParams, ErrorInfo> {
    match params {
        None | Some(Value::Null) => Ok(TaskFilterParams::default()),
        other => parse_params(other),
    }
}

fn require_non_blank(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance handoff
// ─────────────────────────────────────────────────────────────────────────────

/// Sent by a second launch to the running instance before it exits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InstanceHandoff {
    pub argv: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl InstanceHandoff {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.argv.len() > MAX_HANDOFF_ARGS {
            return Err(ErrorInfo::new(
                "too_many_args",
                format!("argv must have {} entries or fewer", MAX_HANDOFF_ARGS),
            ));
        }
        Ok(())
    }
}

pub fn parse_handoff(bytes: &[u8]) -> Result<InstanceHandoff, ErrorInfo> {
    let handoff: InstanceHandoff = serde_json::from_slice(bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("handoff was not valid JSON: {}", err),
        )
    })?;
    handoff.validate()?;
    Ok(handoff)
}
