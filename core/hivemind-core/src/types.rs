//! Shared data types round-tripped through the session document and the
//! backend API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub github_repo_url: String,
    #[serde(default)]
    pub github_repo_owner: String,
    #[serde(default)]
    pub github_repo_name: String,
    #[serde(default)]
    pub created_by: Option<User>,
    #[serde(default)]
    pub members: Vec<User>,
    #[serde(default)]
    pub task_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Issue,
    PullRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub workspace: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: FeatureType,
    pub github_number: Option<i64>,
    pub github_id: Option<i64>,
    #[serde(default)]
    pub html_url: String,
    pub state: FeatureState,
    #[serde(default)]
    pub task_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub feature: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_to: Option<User>,
    #[serde(default)]
    pub completed_by_commit: String,
    pub checkbox_index: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
}

/// The subset of GitHub's repository object the workspace picker needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub owner: GitHubOwner,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Backend ids are ObjectId strings; integer ids are kept as their decimal text.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Write payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub feature: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFeature {
    pub workspace: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkspace {
    pub name: String,
    pub github_repo_url: String,
    pub github_repo_owner: String,
    pub github_repo_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feature_type_uses_wire_name() {
        let feature: Feature = serde_json::from_value(json!({
            "id": 7,
            "workspace": "ws-1",
            "name": "Login",
            "description": "",
            "type": "pull_request",
            "github_number": 12,
            "github_id": null,
            "html_url": "https://github.com/o/r/pull/12",
            "state": "open",
            "task_count": 3,
            "created_at": "2026-01-30T12:00:00Z",
            "updated_at": "2026-01-30T12:00:00+02:00"
        }))
        .unwrap();
        assert_eq!(feature.id, "7");
        assert_eq!(feature.kind, FeatureType::PullRequest);
        assert_eq!(feature.github_number, Some(12));
        assert!(feature.updated_at < feature.created_at);
    }

    #[test]
    fn task_status_round_trips_snake_case() {
        let value = serde_json::to_value(TaskStatus::InProgress).unwrap();
        assert_eq!(value, json!("in_progress"));
    }

    #[test]
    fn workspace_tolerates_missing_optional_fields() {
        let workspace: Workspace = serde_json::from_value(json!({
            "id": "ws-1",
            "name": "Hive",
            "created_at": "2026-01-30T12:00:00Z",
            "updated_at": "2026-01-30T12:00:00Z",
            "webhook_id": 99
        }))
        .unwrap();
        assert!(workspace.members.is_empty());
        assert!(workspace.created_by.is_none());
    }

    #[test]
    fn workspace_decodes_object_id_users() {
        let workspace: Workspace = serde_json::from_value(json!({
            "id": "65f0c1a2b3c4d5e6f7a8b9c1",
            "name": "Hive",
            "created_by": {
                "id": "65f0c1a2b3c4d5e6f7a8b9c0",
                "username": "u",
                "email": "e"
            },
            "members": [
                {"id": "65f0c1a2b3c4d5e6f7a8b9c0", "username": "u", "email": "e"},
                {"id": 12, "username": "v", "email": "f"}
            ],
            "created_at": "2026-01-30T12:00:00Z",
            "updated_at": "2026-01-30T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            workspace.created_by.map(|user| user.id).as_deref(),
            Some("65f0c1a2b3c4d5e6f7a8b9c0")
        );
        assert_eq!(workspace.members[1].id, "12");
    }

    #[test]
    fn user_id_serializes_as_string() {
        let user: User =
            serde_json::from_value(json!({"id": 3, "username": "u", "email": "e"})).unwrap();
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["id"], json!("3"));
        let back: User = serde_json::from_value(value).unwrap();
        assert_eq!(back, user);
    }
}
