//! Authenticated calls to the Hivemind backend and to GitHub.
//!
//! Backend calls send `Authorization: Token <primary>`; a 401 (or a primary
//! token that is missing or no longer decrypts) resets the session document
//! and yields [`HivemindError::Unauthorized`]. Any other non-success status is
//! [`HivemindError::Api`]. Retries, when enabled, apply to transport failures
//! only; an HTTP status is never retried.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::AppConfig;
use crate::error::{HivemindError, Result};
use crate::session::{SecretField, SessionStore};
use crate::types::{
    Feature, GitHubRepo, NewFeature, NewTask, NewWorkspace, Task, Workspace,
};

const CLIENT_USER_AGENT: &str = concat!("hivemind-desktop/", env!("CARGO_PKG_VERSION"));
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }
}

pub struct ApiClient {
    http: Client,
    api_base: Url,
    github_base: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|source| HivemindError::Http {
                context: "building HTTP client".to_string(),
                source,
            })?;

        let api_base = format!("{}/api/", config.api_base_url.trim_end_matches('/'));
        let api_base = match Url::parse(&api_base) {
            Ok(url) if !url.cannot_be_a_base() => url,
            Ok(_) => {
                return Err(HivemindError::InvalidBaseUrl {
                    url: api_base,
                    details: "not a hierarchical URL".to_string(),
                })
            }
            Err(err) => {
                return Err(HivemindError::InvalidBaseUrl {
                    url: api_base,
                    details: err.to_string(),
                })
            }
        };

        Ok(Self {
            http,
            api_base,
            github_base: config.github_api_base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy {
                max_retries: config.http_max_retries,
                delay: Duration::from_millis(config.http_retry_delay_ms),
            },
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Backend reads
    // ─────────────────────────────────────────────────────────────────────

    /// Lists the user's workspaces and caches them in the session document.
    pub fn fetch_workspaces(&self, store: &mut SessionStore) -> Result<Vec<Workspace>> {
        let workspaces: Vec<Workspace> =
            self.backend(store, Method::GET, &["workspaces"], &[], None)?;
        if let Err(err) = store.set_workspaces(workspaces.clone()) {
            tracing::warn!(error = %err, "Failed to cache workspace list");
        }
        Ok(workspaces)
    }

    pub fn fetch_workspace(&self, store: &mut SessionStore, id: &str) -> Result<Workspace> {
        self.backend(store, Method::GET, &["workspaces", id], &[], None)
    }

    pub fn fetch_features(&self, store: &mut SessionStore, workspace_id: &str) -> Result<Vec<Feature>> {
        self.backend(
            store,
            Method::GET,
            &["features"],
            &[("workspace", workspace_id)],
            None,
        )
    }

    pub fn fetch_tasks(
        &self,
        store: &mut SessionStore,
        workspace: Option<&str>,
        feature: Option<&str>,
    ) -> Result<Vec<Task>> {
        let query: Vec<(&str, &str)> = [("workspace", workspace), ("feature", feature)]
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect();
        self.backend(store, Method::GET, &["tasks"], &query, None)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Backend writes
    // ─────────────────────────────────────────────────────────────────────

    pub fn create_task(&self, store: &mut SessionStore, task: &NewTask) -> Result<Task> {
        let body = to_body(task)?;
        self.backend(store, Method::POST, &["tasks"], &[], Some(&body))
    }

    pub fn create_feature(&self, store: &mut SessionStore, feature: &NewFeature) -> Result<Feature> {
        let body = to_body(feature)?;
        self.backend(store, Method::POST, &["features"], &[], Some(&body))
    }

    /// Creates a workspace; the backend needs the GitHub token to install
    /// repository webhooks, so it rides along in the body.
    pub fn create_workspace(
        &self,
        store: &mut SessionStore,
        workspace: &NewWorkspace,
    ) -> Result<Workspace> {
        let mut body = to_body(workspace)?;
        let github_token = store.get_decrypted(SecretField::Secondary);
        if let Some(object) = body.as_object_mut() {
            object.insert(
                "github_token".to_string(),
                github_token.map(Value::String).unwrap_or(Value::Null),
            );
        }
        self.backend(store, Method::POST, &["workspaces"], &[], Some(&body))
    }

    // ─────────────────────────────────────────────────────────────────────
    // GitHub
    // ─────────────────────────────────────────────────────────────────────

    /// Lists repositories visible to the stored GitHub token.
    pub fn fetch_github_repos(&self, store: &mut SessionStore) -> Result<Vec<GitHubRepo>> {
        let Some(token) = store.get_decrypted(SecretField::Secondary) else {
            return Err(HivemindError::Api {
                status: StatusCode::UNAUTHORIZED.as_u16(),
            });
        };
        let url = format!("{}/user/repos", self.github_base);
        let bearer = format!("Bearer {}", token);

        let response = self.send("listing GitHub repositories", || {
            self.http
                .get(&url)
                .header(AUTHORIZATION, &bearer)
                .header(ACCEPT, GITHUB_ACCEPT)
                .header(USER_AGENT, CLIENT_USER_AGENT)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HivemindError::Api {
                status: status.as_u16(),
            });
        }
        decode(response, "decoding GitHub repositories")
    }

    // ─────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────

    fn backend<T: DeserializeOwned>(
        &self,
        store: &mut SessionStore,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<T> {
        let url = self.endpoint(segments);
        let path = url.path();
        let Some(token) = store.get_decrypted(SecretField::Primary) else {
            tracing::warn!(path, "No usable backend token; resetting session");
            reset_after_unauthorized(store);
            return Err(HivemindError::Unauthorized);
        };

        let auth = format!("Token {}", token);
        let context = format!("{} {}", method, path);

        let response = self.send(&context, || {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, &auth)
                .header(USER_AGENT, CLIENT_USER_AGENT);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            request
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(path, "Backend rejected token; resetting session");
            reset_after_unauthorized(store);
            return Err(HivemindError::Unauthorized);
        }
        if !status.is_success() {
            tracing::debug!(path, status = status.as_u16(), "Backend call failed");
            return Err(HivemindError::Api {
                status: status.as_u16(),
            });
        }

        decode(response, &context)
    }

    /// `<api base>/<segment>/.../`, each segment percent-encoded so ids can't
    /// change the request target.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    fn send<F>(&self, context: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            match build().send() {
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.retry.max_retries && is_transient(&err) => {
                    attempt += 1;
                    tracing::warn!(
                        error = %err,
                        attempt,
                        max_retries = self.retry.max_retries,
                        context,
                        "Transient HTTP failure; retrying"
                    );
                    thread::sleep(self.retry.delay);
                }
                Err(source) => {
                    return Err(HivemindError::Http {
                        context: context.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn reset_after_unauthorized(store: &mut SessionStore) {
    if let Err(err) = store.reset() {
        tracing::error!(error = %err, "Failed to persist session reset");
    }
}

fn to_body<T: serde::Serialize>(payload: &T) -> Result<Value> {
    serde_json::to_value(payload).map_err(|err| HivemindError::json("encoding request body", err))
}

fn decode<T: DeserializeOwned>(response: Response, context: &str) -> Result<T> {
    let bytes = response.bytes().map_err(|source| HivemindError::Http {
        context: context.to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|err| HivemindError::json(context, err))
}
