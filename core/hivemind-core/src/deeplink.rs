//! OAuth callback deep links: `<scheme>://callback?user=<json>&token=..&github_token=..`.
//!
//! Parsing is side-effect free. Only a fully decoded payload reaches the
//! session store, so a malformed link never leaves partial state behind.

use url::Url;

use crate::display::DisplayProvider;
use crate::error::{HivemindError, Result};
use crate::orchestrator::{Orchestrator, Transition, WindowProvider};
use crate::session::SessionStore;
use crate::types::User;

const CALLBACK_HOST: &str = "callback";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub user: User,
    pub token: Option<String>,
    pub github_token: Option<String>,
}

/// Parses a callback link.
///
/// Returns `Ok(None)` for links this handler does not own (other scheme or
/// host) and for callbacks without a `user`. A `user` that is not valid JSON
/// is a [`HivemindError::DeepLinkParse`].
pub fn parse_callback(raw: &str, scheme: &str) -> Result<Option<CallbackPayload>> {
    let url = Url::parse(raw.trim())
        .map_err(|err| HivemindError::DeepLinkParse(format!("invalid URL: {}", err)))?;

    if !url.scheme().eq_ignore_ascii_case(scheme) {
        tracing::debug!(scheme = url.scheme(), "Ignoring link for another scheme");
        return Ok(None);
    }
    if url.host_str() != Some(CALLBACK_HOST) {
        tracing::debug!(host = ?url.host_str(), "Ignoring non-callback link");
        return Ok(None);
    }

    let mut user_json = None;
    let mut token = None;
    let mut github_token = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "user" => user_json = Some(value.into_owned()),
            "token" => token = Some(value.into_owned()),
            "github_token" => github_token = Some(value.into_owned()),
            _ => {}
        }
    }

    let Some(user_json) = user_json else {
        tracing::debug!("Callback without user; ignoring");
        return Ok(None);
    };
    let user: User = serde_json::from_str(&user_json)
        .map_err(|err| HivemindError::DeepLinkParse(format!("user payload: {}", err)))?;

    Ok(Some(CallbackPayload {
        user,
        token: token.filter(|value| !value.is_empty()),
        github_token: github_token.filter(|value| !value.is_empty()),
    }))
}

/// First argument that looks like a link for `scheme`, as delivered on launch.
pub fn find_deep_link<'a, I>(argv: I, scheme: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    let prefix = format!("{}:", scheme.to_ascii_lowercase());
    argv.into_iter()
        .map(String::as_str)
        .find(|arg| arg.to_ascii_lowercase().starts_with(&prefix))
}

/// Records a completed login, then resets the window set to its idle surface.
pub fn apply_callback(
    payload: CallbackPayload,
    store: &mut SessionStore,
    orchestrator: &mut Orchestrator,
    windows: &mut dyn WindowProvider,
    displays: &mut dyn DisplayProvider,
) -> Result<Transition> {
    let CallbackPayload {
        user,
        token,
        github_token,
    } = payload;
    tracing::info!(user_id = %user.id, "Login callback received");

    store.complete_setup(user, token.as_deref(), github_token.as_deref())?;

    orchestrator.close_all(windows);
    orchestrator.restore_idle(windows, displays, store.setup_complete())
}

/// Parses and applies a raw link. `Ok(None)` means the link was ignored.
pub fn handle_deep_link(
    raw: &str,
    scheme: &str,
    store: &mut SessionStore,
    orchestrator: &mut Orchestrator,
    windows: &mut dyn WindowProvider,
    displays: &mut dyn DisplayProvider,
) -> Result<Option<Transition>> {
    match parse_callback(raw, scheme)? {
        Some(payload) => apply_callback(payload, store, orchestrator, windows, displays).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = r#"%7B%22id%22%3A1%2C%22username%22%3A%22u%22%2C%22email%22%3A%22e%22%7D"#;

    #[test]
    fn parses_full_callback() {
        let link = format!("hivemind://callback?user={}&token=T1&github_token=T2", USER);
        let payload = parse_callback(&link, "hivemind").unwrap().unwrap();
        assert_eq!(payload.user.id, "1");
        assert_eq!(payload.user.username, "u");
        assert_eq!(payload.token.as_deref(), Some("T1"));
        assert_eq!(payload.github_token.as_deref(), Some("T2"));
    }

    #[test]
    fn unencoded_json_user_is_accepted() {
        let link = r#"hivemind://callback?user={"id":7,"username":"a","email":"b"}"#;
        let payload = parse_callback(link, "hivemind").unwrap().unwrap();
        assert_eq!(payload.user.id, "7");
        assert!(payload.token.is_none());
    }

    #[test]
    fn object_id_user_is_accepted() {
        let link = r#"hivemind://callback?user={"id": "65f0c1a2b3c4d5e6f7a8b9c0", "username": "u", "email": "e"}&token=T1"#;
        let payload = parse_callback(link, "hivemind").unwrap().unwrap();
        assert_eq!(payload.user.id, "65f0c1a2b3c4d5e6f7a8b9c0");
        assert_eq!(payload.token.as_deref(), Some("T1"));
    }

    #[test]
    fn other_hosts_and_schemes_are_ignored() {
        assert!(parse_callback("hivemind://settings?user=x", "hivemind")
            .unwrap()
            .is_none());
        assert!(parse_callback("https://callback?user=x", "hivemind")
            .unwrap()
            .is_none());
        assert!(parse_callback("hivemind://callback?token=T1", "hivemind")
            .unwrap()
            .is_none());
    }

    #[test]
    fn malformed_user_is_parse_error() {
        let err = parse_callback("hivemind://callback?user=not-json", "hivemind").unwrap_err();
        assert!(matches!(err, HivemindError::DeepLinkParse(_)));
        assert!(parse_callback("not a url", "hivemind").is_err());
    }

    #[test]
    fn finds_link_among_launch_args() {
        let argv: Vec<String> = ["/usr/bin/hivemind", "--flag", "HiveMind://callback?user=1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            find_deep_link(&argv, "hivemind"),
            Some("HiveMind://callback?user=1")
        );
        assert_eq!(find_deep_link(&argv[..2], "hivemind"), None);
    }
}
