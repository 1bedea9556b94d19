//! The controller: routes events and control requests to the store, the API
//! client and the orchestrator.

use std::process::Command;

use hivemind_protocol::{
    parse_id_params, parse_params, parse_task_filter, parse_workspace_params, ErrorInfo,
    IgnoreMouseParams, Method, Request, Response, WindowParams, PROTOCOL_VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::ApiClient;
use crate::config::AppConfig;
use crate::deeplink::{self, CallbackPayload};
use crate::display::{DisplayProvider, DisplayTracker};
use crate::error::{HivemindError, Result};
use crate::orchestrator::{Control, Orchestrator, SurfaceKind, Transition, WindowProvider};
use crate::runtime::AppEvent;
use crate::session::SessionStore;
use crate::types::{NewFeature, NewTask, NewWorkspace, User};

/// Opens URLs outside the app (the GitHub App installation page).
pub trait UrlOpener {
    fn open_url(&mut self, url: &str) -> Result<()>;
}

/// The platform's default browser.
pub struct SystemBrowser;

impl UrlOpener for SystemBrowser {
    fn open_url(&mut self, url: &str) -> Result<()> {
        let Some(mut command) = browser_command(url) else {
            return Err(HivemindError::UnsupportedPlatform(
                "opening a browser".to_string(),
            ));
        };
        command.spawn().map_err(|err| HivemindError::CommandFailed {
            command: format!("{:?}", command),
            details: err.to_string(),
        })?;
        Ok(())
    }
}

fn browser_command(url: &str) -> Option<Command> {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else if cfg!(unix) {
        Command::new("xdg-open")
    } else {
        return None;
    };
    command.arg(url);
    Some(command)
}

/// Login submitted directly by the view layer.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InitParams {
    user: User,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    github_token: Option<String>,
}

/// What handling one event produced.
#[derive(Debug)]
pub struct Handled {
    pub control: Control,
    /// Present for [`AppEvent::Request`] only.
    pub response: Option<Response>,
}

impl Handled {
    fn event(control: Control) -> Self {
        Self {
            control,
            response: None,
        }
    }
}

/// Snapshot of the session, safe to print: tokens are reported as present or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub setup_complete: bool,
    pub authenticated: bool,
    pub has_github_token: bool,
    pub user: Option<User>,
    pub active_workspace_id: Option<String>,
    pub active_surface: Option<&'static str>,
    pub store_path: Option<String>,
}

impl SessionStatus {
    pub fn collect(store: &mut SessionStore, active_surface: Option<SurfaceKind>) -> Self {
        SessionStatus {
            setup_complete: store.setup_complete(),
            authenticated: store.is_authenticated(),
            has_github_token: store.document().secondary_token_cipher.is_some(),
            user: store.current_user().cloned(),
            active_workspace_id: store.active_workspace_id().map(str::to_string),
            active_surface: active_surface.map(SurfaceKind::view_name),
            store_path: store.file_path().map(|path| path.display().to_string()),
        }
    }
}

pub struct App<W: WindowProvider, D: DisplayProvider> {
    config: AppConfig,
    store: SessionStore,
    api: ApiClient,
    orchestrator: Orchestrator,
    windows: W,
    displays: D,
    browser: Box<dyn UrlOpener>,
}

impl<W: WindowProvider, D: DisplayProvider> App<W, D> {
    pub fn new(config: AppConfig, store: SessionStore, api: ApiClient, windows: W, displays: D) -> Self {
        let tracker = DisplayTracker::new(config.display_poll_interval());
        let orchestrator = Orchestrator::new(tracker, config.quit_on_last_window_closed);
        Self {
            config,
            store,
            api,
            orchestrator,
            windows,
            displays,
            browser: Box::new(SystemBrowser),
        }
    }

    pub fn with_browser(mut self, browser: Box<dyn UrlOpener>) -> Self {
        self.browser = browser;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn windows(&self) -> &W {
        &self.windows
    }

    pub fn windows_mut(&mut self) -> &mut W {
        &mut self.windows
    }

    pub fn displays_mut(&mut self) -> &mut D {
        &mut self.displays
    }

    /// Opens the initial surface: SidePanel once set up, Setup before.
    ///
    /// A failure is logged, not fatal; the next activation retries.
    pub fn start(&mut self) -> Option<Transition> {
        let setup_complete = self.store.setup_complete();
        tracing::info!(setup_complete, "Starting");
        match self
            .orchestrator
            .restore_idle(&mut self.windows, &mut self.displays, setup_complete)
        {
            Ok(transition) => Some(transition),
            Err(err) => {
                tracing::error!(error = %err, "Failed to open initial surface");
                None
            }
        }
    }

    pub fn status(&mut self) -> SessionStatus {
        SessionStatus::collect(&mut self.store, self.orchestrator.active_surface())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────

    pub fn handle(&mut self, event: AppEvent) -> Handled {
        match event {
            AppEvent::Request(request) => {
                let (control, response) = self.handle_request(request);
                Handled {
                    control,
                    response: Some(response),
                }
            }
            AppEvent::WindowClosed(window_id) => Handled::event(self.window_closed(window_id)),
            AppEvent::Activate => {
                log_transition("activate", self.activate());
                Handled::event(Control::Continue)
            }
            AppEvent::SecondInstance(handoff) => {
                tracing::info!(args = handoff.argv.len(), "Second instance launched");
                let link = deeplink::find_deep_link(&handoff.argv, &self.config.url_scheme)
                    .map(str::to_string);
                match link {
                    Some(link) => self.open_url(&link),
                    None => {
                        let setup_complete = self.store.setup_complete();
                        let result = self.orchestrator.on_second_instance(
                            &mut self.windows,
                            &mut self.displays,
                            setup_complete,
                        );
                        log_transition("second instance", result);
                    }
                }
                Handled::event(Control::Continue)
            }
            AppEvent::OpenUrl(url) => {
                self.open_url(&url);
                Handled::event(Control::Continue)
            }
            AppEvent::Quit => Handled::event(self.orchestrator.begin_quit(&mut self.windows)),
            AppEvent::Tick => {
                let (_, control) = self.orchestrator.tick(&mut self.windows, &mut self.displays);
                Handled::event(control)
            }
        }
    }

    /// Dispatches one control request.
    pub fn handle_request(&mut self, request: Request) -> (Control, Response) {
        let id = request.id.clone();
        if request.protocol_version != PROTOCOL_VERSION {
            let response = Response::error(
                id,
                "unsupported_version",
                format!(
                    "protocol_version {} is not supported (expected {})",
                    request.protocol_version, PROTOCOL_VERSION
                ),
            );
            return (Control::Continue, response);
        }

        tracing::debug!(method = ?request.method, id = ?request.id, "Control request received");
        match self.dispatch(request.method, request.params) {
            Ok((control, data)) => (control, Response::ok(id, data)),
            Err(RequestError::Params(info)) => {
                (Control::Continue, Response::error_with_info(id, info))
            }
            Err(RequestError::Core(err)) => {
                tracing::debug!(error = %err, "Control request failed");
                (
                    Control::Continue,
                    Response::error_with_info(id, ErrorInfo::from(&err)),
                )
            }
        }
    }

    fn dispatch(
        &mut self,
        method: Method,
        params: Option<Value>,
    ) -> std::result::Result<(Control, Value), RequestError> {
        let value = match method {
            // Window triggers
            Method::OpenMainWindow => {
                let setup_complete = self.store.setup_complete();
                let transition =
                    self.orchestrator
                        .request_main(&mut self.windows, &mut self.displays, setup_complete)?;
                transition_json(&transition)
            }
            Method::OpenSideWindow => {
                let setup_complete = self.store.setup_complete();
                let transition = self.orchestrator.request_side_panel(
                    &mut self.windows,
                    &mut self.displays,
                    setup_complete,
                )?;
                transition_json(&transition)
            }
            Method::SetIgnoreMouse => {
                let params: IgnoreMouseParams = parse_params(params)?;
                let applied = self
                    .orchestrator
                    .set_ignore_mouse(&mut self.windows, params.ignore)?;
                json!({ "applied": applied })
            }
            Method::WindowClosed => {
                let params: WindowParams = parse_params(params)?;
                let control = self.window_closed(params.window_id);
                return Ok((control, Value::Null));
            }
            Method::Activate => transition_json(&self.activate()?),
            Method::Quit => {
                let control = self.orchestrator.begin_quit(&mut self.windows);
                return Ok((control, Value::Null));
            }

            // Session
            Method::Init => {
                let params: InitParams = parse_params(params)?;
                let payload = CallbackPayload {
                    user: params.user,
                    token: params.token.filter(|token| !token.is_empty()),
                    github_token: params.github_token.filter(|token| !token.is_empty()),
                };
                let transition = deeplink::apply_callback(
                    payload,
                    &mut self.store,
                    &mut self.orchestrator,
                    &mut self.windows,
                    &mut self.displays,
                )?;
                transition_json(&transition)
            }
            Method::StartOauth => {
                tracing::info!(url = %self.config.oauth_install_url, "Opening OAuth installation page");
                self.browser.open_url(&self.config.oauth_install_url)?;
                Value::Null
            }
            Method::WorkspaceChanged => {
                let params = parse_workspace_params(params)?;
                self.store
                    .set_active_workspace_id(Some(params.workspace_id.clone()))?;
                self.orchestrator
                    .notify_workspace_changed(&mut self.windows, &params.workspace_id);
                Value::Null
            }
            Method::GetActiveWorkspaceId => json!(self.store.active_workspace_id()),
            Method::GetStatus => to_value(&self.status())?,

            // Backend passthrough
            Method::FetchWorkspaces => {
                let result = self.api.fetch_workspaces(&mut self.store);
                to_value(&self.after_api(result)?)?
            }
            Method::FetchWorkspace => {
                let params = parse_id_params(params)?;
                let result = self.api.fetch_workspace(&mut self.store, &params.id);
                to_value(&self.after_api(result)?)?
            }
            Method::FetchFeatures => {
                let params = parse_workspace_params(params)?;
                let result = self.api.fetch_features(&mut self.store, &params.workspace_id);
                to_value(&self.after_api(result)?)?
            }
            Method::FetchTasks => {
                let filter = parse_task_filter(params)?;
                let result = self.api.fetch_tasks(
                    &mut self.store,
                    filter.workspace.as_deref(),
                    filter.feature.as_deref(),
                );
                to_value(&self.after_api(result)?)?
            }
            Method::CreateTask => {
                let task: NewTask = parse_params(params)?;
                let result = self.api.create_task(&mut self.store, &task);
                to_value(&self.after_api(result)?)?
            }
            Method::CreateFeature => {
                let feature: NewFeature = parse_params(params)?;
                let result = self.api.create_feature(&mut self.store, &feature);
                to_value(&self.after_api(result)?)?
            }
            Method::CreateWorkspace => {
                let workspace: NewWorkspace = parse_params(params)?;
                let result = self.api.create_workspace(&mut self.store, &workspace);
                to_value(&self.after_api(result)?)?
            }
            Method::FetchGithubRepos => {
                let result = self.api.fetch_github_repos(&mut self.store);
                to_value(&self.after_api(result)?)?
            }
        };
        Ok((Control::Continue, value))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    /// On `Unauthorized` the store is already reset; send the user back to Setup.
    fn after_api<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(HivemindError::Unauthorized) = &result {
            tracing::warn!("Session rejected by backend; returning to setup");
            self.orchestrator.close_all(&mut self.windows);
            let setup_complete = self.store.setup_complete();
            let transition =
                self.orchestrator
                    .request_setup(&mut self.windows, &mut self.displays, setup_complete);
            log_transition("unauthorized", transition);
        }
        result
    }

    fn activate(&mut self) -> Result<Transition> {
        let setup_complete = self.store.setup_complete();
        self.orchestrator
            .on_activate(&mut self.windows, &mut self.displays, setup_complete)
    }

    fn window_closed(&mut self, window_id: u64) -> Control {
        let setup_complete = self.store.setup_complete();
        self.orchestrator.on_window_closed(
            &mut self.windows,
            &mut self.displays,
            window_id,
            setup_complete,
        )
    }

    fn open_url(&mut self, url: &str) {
        let result = deeplink::handle_deep_link(
            url,
            &self.config.url_scheme,
            &mut self.store,
            &mut self.orchestrator,
            &mut self.windows,
            &mut self.displays,
        );
        match result {
            Ok(Some(transition)) => log_transition("deep link", Ok(transition)),
            Ok(None) => tracing::debug!("Deep link ignored"),
            Err(err) => tracing::warn!(error = %err, "Deep link rejected"),
        }
    }
}

enum RequestError {
    Params(ErrorInfo),
    Core(HivemindError),
}

impl From<ErrorInfo> for RequestError {
    fn from(info: ErrorInfo) -> Self {
        RequestError::Params(info)
    }
}

impl From<HivemindError> for RequestError {
    fn from(err: HivemindError) -> Self {
        RequestError::Core(err)
    }
}

fn log_transition(trigger: &str, result: Result<Transition>) {
    match result {
        Ok(transition) => tracing::debug!(trigger, ?transition, "Transition"),
        Err(err) => {
            tracing::error!(trigger, error = %err, "Transition failed; will retry on next activation")
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| HivemindError::json("encoding response", err))
}

fn transition_json(transition: &Transition) -> Value {
    match transition {
        Transition::Opened { kind, window_id } => {
            json!({ "result": "opened", "surface": kind.view_name(), "windowId": window_id })
        }
        Transition::Focused { kind, window_id } => {
            json!({ "result": "focused", "surface": kind.view_name(), "windowId": window_id })
        }
        Transition::Unchanged { kind } => {
            json!({ "result": "unchanged", "surface": kind.view_name() })
        }
        Transition::Skipped(reason) => {
            json!({ "result": "skipped", "reason": format!("{:?}", reason) })
        }
    }
}
