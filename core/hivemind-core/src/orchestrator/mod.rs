//! Window orchestration: at most one of Setup / SidePanel / Main is alive.
//!
//! Exclusivity is enforced at transition time. Every request closes the other
//! kinds before opening its own, and every OS event maps to one method here.
//! Window handles, the display tracker and the quitting flag all live in
//! [`OrchestratorState`], so tests can drive several orchestrators side by side
//! against the headless providers.
//!
//! # Transition table
//!
//! | trigger | setup incomplete | setup complete |
//! |---|---|---|
//! | `request_setup` | open Setup (focus if alive) | no-op |
//! | `request_side_panel` | no-op | open SidePanel, start tracker |
//! | `request_main` | no-op | open Main (focus if alive) |
//! | Setup closed | stay surface-less | open SidePanel |
//! | SidePanel closed | stop tracker | stop tracker |
//! | Main closed (not quitting) | stay surface-less | open SidePanel |
//! | activate | `request_setup` | `request_main` |
//! | second instance | focus Main, else as activate | focus Main, else as activate |

mod surface;

pub use surface::{SurfaceKind, ViewMessage, WindowId, WindowProvider, WindowSpec};

use crate::display::{
    main_window_bounds, setup_window_bounds, side_panel_bounds, Display, DisplayProvider,
    DisplayTracker, Rect, TickOutcome,
};
use crate::error::Result;

/// Used when no display can be queried at all.
const FALLBACK_DISPLAY: Display = Display {
    id: 0,
    bounds: Rect {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
    },
    work_area: Rect {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
    },
};

/// What a request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened { kind: SurfaceKind, window_id: WindowId },
    /// The surface was already alive and was brought to the front.
    Focused { kind: SurfaceKind, window_id: WindowId },
    /// The surface was already alive and left as is.
    Unchanged { kind: SurfaceKind },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SetupComplete,
    SetupIncomplete,
    Quitting,
}

/// Whether the process should keep running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Exit,
}

#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub setup: Option<WindowId>,
    pub side_panel: Option<WindowId>,
    pub main: Option<WindowId>,
    /// Set once shutdown starts; suppresses every fallback.
    pub quitting: bool,
    pub tracker: DisplayTracker,
}

impl OrchestratorState {
    fn slot(&mut self, kind: SurfaceKind) -> &mut Option<WindowId> {
        match kind {
            SurfaceKind::Setup => &mut self.setup,
            SurfaceKind::SidePanel => &mut self.side_panel,
            SurfaceKind::Main => &mut self.main,
        }
    }

    fn get(&self, kind: SurfaceKind) -> Option<WindowId> {
        match kind {
            SurfaceKind::Setup => self.setup,
            SurfaceKind::SidePanel => self.side_panel,
            SurfaceKind::Main => self.main,
        }
    }

    fn kind_of(&self, id: WindowId) -> Option<SurfaceKind> {
        ALL_KINDS
            .into_iter()
            .find(|kind| self.get(*kind) == Some(id))
    }
}

const ALL_KINDS: [SurfaceKind; 3] = [SurfaceKind::Setup, SurfaceKind::SidePanel, SurfaceKind::Main];

pub struct Orchestrator {
    state: OrchestratorState,
    quit_on_last_window_closed: bool,
}

impl Orchestrator {
    pub fn new(tracker: DisplayTracker, quit_on_last_window_closed: bool) -> Self {
        Self {
            state: OrchestratorState {
                setup: None,
                side_panel: None,
                main: None,
                quitting: false,
                tracker,
            },
            quit_on_last_window_closed,
        }
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn window_id(&self, kind: SurfaceKind) -> Option<WindowId> {
        self.state.get(kind)
    }

    pub fn alive_surfaces(&self) -> Vec<SurfaceKind> {
        ALL_KINDS
            .into_iter()
            .filter(|kind| self.state.get(*kind).is_some())
            .collect()
    }

    /// The live surface, if any. Exclusivity makes this unique.
    pub fn active_surface(&self) -> Option<SurfaceKind> {
        self.alive_surfaces().into_iter().next()
    }

    pub fn is_quitting(&self) -> bool {
        self.state.quitting
    }

    pub fn tracker(&self) -> &DisplayTracker {
        &self.state.tracker
    }

    // ─────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────

    pub fn request_setup(
        &mut self,
        windows: &mut dyn WindowProvider,
        displays: &mut dyn DisplayProvider,
        setup_complete: bool,
    ) -> Result<Transition> {
        if self.state.quitting {
            return Ok(Transition::Skipped(SkipReason::Quitting));
        }
        if setup_complete {
            return Ok(Transition::Skipped(SkipReason::SetupComplete));
        }
        self.prune(windows);
        if let Some(window_id) = self.state.setup {
            return Ok(self.focus(windows, SurfaceKind::Setup, window_id));
        }

        self.close_surface(windows, SurfaceKind::SidePanel);
        self.close_surface(windows, SurfaceKind::Main);

        let display = active_display(displays);
        let spec = WindowSpec::setup(setup_window_bounds(&display));
        self.open(windows, spec)
    }

    pub fn request_side_panel(
        &mut self,
        windows: &mut dyn WindowProvider,
        displays: &mut dyn DisplayProvider,
        setup_complete: bool,
    ) -> Result<Transition> {
        if self.state.quitting {
            return Ok(Transition::Skipped(SkipReason::Quitting));
        }
        if !setup_complete {
            return Ok(Transition::Skipped(SkipReason::SetupIncomplete));
        }
        self.prune(windows);
        if self.state.side_panel.is_some() {
            return Ok(Transition::Unchanged {
                kind: SurfaceKind::SidePanel,
            });
        }

        self.close_surface(windows, SurfaceKind::Main);
        self.close_surface(windows, SurfaceKind::Setup);

        let display = active_display(displays);
        let spec = WindowSpec::side_panel(side_panel_bounds(&display));
        let transition = self.open(windows, spec)?;

        if let Transition::Opened { window_id, .. } = transition {
            if let Err(err) = windows.set_ignore_mouse(window_id, true, true) {
                tracing::warn!(error = %err, "Failed to make side panel click-through");
            }
            self.state.tracker.start(Some(display.id));
        }
        Ok(transition)
    }

    pub fn request_main(
        &mut self,
        windows: &mut dyn WindowProvider,
        displays: &mut dyn DisplayProvider,
        setup_complete: bool,
    ) -> Result<Transition> {
        if self.state.quitting {
            return Ok(Transition::Skipped(SkipReason::Quitting));
        }
        if !setup_complete {
            return Ok(Transition::Skipped(SkipReason::SetupIncomplete));
        }
        self.prune(windows);
        if let Some(window_id) = self.state.main {
            return Ok(self.focus(windows, SurfaceKind::Main, window_id));
        }

        self.close_surface(windows, SurfaceKind::SidePanel);
        self.close_surface(windows, SurfaceKind::Setup);

        let display = active_display(displays);
        let spec = WindowSpec::main(main_window_bounds(&display));
        self.open(windows, spec)
    }

    /// Idle surface for the current setup state: SidePanel once set up, Setup before.
    pub fn restore_idle(
        &mut self,
        windows: &mut dyn WindowProvider,
        displays: &mut dyn DisplayProvider,
        setup_complete: bool,
    ) -> Result<Transition> {
        if setup_complete {
            self.request_side_panel(windows, displays, setup_complete)
        } else {
            self.request_setup(windows, displays, setup_complete)
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // OS events
    // ─────────────────────────────────────────────────────────────────────

    /// A window was closed outside the orchestrator (usually by the user).
    pub fn on_window_closed(
        &mut self,
        windows: &mut dyn WindowProvider,
        displays: &mut dyn DisplayProvider,
        window_id: WindowId,
        setup_complete: bool,
    ) -> Control {
        let Some(kind) = self.state.kind_of(window_id) else {
            // Already superseded by a transition; nothing to do.
            tracing::debug!(window_id, "Close event for untracked window");
            return self.quit_check(false);
        };

        *self.state.slot(kind) = None;
        tracing::info!(surface = ?kind, window_id, "Surface closed");

        let fallback = match kind {
            SurfaceKind::SidePanel => {
                self.state.tracker.stop();
                None
            }
            SurfaceKind::Setup if setup_complete && !self.state.quitting => {
                Some(self.request_side_panel(windows, displays, setup_complete))
            }
            SurfaceKind::Main if !self.state.quitting => {
                Some(self.request_side_panel(windows, displays, setup_complete))
            }
            SurfaceKind::Setup | SurfaceKind::Main => None,
        };

        let fallback_failed = match fallback {
            Some(Err(err)) => {
                tracing::error!(error = %err, "Fallback surface failed to open; waiting for activation");
                true
            }
            _ => false,
        };

        self.quit_check(fallback_failed)
    }

    /// Dock/taskbar activation.
    pub fn on_activate(
        &mut self,
        windows: &mut dyn WindowProvider,
        displays: &mut dyn DisplayProvider,
        setup_complete: bool,
    ) -> Result<Transition> {
        self.prune(windows);
        if setup_complete {
            self.request_main(windows, displays, setup_complete)
        } else {
            self.request_setup(windows, displays, setup_complete)
        }
    }

    /// Another launch handed over without a deep link.
    pub fn on_second_instance(
        &mut self,
        windows: &mut dyn WindowProvider,
        displays: &mut dyn DisplayProvider,
        setup_complete: bool,
    ) -> Result<Transition> {
        self.prune(windows);
        if let Some(window_id) = self.state.main {
            return Ok(self.focus(windows, SurfaceKind::Main, window_id));
        }
        self.on_activate(windows, displays, setup_complete)
    }

    /// Closes every surface without fallbacks.
    pub fn close_all(&mut self, windows: &mut dyn WindowProvider) {
        for kind in ALL_KINDS {
            self.close_surface(windows, kind);
        }
    }

    /// Starts deliberate shutdown.
    pub fn begin_quit(&mut self, windows: &mut dyn WindowProvider) -> Control {
        tracing::info!("Quitting");
        self.state.quitting = true;
        self.close_all(windows);
        Control::Exit
    }

    // ─────────────────────────────────────────────────────────────────────
    // Side panel controls
    // ─────────────────────────────────────────────────────────────────────

    /// Toggles click-through on the live side panel. Returns false if there is none.
    pub fn set_ignore_mouse(&mut self, windows: &mut dyn WindowProvider, ignore: bool) -> Result<bool> {
        self.prune(windows);
        let Some(window_id) = self.state.side_panel else {
            return Ok(false);
        };
        windows.set_ignore_mouse(window_id, ignore, true)?;
        Ok(true)
    }

    /// Forwards an active-workspace change to the side panel, if alive.
    pub fn notify_workspace_changed(&mut self, windows: &mut dyn WindowProvider, workspace_id: &str) {
        self.prune(windows);
        if let Some(window_id) = self.state.side_panel {
            let message = ViewMessage::WorkspaceChanged(workspace_id.to_string());
            if let Err(err) = windows.send(window_id, message) {
                tracing::warn!(error = %err, "Failed to notify side panel of workspace change");
            }
        }
    }

    /// One display-tracker poll; moves the side panel when the display changed.
    ///
    /// A panel found dead here went away without a close event, so the
    /// last-window quit rule is applied as it would be on close.
    pub fn tick(
        &mut self,
        windows: &mut dyn WindowProvider,
        displays: &mut dyn DisplayProvider,
    ) -> (TickOutcome, Control) {
        let panel_alive = self
            .state
            .side_panel
            .is_some_and(|window_id| windows.is_alive(window_id));

        let outcome = self.state.tracker.tick(displays, panel_alive);
        match (&outcome, self.state.side_panel) {
            (TickOutcome::Moved { bounds, .. }, Some(window_id)) => {
                if let Err(err) = windows.set_bounds(window_id, *bounds) {
                    tracing::warn!(error = %err, "Failed to move side panel");
                }
            }
            (TickOutcome::Stopped, _) => {
                self.state.side_panel = None;
                tracing::info!("Side panel vanished without a close event");
                return (outcome, self.quit_check(false));
            }
            _ => {}
        }
        (outcome, Control::Continue)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn open(&mut self, windows: &mut dyn WindowProvider, spec: WindowSpec) -> Result<Transition> {
        let kind = spec.kind;
        let window_id = windows.open(&spec)?;
        *self.state.slot(kind) = Some(window_id);

        if let Err(err) = windows.send(window_id, ViewMessage::SetView(kind)) {
            tracing::warn!(error = %err, surface = ?kind, "Failed to send initial view");
        }
        tracing::info!(surface = ?kind, window_id, "Surface opened");
        Ok(Transition::Opened { kind, window_id })
    }

    fn focus(&mut self, windows: &mut dyn WindowProvider, kind: SurfaceKind, window_id: WindowId) -> Transition {
        if let Err(err) = windows.focus(window_id) {
            tracing::warn!(error = %err, surface = ?kind, "Failed to focus surface");
        }
        Transition::Focused { kind, window_id }
    }

    /// Closes a surface the orchestrator is replacing. The handle is cleared
    /// first so the resulting close event is ignored.
    fn close_surface(&mut self, windows: &mut dyn WindowProvider, kind: SurfaceKind) {
        let Some(window_id) = self.state.slot(kind).take() else {
            return;
        };
        if kind == SurfaceKind::SidePanel {
            self.state.tracker.stop();
        }
        if windows.is_alive(window_id) {
            windows.close(window_id);
        }
        tracing::info!(surface = ?kind, window_id, "Surface superseded");
    }

    /// Drops handles to windows that died without a close event.
    fn prune(&mut self, windows: &dyn WindowProvider) {
        for kind in ALL_KINDS {
            let slot = self.state.slot(kind);
            if let Some(window_id) = *slot {
                if !windows.is_alive(window_id) {
                    *slot = None;
                    if kind == SurfaceKind::SidePanel {
                        self.state.tracker.stop();
                    }
                }
            }
        }
    }

    fn quit_check(&self, fallback_failed: bool) -> Control {
        let nothing_alive = self.alive_surfaces().is_empty();
        if nothing_alive && self.quit_on_last_window_closed && !fallback_failed {
            tracing::info!("Last window closed; exiting");
            Control::Exit
        } else {
            Control::Continue
        }
    }
}

fn active_display(displays: &mut dyn DisplayProvider) -> Display {
    match displays.active_display() {
        Ok(Some(display)) => display,
        Ok(None) => FALLBACK_DISPLAY,
        Err(err) => {
            tracing::warn!(error = %err, "Display query failed; using fallback geometry");
            FALLBACK_DISPLAY
        }
    }
}
