//! Window surfaces and the windowing capability the orchestrator drives.

use serde::{Deserialize, Serialize};

use crate::display::Rect;
use crate::error::Result;

pub type WindowId = u64;

/// The three mutually exclusive UI surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    Setup,
    SidePanel,
    Main,
}

impl SurfaceKind {
    /// Route name the view layer renders for this surface.
    pub fn view_name(self) -> &'static str {
        match self {
            SurfaceKind::Setup => "setup",
            SurfaceKind::SidePanel => "sidepanel",
            SurfaceKind::Main => "main",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub kind: SurfaceKind,
    pub bounds: Rect,
    pub frameless: bool,
    pub transparent: bool,
    pub always_on_top: bool,
    /// Ignore mouse input and forward it to the content underneath.
    pub click_through: bool,
    pub visible_on_all_workspaces: bool,
}

impl WindowSpec {
    pub fn setup(bounds: Rect) -> Self {
        Self::normal(SurfaceKind::Setup, bounds)
    }

    pub fn main(bounds: Rect) -> Self {
        Self::normal(SurfaceKind::Main, bounds)
    }

    pub fn side_panel(bounds: Rect) -> Self {
        Self {
            kind: SurfaceKind::SidePanel,
            bounds,
            frameless: true,
            transparent: true,
            always_on_top: true,
            click_through: true,
            visible_on_all_workspaces: true,
        }
    }

    fn normal(kind: SurfaceKind, bounds: Rect) -> Self {
        Self {
            kind,
            bounds,
            frameless: false,
            transparent: false,
            always_on_top: false,
            click_through: false,
            visible_on_all_workspaces: false,
        }
    }
}

/// Messages pushed from the shell to a window's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ViewMessage {
    SetView(SurfaceKind),
    WorkspaceChanged(String),
}

/// OS windowing capability.
///
/// `close` must not call back into the orchestrator; windows closed by the
/// user are reported separately through `Orchestrator::on_window_closed`.
pub trait WindowProvider {
    fn open(&mut self, spec: &WindowSpec) -> Result<WindowId>;
    fn close(&mut self, id: WindowId);
    fn is_alive(&self, id: WindowId) -> bool;
    fn set_bounds(&mut self, id: WindowId, bounds: Rect) -> Result<()>;
    fn set_ignore_mouse(&mut self, id: WindowId, ignore: bool, forward: bool) -> Result<()>;
    fn focus(&mut self, id: WindowId) -> Result<()>;
    fn send(&mut self, id: WindowId, message: ViewMessage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_panel_spec_is_click_through_overlay() {
        let spec = WindowSpec::side_panel(Rect {
            x: 0,
            y: 0,
            width: 400,
            height: 800,
        });
        assert!(spec.frameless && spec.always_on_top && spec.click_through);
        let main = WindowSpec::main(spec.bounds);
        assert!(!main.always_on_top && !main.click_through);
    }

    #[test]
    fn view_message_wire_shape() {
        let value = serde_json::to_value(ViewMessage::SetView(SurfaceKind::SidePanel)).unwrap();
        assert_eq!(value, serde_json::json!({"type": "set_view", "payload": "side_panel"}));
    }
}
