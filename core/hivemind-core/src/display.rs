//! Active-display tracking for the docked side panel.
//!
//! There is no push notification for "cursor moved to another monitor", so the
//! tracker polls: each tick resolves the display nearest the pointer and moves
//! the panel only when that display differs from the one it is docked to.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub type DisplayId = u32;

pub const SIDE_PANEL_WIDTH: u32 = 400;
pub const SIDE_PANEL_HEIGHT: u32 = 800;
pub const MAIN_WINDOW_WIDTH: u32 = 950;
pub const MAIN_WINDOW_HEIGHT: u32 = 650;
pub const SETUP_WINDOW_WIDTH: u32 = 800;
pub const SETUP_WINDOW_HEIGHT: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn contains(&self, point: Point) -> bool {
        let right = i64::from(self.x) + i64::from(self.width);
        let bottom = i64::from(self.y) + i64::from(self.height);
        i64::from(point.x) >= i64::from(self.x)
            && i64::from(point.x) < right
            && i64::from(point.y) >= i64::from(self.y)
            && i64::from(point.y) < bottom
    }

    fn center(&self) -> (i64, i64) {
        (
            i64::from(self.x) + i64::from(self.width / 2),
            i64::from(self.y) + i64::from(self.height / 2),
        )
    }

    /// A `width`×`height` rect centered in this one (clamped to its size).
    pub fn centered(&self, width: u32, height: u32) -> Rect {
        let width = width.min(self.width);
        let height = height.min(self.height);
        Rect {
            x: self.x + ((self.width - width) / 2) as i32,
            y: self.y + ((self.height - height) / 2) as i32,
            width,
            height,
        }
    }

    /// A `width`×`height` rect flush with this one's right edge, vertically centered.
    pub fn docked_right(&self, width: u32, height: u32) -> Rect {
        let width = width.min(self.width);
        let height = height.min(self.height);
        Rect {
            x: self.x + (self.width - width) as i32,
            y: self.y + ((self.height - height) / 2) as i32,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Display {
    pub id: DisplayId,
    pub bounds: Rect,
    /// Bounds minus menu bars, docks and taskbars.
    pub work_area: Rect,
}

/// OS pointer/monitor query capability.
pub trait DisplayProvider {
    fn cursor_position(&mut self) -> Result<Point>;
    fn displays(&mut self) -> Result<Vec<Display>>;

    /// The display nearest the pointer, if any display is attached.
    fn active_display(&mut self) -> Result<Option<Display>> {
        let cursor = self.cursor_position()?;
        let displays = self.displays()?;
        Ok(nearest_display(cursor, &displays).cloned())
    }
}

/// The display containing `point`, else the one whose work-area center is
/// closest. Ties keep the first display in the list.
pub fn nearest_display(point: Point, displays: &[Display]) -> Option<&Display> {
    if let Some(containing) = displays.iter().find(|display| display.bounds.contains(point)) {
        return Some(containing);
    }

    displays.iter().min_by_key(|display| {
        let (cx, cy) = display.work_area.center();
        let dx = cx - i64::from(point.x);
        let dy = cy - i64::from(point.y);
        dx * dx + dy * dy
    })
}

pub fn side_panel_bounds(display: &Display) -> Rect {
    display
        .work_area
        .docked_right(SIDE_PANEL_WIDTH, SIDE_PANEL_HEIGHT)
}

pub fn main_window_bounds(display: &Display) -> Rect {
    display
        .work_area
        .centered(MAIN_WINDOW_WIDTH, MAIN_WINDOW_HEIGHT)
}

pub fn setup_window_bounds(display: &Display) -> Rect {
    display
        .work_area
        .centered(SETUP_WINDOW_WIDTH, SETUP_WINDOW_HEIGHT)
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tracker is stopped; nothing was queried.
    Idle,
    Unchanged,
    /// Pointer moved to another display; the panel should move to these bounds.
    Moved { display_id: DisplayId, bounds: Rect },
    /// The panel went away between ticks; the tracker stopped itself.
    Stopped,
}

/// Stopped ⇄ Running poller owning the docked display id.
#[derive(Debug, Clone)]
pub struct DisplayTracker {
    running: bool,
    last_display_id: Option<DisplayId>,
    interval: Duration,
}

impl DisplayTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            running: false,
            last_display_id: None,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn last_display_id(&self) -> Option<DisplayId> {
        self.last_display_id
    }

    /// (Re)starts polling with the panel docked to `docked_to`.
    pub fn start(&mut self, docked_to: Option<DisplayId>) {
        self.stop();
        self.last_display_id = docked_to;
        self.running = true;
        tracing::debug!(display_id = ?docked_to, "Display tracking started");
    }

    pub fn stop(&mut self) {
        if self.running {
            tracing::debug!("Display tracking stopped");
        }
        self.running = false;
    }

    /// One poll. `panel_alive` reports whether the side panel still exists.
    pub fn tick(&mut self, displays: &mut dyn DisplayProvider, panel_alive: bool) -> TickOutcome {
        if !self.running {
            return TickOutcome::Idle;
        }
        if !panel_alive {
            self.stop();
            return TickOutcome::Stopped;
        }

        let active = match displays.active_display() {
            Ok(Some(display)) => display,
            Ok(None) => return TickOutcome::Unchanged,
            Err(err) => {
                tracing::debug!(error = %err, "Display query failed; skipping tick");
                return TickOutcome::Unchanged;
            }
        };

        if Some(active.id) == self.last_display_id {
            return TickOutcome::Unchanged;
        }

        self.last_display_id = Some(active.id);
        tracing::debug!(display_id = active.id, "Active display changed");
        TickOutcome::Moved {
            display_id: active.id,
            bounds: side_panel_bounds(&active),
        }
    }
}
