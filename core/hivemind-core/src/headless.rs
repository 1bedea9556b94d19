//! In-process window and display providers.
//!
//! These back the desktop binary when no native shell is attached and let the
//! orchestrator be exercised end to end in tests. Windows are records, not
//! real surfaces; every operation is kept in an op log.

use std::collections::{BTreeMap, VecDeque};

use crate::display::{Display, DisplayId, DisplayProvider, Point, Rect};
use crate::error::{HivemindError, Result};
use crate::orchestrator::{ViewMessage, WindowId, WindowProvider, WindowSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessWindow {
    pub spec: WindowSpec,
    pub bounds: Rect,
    pub ignore_mouse: bool,
    pub focused: bool,
    /// Messages delivered to the window content, oldest first.
    pub messages: Vec<ViewMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowOp {
    Open(WindowId),
    Close(WindowId),
    SetBounds(WindowId, Rect),
    SetIgnoreMouse(WindowId, bool),
    Focus(WindowId),
    Send(WindowId, ViewMessage),
}

#[derive(Debug, Default)]
pub struct HeadlessWindows {
    next_id: WindowId,
    windows: BTreeMap<WindowId, HeadlessWindow>,
    ops: Vec<WindowOp>,
    fail_next_open: bool,
}

impl HeadlessWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self, id: WindowId) -> Option<&HeadlessWindow> {
        self.windows.get(&id)
    }

    pub fn alive_count(&self) -> usize {
        self.windows.len()
    }

    pub fn alive(&self) -> impl Iterator<Item = (WindowId, &HeadlessWindow)> {
        self.windows.iter().map(|(id, window)| (*id, window))
    }

    pub fn ops(&self) -> &[WindowOp] {
        &self.ops
    }

    /// Makes the next `open` fail, as a native shell might under resource pressure.
    pub fn fail_next_open(&mut self) {
        self.fail_next_open = true;
    }

    fn get_mut(&mut self, id: WindowId) -> Result<&mut HeadlessWindow> {
        self.windows
            .get_mut(&id)
            .ok_or_else(|| HivemindError::Window(format!("window {} is not open", id)))
    }
}

impl WindowProvider for HeadlessWindows {
    fn open(&mut self, spec: &WindowSpec) -> Result<WindowId> {
        if std::mem::take(&mut self.fail_next_open) {
            return Err(HivemindError::Window(format!(
                "could not create {} window",
                spec.kind.view_name()
            )));
        }
        self.next_id += 1;
        let id = self.next_id;
        self.windows.insert(
            id,
            HeadlessWindow {
                spec: spec.clone(),
                bounds: spec.bounds,
                ignore_mouse: spec.click_through,
                focused: true,
                messages: Vec::new(),
            },
        );
        for (other, window) in self.windows.iter_mut() {
            window.focused = *other == id;
        }
        self.ops.push(WindowOp::Open(id));
        tracing::debug!(window_id = id, view = spec.kind.view_name(), "Headless window opened");
        Ok(id)
    }

    fn close(&mut self, id: WindowId) {
        if self.windows.remove(&id).is_some() {
            self.ops.push(WindowOp::Close(id));
            tracing::debug!(window_id = id, "Headless window closed");
        }
    }

    fn is_alive(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    fn set_bounds(&mut self, id: WindowId, bounds: Rect) -> Result<()> {
        self.get_mut(id)?.bounds = bounds;
        self.ops.push(WindowOp::SetBounds(id, bounds));
        Ok(())
    }

    fn set_ignore_mouse(&mut self, id: WindowId, ignore: bool, _forward: bool) -> Result<()> {
        self.get_mut(id)?.ignore_mouse = ignore;
        self.ops.push(WindowOp::SetIgnoreMouse(id, ignore));
        Ok(())
    }

    fn focus(&mut self, id: WindowId) -> Result<()> {
        self.get_mut(id)?;
        for (other, window) in self.windows.iter_mut() {
            window.focused = *other == id;
        }
        self.ops.push(WindowOp::Focus(id));
        Ok(())
    }

    fn send(&mut self, id: WindowId, message: ViewMessage) -> Result<()> {
        self.get_mut(id)?.messages.push(message.clone());
        self.ops.push(WindowOp::Send(id, message));
        Ok(())
    }
}

/// A fixed monitor layout with a scriptable pointer.
///
/// Scripted cursor positions are consumed one per query; once the script is
/// exhausted the last position repeats.
#[derive(Debug, Clone)]
pub struct VirtualDisplays {
    displays: Vec<Display>,
    cursor: Point,
    script: VecDeque<Point>,
}

impl VirtualDisplays {
    pub fn new(displays: Vec<Display>) -> Self {
        let cursor = displays
            .first()
            .map(|display| Point {
                x: display.bounds.x + 1,
                y: display.bounds.y + 1,
            })
            .unwrap_or(Point { x: 0, y: 0 });
        Self {
            displays,
            cursor,
            script: VecDeque::new(),
        }
    }

    /// `count` 1920×1080 monitors laid out left to right, ids starting at 1.
    pub fn side_by_side(count: u32) -> Self {
        let displays = (0..count)
            .map(|index| {
                let bounds = Rect {
                    x: (index * 1920) as i32,
                    y: 0,
                    width: 1920,
                    height: 1080,
                };
                Display {
                    id: index + 1,
                    bounds,
                    work_area: bounds,
                }
            })
            .collect();
        Self::new(displays)
    }

    pub fn set_cursor(&mut self, cursor: Point) {
        self.script.clear();
        self.cursor = cursor;
    }

    pub fn script_cursor<I>(&mut self, positions: I)
    where
        I: IntoIterator<Item = Point>,
    {
        self.script.extend(positions);
    }

    /// Parks the pointer in the middle of display `id`. Unknown ids are ignored.
    pub fn move_cursor_to_display(&mut self, id: DisplayId) {
        if let Some(display) = self.displays.iter().find(|display| display.id == id) {
            let bounds = display.bounds;
            self.set_cursor(Point {
                x: bounds.x + (bounds.width / 2) as i32,
                y: bounds.y + (bounds.height / 2) as i32,
            });
        }
    }
}

impl DisplayProvider for VirtualDisplays {
    fn cursor_position(&mut self) -> Result<Point> {
        if let Some(next) = self.script.pop_front() {
            self.cursor = next;
        }
        Ok(self.cursor)
    }

    fn displays(&mut self) -> Result<Vec<Display>> {
        Ok(self.displays.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_windows_reject_operations() {
        let mut windows = HeadlessWindows::new();
        let spec = WindowSpec::main(Rect {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        });
        let id = windows.open(&spec).unwrap();
        windows.close(id);
        assert!(!windows.is_alive(id));
        assert!(windows.focus(id).is_err());
        assert_eq!(windows.ops(), &[WindowOp::Open(id), WindowOp::Close(id)]);
    }

    #[test]
    fn cursor_script_repeats_last_position() {
        let mut displays = VirtualDisplays::side_by_side(2);
        displays.script_cursor([Point { x: 2000, y: 5 }]);
        assert_eq!(displays.cursor_position().unwrap(), Point { x: 2000, y: 5 });
        assert_eq!(displays.cursor_position().unwrap(), Point { x: 2000, y: 5 });
        assert_eq!(displays.active_display().unwrap().unwrap().id, 2);
    }
}
