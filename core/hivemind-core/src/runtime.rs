//! The single-threaded event loop.
//!
//! Everything that touches the session store or the window set runs here, one
//! event at a time. Other threads (stdin reader, instance listener) only
//! produce [`AppEvent`]s.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;

use hivemind_protocol::{InstanceHandoff, Request, Response};

use crate::app::App;
use crate::display::DisplayProvider;
use crate::orchestrator::{Control, WindowId, WindowProvider};

#[derive(Debug)]
pub enum AppEvent {
    /// A control request from the view layer.
    Request(Request),
    /// The user closed a window.
    WindowClosed(WindowId),
    /// Dock or taskbar activation.
    Activate,
    /// A later launch handed over its arguments.
    SecondInstance(InstanceHandoff),
    /// The OS delivered a custom-scheme URL.
    OpenUrl(String),
    Quit,
    /// Display-tracker poll.
    Tick,
}

/// Runs until the app asks to exit or every sender is gone.
///
/// While the display tracker is running the loop polls on a fixed schedule;
/// incoming events never push the next poll back. Otherwise it blocks until
/// the next event.
pub fn run_event_loop<W, D, F>(app: &mut App<W, D>, events: Receiver<AppEvent>, mut reply: F)
where
    W: WindowProvider,
    D: DisplayProvider,
    F: FnMut(Response),
{
    let mut next_tick: Option<Instant> = None;
    loop {
        let tracker = app.orchestrator().tracker();
        let event = if tracker.is_running() {
            let interval = tracker.interval();
            let now = Instant::now();
            let deadline = *next_tick.get_or_insert(now + interval);
            if now >= deadline {
                next_tick = Some(now + interval);
                AppEvent::Tick
            } else {
                match events.recv_timeout(deadline.saturating_duration_since(now)) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        } else {
            next_tick = None;
            match events.recv() {
                Ok(event) => event,
                Err(_) => break,
            }
        };

        let handled = app.handle(event);
        if let Some(response) = handled.response {
            reply(response);
        }
        if handled.control == Control::Exit {
            tracing::info!("Event loop exiting");
            break;
        }
    }
}
