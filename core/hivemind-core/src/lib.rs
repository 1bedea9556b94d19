//! # hivemind-core
//!
//! Session and window-lifecycle core for the Hivemind desktop companion.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Blocking HTTP with a bounded timeout.
//! - **Single writer**: One event loop owns the session store and the window set;
//!   other threads only send [`AppEvent`]s.
//! - **Self-healing storage**: Missing or corrupt files yield defaults, tokens that
//!   no longer decrypt are cleared, never surfaced as crashes.
//! - **Injected OS capabilities**: Windowing and display queries sit behind
//!   [`WindowProvider`] and [`DisplayProvider`]; [`headless`] implements both.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hivemind_core::{App, AppConfig, ApiClient, SessionStore, StorageConfig};
//! use hivemind_core::headless::{HeadlessWindows, VirtualDisplays};
//!
//! let storage = StorageConfig::resolve()?;
//! let config = AppConfig::load(&storage);
//! let store = SessionStore::load(&storage.store_file(&config.store_name), data_secret());
//! let api = ApiClient::new(&config)?;
//! let mut app = App::new(config, store, api, HeadlessWindows::new(), VirtualDisplays::side_by_side(1));
//! app.start();
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod deeplink;
pub mod display;
pub mod error;
pub mod headless;
#[cfg(unix)]
pub mod instance;
pub mod orchestrator;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod types;
pub mod vault;

pub use api::{ApiClient, RetryPolicy};
pub use app::{App, Handled, SessionStatus, SystemBrowser, UrlOpener};
pub use config::{data_secret, AppConfig};
pub use display::{Display, DisplayId, DisplayProvider, DisplayTracker, Point, Rect, TickOutcome};
pub use error::{HivemindError, Result};
pub use orchestrator::{
    Control, Orchestrator, OrchestratorState, SkipReason, SurfaceKind, Transition, ViewMessage,
    WindowId, WindowProvider, WindowSpec,
};
pub use runtime::{run_event_loop, AppEvent};
pub use session::{SecretField, SessionDocument, SessionField, SessionStore, SessionValue};
pub use storage::StorageConfig;
pub use types::*;
