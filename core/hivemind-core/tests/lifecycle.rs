//! Window lifecycle, login handshake and first-run behaviour through the public API.

mod common;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use hivemind_core::deeplink::{apply_callback, handle_deep_link, parse_callback};
use hivemind_core::headless::{HeadlessWindows, VirtualDisplays, WindowOp};
use hivemind_core::{
    run_event_loop, ApiClient, App, AppConfig, AppEvent, Control, DisplayTracker, HivemindError,
    Orchestrator, SecretField, SessionDocument, SessionStore, StorageConfig, SurfaceKind,
    Transition, WindowProvider,
};
use hivemind_protocol::{Method, Request};

const CALLBACK: &str = "hivemind://callback?user=%7B%22id%22%3A1%2C%22username%22%3A%22u%22%2C%22email%22%3A%22e%22%7D&token=T1&github_token=T2";

fn orchestrator() -> Orchestrator {
    Orchestrator::new(DisplayTracker::new(Duration::from_millis(500)), true)
}

#[test]
fn at_most_one_surface_across_any_request_sequence() {
    let mut orch = orchestrator();
    let mut windows = HeadlessWindows::new();
    let mut displays = VirtualDisplays::side_by_side(2);

    // Setup incomplete, then complete; requests interleaved with user closes.
    let steps: [(&str, bool); 12] = [
        ("setup", false),
        ("main", false),
        ("side", false),
        ("setup", false),
        ("main", true),
        ("side", true),
        ("main", true),
        ("close", true),
        ("side", true),
        ("activate", true),
        ("close", true),
        ("main", true),
    ];

    for (step, setup_complete) in steps {
        match step {
            "setup" => {
                let _ = orch.request_setup(&mut windows, &mut displays, setup_complete);
            }
            "side" => {
                let _ = orch.request_side_panel(&mut windows, &mut displays, setup_complete);
            }
            "main" => {
                let _ = orch.request_main(&mut windows, &mut displays, setup_complete);
            }
            "activate" => {
                let _ = orch.on_activate(&mut windows, &mut displays, setup_complete);
            }
            "close" => {
                if let Some(kind) = orch.active_surface() {
                    let id = orch.window_id(kind).unwrap();
                    windows.close(id);
                    orch.on_window_closed(&mut windows, &mut displays, id, setup_complete);
                }
            }
            _ => unreachable!(),
        }
        assert!(
            windows.alive_count() <= 1,
            "{} windows alive after {}",
            windows.alive_count(),
            step
        );
        assert!(orch.alive_surfaces().len() <= 1);
        assert_eq!(
            orch.tracker().is_running(),
            orch.active_surface() == Some(SurfaceKind::SidePanel),
            "tracker must run exactly while the side panel lives (after {})",
            step
        );
    }
}

#[test]
fn closing_main_reopens_side_panel() {
    let mut orch = orchestrator();
    let mut windows = HeadlessWindows::new();
    let mut displays = VirtualDisplays::side_by_side(1);

    orch.request_main(&mut windows, &mut displays, true).unwrap();
    let main = orch.window_id(SurfaceKind::Main).unwrap();
    windows.close(main);

    assert_eq!(
        orch.on_window_closed(&mut windows, &mut displays, main, true),
        Control::Continue
    );
    assert_eq!(orch.alive_surfaces(), vec![SurfaceKind::SidePanel]);
    assert_eq!(windows.alive_count(), 1);
}

#[test]
fn callback_completes_login_and_closes_prior_windows() {
    let temp = tempfile::tempdir().unwrap();
    let path = StorageConfig::with_root(temp.path().to_path_buf()).store_file("Desktop");
    let mut store = SessionStore::load(&path, "secret");
    let mut orch = orchestrator();
    let mut windows = HeadlessWindows::new();
    let mut displays = VirtualDisplays::side_by_side(1);

    orch.request_setup(&mut windows, &mut displays, false).unwrap();
    let setup = orch.window_id(SurfaceKind::Setup).unwrap();

    let payload = parse_callback(CALLBACK, "hivemind").unwrap().unwrap();
    let transition = apply_callback(payload, &mut store, &mut orch, &mut windows, &mut displays).unwrap();

    assert!(store.setup_complete());
    assert_eq!(store.get_decrypted(SecretField::Primary).as_deref(), Some("T1"));
    assert_eq!(store.get_decrypted(SecretField::Secondary).as_deref(), Some("T2"));
    assert!(!windows.is_alive(setup));
    assert!(matches!(
        transition,
        Transition::Opened {
            kind: SurfaceKind::SidePanel,
            ..
        }
    ));

    let reloaded = SessionStore::load(&path, "secret");
    assert!(reloaded.setup_complete());
    assert_eq!(
        reloaded.current_user().map(|user| user.id.as_str()),
        Some("1")
    );
}

#[test]
fn backend_callback_with_object_id_completes_setup() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("Desktop.json");
    let mut store = SessionStore::load(&path, "secret");
    let mut orch = orchestrator();
    let mut windows = HeadlessWindows::new();
    let mut displays = VirtualDisplays::side_by_side(1);
    orch.request_setup(&mut windows, &mut displays, false).unwrap();

    // Percent-encoded `{"id": "65f0c1a2b3c4d5e6f7a8b9c0", "username": "u", "email": "e"}`.
    let link = "hivemind://callback?user=%7B%22id%22%3A%20%2265f0c1a2b3c4d5e6f7a8b9c0%22%2C%20%22username%22%3A%20%22u%22%2C%20%22email%22%3A%20%22e%22%7D&token=T1";
    handle_deep_link(link, "hivemind", &mut store, &mut orch, &mut windows, &mut displays)
        .unwrap();

    assert!(store.setup_complete());
    let reloaded = SessionStore::load(&path, "secret");
    assert_eq!(
        reloaded.current_user().map(|user| user.id.as_str()),
        Some("65f0c1a2b3c4d5e6f7a8b9c0")
    );
    assert_eq!(orch.active_surface(), Some(SurfaceKind::SidePanel));
}

#[test]
fn malformed_callback_leaves_document_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("Desktop.json");
    let mut store = SessionStore::load(&path, "secret");
    store
        .set_active_workspace_id(Some("ws-1".to_string()))
        .unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let mut orch = orchestrator();
    let mut windows = HeadlessWindows::new();
    let mut displays = VirtualDisplays::side_by_side(1);
    orch.request_setup(&mut windows, &mut displays, false).unwrap();

    let err = handle_deep_link(
        "hivemind://callback?user=not-json&token=T1",
        "hivemind",
        &mut store,
        &mut orch,
        &mut windows,
        &mut displays,
    )
    .unwrap_err();

    assert!(matches!(err, HivemindError::DeepLinkParse(_)));
    assert!(!store.setup_complete());
    assert!(store.document().primary_token_cipher.is_none());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    assert_eq!(orch.active_surface(), Some(SurfaceKind::Setup));
}

#[test]
fn first_run_yields_default_document() {
    let temp = tempfile::tempdir().unwrap();
    let storage = StorageConfig::with_root(temp.path().join("nested"));
    let store = SessionStore::load(&storage.store_file("Desktop"), "");
    assert_eq!(store.document(), &SessionDocument::default());
}

#[test]
fn event_loop_serves_requests_until_quit() {
    let config = AppConfig {
        api_base_url: "http://127.0.0.1:9".to_string(),
        display_poll_interval_ms: 5,
        ..AppConfig::default()
    };
    let api = ApiClient::new(&config).unwrap();
    let mut store = SessionStore::new_in_memory("secret");
    store
        .complete_setup(common::user("1"), Some("T1"), None)
        .unwrap();
    let mut app = App::new(
        config,
        store,
        api,
        HeadlessWindows::new(),
        VirtualDisplays::side_by_side(1),
    );
    app.start();
    assert!(app.orchestrator().tracker().is_running());

    let (events, receiver) = mpsc::channel();
    let sender = thread::spawn(move || {
        events
            .send(AppEvent::Request(
                Request::new(Method::GetStatus, None).with_id("status"),
            ))
            .unwrap();
        // Let a few tracker ticks pass.
        thread::sleep(Duration::from_millis(30));
        events
            .send(AppEvent::Request(Request::new(Method::OpenMainWindow, None).with_id("main")))
            .unwrap();
        events.send(AppEvent::Quit).unwrap();
    });

    let mut responses = Vec::new();
    run_event_loop(&mut app, receiver, |response| responses.push(response));
    sender.join().unwrap();

    let ids: Vec<_> = responses.iter().filter_map(|r| r.id.as_deref()).collect();
    assert_eq!(ids, vec!["status", "main"]);
    assert!(responses.iter().all(|r| r.ok));
    assert_eq!(app.windows().alive_count(), 0);
    assert!(app.orchestrator().is_quitting());
}

#[test]
fn display_poll_keeps_its_schedule_under_steady_requests() {
    let config = AppConfig {
        api_base_url: "http://127.0.0.1:9".to_string(),
        display_poll_interval_ms: 50,
        ..AppConfig::default()
    };
    let api = ApiClient::new(&config).unwrap();
    let mut store = SessionStore::new_in_memory("secret");
    store
        .complete_setup(common::user("1"), Some("T1"), None)
        .unwrap();
    let mut app = App::new(
        config,
        store,
        api,
        HeadlessWindows::new(),
        VirtualDisplays::side_by_side(2),
    );
    app.start();
    let panel = app.orchestrator().window_id(SurfaceKind::SidePanel).unwrap();
    app.displays_mut().move_cursor_to_display(2);

    let (events, receiver) = mpsc::channel();
    let sender = thread::spawn(move || {
        // Faster than the poll interval, so a reset-on-event timer never fires.
        for _ in 0..30 {
            events
                .send(AppEvent::Request(Request::new(Method::GetStatus, None)))
                .unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        events.send(AppEvent::Quit).unwrap();
    });

    let mut responses = 0;
    run_event_loop(&mut app, receiver, |_| responses += 1);
    sender.join().unwrap();

    assert_eq!(responses, 30);
    let moves = app
        .windows()
        .ops()
        .iter()
        .filter(|op| matches!(op, WindowOp::SetBounds(id, _) if *id == panel))
        .count();
    assert!(moves >= 1, "panel never followed the pointer");
}
