//! hivemind-desktop: headless shell for the Hivemind desktop companion.
//!
//! Runs the window orchestrator against in-process providers and speaks the
//! control protocol as newline-delimited JSON on stdin/stdout.
//!
//! ## Subcommands
//!
//! - `run` (default): start, or hand launch arguments to the running instance
//! - `open-url`: deliver a deep link (e.g. the OAuth callback)
//! - `status`: print the session summary (never tokens)
//! - `reset`: replace the session document with the signed-out default

mod logging;

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Sender};
use std::thread;

use clap::{Parser, Subcommand};
use hivemind_core::headless::{HeadlessWindows, VirtualDisplays};
use hivemind_core::{
    data_secret, run_event_loop, ApiClient, App, AppConfig, AppEvent, SessionStatus,
    SessionStore, StorageConfig,
};
use hivemind_protocol::{Request, Response, MAX_REQUEST_BYTES};

#[derive(Parser)]
#[command(name = "hivemind-desktop")]
#[command(about = "Hivemind desktop companion shell")]
#[command(version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Deep link passed by the OS on launch
    #[arg(value_name = "URL")]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the shell (default)
    Run,

    /// Deliver a deep link to the running instance, starting one if needed
    OpenUrl {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Print setup state, user and active workspace
    Status,

    /// Sign out by writing the default session document
    Reset,
}

fn main() {
    let cli = Cli::parse();

    let storage = match StorageConfig::resolve() {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("hivemind-desktop: {}", err);
            std::process::exit(1);
        }
    };
    let _logging_guard = logging::init(Some(&storage.logs_dir()));

    if let Err(err) = storage.ensure_root() {
        tracing::error!(error = %err, "Failed to create data directory");
        std::process::exit(1);
    }
    let config = AppConfig::load(&storage);

    match cli.command {
        Some(Commands::Status) => status(&storage, &config),
        Some(Commands::Reset) => reset(&storage, &config),
        Some(Commands::OpenUrl { url }) => run(&storage, config, Some(url)),
        Some(Commands::Run) | None => run(&storage, config, cli.url),
    }
}

fn status(storage: &StorageConfig, config: &AppConfig) {
    let mut store = SessionStore::load(&storage.store_file(&config.store_name), data_secret());
    let status = SessionStatus::collect(&mut store, None);
    match serde_json::to_string_pretty(&status) {
        Ok(text) => println!("{}", text),
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode status");
            std::process::exit(1);
        }
    }
}

fn reset(storage: &StorageConfig, config: &AppConfig) {
    let path = storage.store_file(&config.store_name);
    let mut store = SessionStore::load(&path, data_secret());
    if let Err(err) = store.reset() {
        tracing::error!(error = %err, "Failed to reset session");
        std::process::exit(1);
    }
    println!("Session reset: {}", path.display());
}

fn run(storage: &StorageConfig, config: AppConfig, url: Option<String>) {
    let (events, receiver) = mpsc::channel();

    #[cfg(unix)]
    let _instance_guard = {
        use hivemind_core::instance::{acquire, InstanceRole};

        let handoff = hivemind_protocol::InstanceHandoff {
            argv: launch_argv(url.as_deref()),
            cwd: env::current_dir()
                .ok()
                .map(|dir| dir.display().to_string()),
        };
        match acquire(&storage.instance_socket(), &handoff) {
            Ok(InstanceRole::Secondary) => return,
            Ok(InstanceRole::Primary(listener)) => {
                let (guard, _thread) = listener.spawn(events.clone());
                guard
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to acquire single-instance lock");
                std::process::exit(1);
            }
        }
    };

    let store = SessionStore::load(&storage.store_file(&config.store_name), data_secret());
    let api = match ApiClient::new(&config) {
        Ok(api) => api,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build API client");
            std::process::exit(1);
        }
    };

    let mut app = App::new(
        config,
        store,
        api,
        HeadlessWindows::new(),
        VirtualDisplays::side_by_side(1),
    );
    app.start();
    if let Some(url) = url {
        app.handle(AppEvent::OpenUrl(url));
    }

    spawn_stdin_reader(events);
    run_event_loop(&mut app, receiver, write_response);
}

/// argv as the running instance should see it, with the link last.
fn launch_argv(url: Option<&str>) -> Vec<String> {
    let mut argv: Vec<String> = env::args().take(1).collect();
    if let Some(url) = url {
        argv.push(url.to_string());
    }
    argv
}

/// Forwards stdin requests to the loop; EOF means the view layer is gone.
fn spawn_stdin_reader(events: Sender<AppEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to read stdin");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if line.len() > MAX_REQUEST_BYTES {
                write_response(Response::error(
                    None,
                    "request_too_large",
                    "request exceeded maximum size",
                ));
                continue;
            }
            match serde_json::from_str::<Request>(&line) {
                Ok(request) => {
                    if events.send(AppEvent::Request(request)).is_err() {
                        return;
                    }
                }
                Err(err) => write_response(Response::error(
                    None,
                    "invalid_json",
                    format!("request was not valid JSON: {}", err),
                )),
            }
        }
        let _ = events.send(AppEvent::Quit);
    });
}

fn write_response(response: Response) {
    if let Err(err) = try_write_response(&response) {
        tracing::warn!(error = %err, "Failed to write response");
    }
}

fn try_write_response(response: &Response) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, response)?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}
