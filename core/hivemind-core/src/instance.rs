//! Single-instance arbitration over a Unix domain socket.
//!
//! The first process binds `<root>/instance.sock` and becomes primary. Later
//! launches connect, write their argv as one JSON line, wait briefly for the
//! acknowledgement and exit. A socket file nobody listens on is stale and is
//! replaced.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hivemind_protocol::{parse_handoff, InstanceHandoff, Response, MAX_REQUEST_BYTES};

use crate::error::{HivemindError, Result};
use crate::runtime::AppEvent;

const HANDOFF_TIMEOUT: Duration = Duration::from_secs(2);

pub enum InstanceRole {
    /// This process owns the lock.
    Primary(InstanceListener),
    /// Another instance received the handoff; this process should exit.
    Secondary,
}

pub struct InstanceListener {
    listener: UnixListener,
    socket_path: PathBuf,
}

/// Removes the socket file when the primary shuts down.
pub struct InstanceGuard {
    socket_path: PathBuf,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        if let Err(err) = fs_err::remove_file(&self.socket_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(error = %err, "Failed to remove instance socket");
            }
        }
    }
}

/// Claims the lock, or hands `handoff` to the current holder.
pub fn acquire(socket_path: &Path, handoff: &InstanceHandoff) -> Result<InstanceRole> {
    if let Some(parent) = socket_path.parent() {
        fs_err::create_dir_all(parent)
            .map_err(|err| HivemindError::io("creating instance socket directory", err))?;
    }

    match UnixStream::connect(socket_path) {
        Ok(stream) => {
            send_handoff(stream, handoff)?;
            tracing::info!("Handed launch arguments to running instance");
            return Ok(InstanceRole::Secondary);
        }
        Err(err) if is_stale(&err) => {
            remove_stale_socket(socket_path)?;
        }
        Err(err) => {
            return Err(HivemindError::InstanceLock(format!(
                "probing {}: {}",
                socket_path.display(),
                err
            )));
        }
    }

    let listener = UnixListener::bind(socket_path).map_err(|err| {
        HivemindError::InstanceLock(format!("binding {}: {}", socket_path.display(), err))
    })?;
    tracing::info!(path = %socket_path.display(), "Acquired single-instance lock");

    Ok(InstanceRole::Primary(InstanceListener {
        listener,
        socket_path: socket_path.to_path_buf(),
    }))
}

impl InstanceListener {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accepts handoffs on a background thread, forwarding each as
    /// [`AppEvent::SecondInstance`]. The thread ends when the receiver is dropped.
    pub fn spawn(self, events: Sender<AppEvent>) -> (InstanceGuard, JoinHandle<()>) {
        let guard = InstanceGuard {
            socket_path: self.socket_path.clone(),
        };
        let listener = self.listener;

        let handle = thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to accept instance connection");
                        continue;
                    }
                };
                let Some(handoff) = receive_handoff(stream) else {
                    continue;
                };
                if events.send(AppEvent::SecondInstance(handoff)).is_err() {
                    break;
                }
            }
        });

        (guard, handle)
    }
}

fn is_stale(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
    )
}

fn remove_stale_socket(socket_path: &Path) -> Result<()> {
    if socket_path.exists() {
        tracing::debug!(path = %socket_path.display(), "Removing stale instance socket");
        fs_err::remove_file(socket_path)
            .map_err(|err| HivemindError::io("removing stale instance socket", err))?;
    }
    Ok(())
}

fn send_handoff(mut stream: UnixStream, handoff: &InstanceHandoff) -> Result<()> {
    let _ = stream.set_write_timeout(Some(HANDOFF_TIMEOUT));
    let _ = stream.set_read_timeout(Some(HANDOFF_TIMEOUT));

    let mut line = serde_json::to_vec(handoff)
        .map_err(|err| HivemindError::json("encoding instance handoff", err))?;
    line.push(b'\n');
    stream
        .write_all(&line)
        .and_then(|_| stream.flush())
        .map_err(|err| HivemindError::io("writing instance handoff", err))?;

    // The ack is informational; a primary that is slow to answer still got the line.
    let mut ack = String::new();
    match BufReader::new(&stream).read_line(&mut ack) {
        Ok(_) => match serde_json::from_str::<Response>(ack.trim()) {
            Ok(response) if !response.ok => {
                let message = response.error.map(|e| e.message).unwrap_or_default();
                return Err(HivemindError::InstanceLock(format!(
                    "running instance rejected handoff: {}",
                    message
                )));
            }
            _ => {}
        },
        Err(err) => tracing::debug!(error = %err, "No handoff acknowledgement"),
    }
    Ok(())
}

fn receive_handoff(mut stream: UnixStream) -> Option<InstanceHandoff> {
    let _ = stream.set_read_timeout(Some(HANDOFF_TIMEOUT));

    let mut line = Vec::new();
    let read = BufReader::new(&stream)
        .take(MAX_REQUEST_BYTES as u64 + 1)
        .read_until(b'\n', &mut line);

    let parsed = match read {
        Ok(_) if line.len() > MAX_REQUEST_BYTES => Err(hivemind_protocol::ErrorInfo::new(
            "request_too_large",
            "handoff exceeded maximum size",
        )),
        Ok(_) => parse_handoff(&line),
        Err(err) => Err(hivemind_protocol::ErrorInfo::new(
            "read_error",
            format!("failed to read handoff: {}", err),
        )),
    };

    let (response, handoff) = match parsed {
        Ok(handoff) => (Response::ok_empty(None), Some(handoff)),
        Err(info) => {
            tracing::warn!(code = %info.code, message = %info.message, "Rejected instance handoff");
            (Response::error_with_info(None, info), None)
        }
    };

    if let Ok(mut payload) = serde_json::to_vec(&response) {
        payload.push(b'\n');
        let _ = stream.write_all(&payload);
        let _ = stream.flush();
    }
    handoff
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn handoff(args: &[&str]) -> InstanceHandoff {
        InstanceHandoff {
            argv: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
        }
    }

    #[test]
    fn second_launch_hands_over_argv() {
        let temp = tempfile::tempdir().unwrap();
        let socket = temp.path().join("instance.sock");

        let InstanceRole::Primary(listener) = acquire(&socket, &handoff(&["a"])).unwrap() else {
            panic!("first acquire should be primary");
        };
        let (tx, rx) = mpsc::channel();
        let (_guard, _thread) = listener.spawn(tx);

        let role = acquire(&socket, &handoff(&["b", "hivemind://callback"])).unwrap();
        assert!(matches!(role, InstanceRole::Secondary));

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            AppEvent::SecondInstance(received) => {
                assert_eq!(received.argv, vec!["b", "hivemind://callback"]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn stale_socket_file_is_replaced() {
        let temp = tempfile::tempdir().unwrap();
        let socket = temp.path().join("instance.sock");
        std::fs::write(&socket, b"").unwrap();

        let role = acquire(&socket, &handoff(&[])).unwrap();
        assert!(matches!(role, InstanceRole::Primary(_)));
    }

    #[test]
    fn guard_removes_socket() {
        let temp = tempfile::tempdir().unwrap();
        let socket = temp.path().join("instance.sock");
        let InstanceRole::Primary(listener) = acquire(&socket, &handoff(&[])).unwrap() else {
            panic!("expected primary");
        };
        let (tx, _rx) = mpsc::channel();
        let (guard, _thread) = listener.spawn(tx);
        assert!(socket.exists());
        drop(guard);
        assert!(!socket.exists());
    }
}
