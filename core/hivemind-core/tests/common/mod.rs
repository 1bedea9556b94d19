#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use hivemind_core::{ApiClient, AppConfig, SessionStore, User};

/// A canned HTTP reply.
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// Serves `replies` in order, one connection each, and reports the raw text
/// of every request it received.
pub fn stub_server(replies: Vec<Reply>) -> (String, Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for reply in replies {
            let (mut stream, _) = match listener.accept() {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let request = read_request(&mut stream);
            let _ = tx.send(request);

            let response = format!(
                "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.status,
                reply.body.len(),
                reply.body
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });

    (base, rx)
}

fn read_request(stream: &mut std::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buffer);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn client_for(base: &str) -> ApiClient {
    let config = AppConfig {
        api_base_url: base.to_string(),
        github_api_base_url: base.to_string(),
        ..AppConfig::default()
    };
    ApiClient::new(&config).unwrap()
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        username: "u".to_string(),
        email: "e".to_string(),
    }
}

/// A signed-in store with both tokens set.
pub fn signed_in_store(secret: &str) -> SessionStore {
    let mut store = SessionStore::new_in_memory(secret);
    store
        .complete_setup(user("1"), Some("T1"), Some("T2"))
        .unwrap();
    store
}

pub const WORKSPACE_JSON: &str = r#"{
    "id": "ws-1",
    "name": "Hive",
    "github_repo_url": "https://github.com/o/r",
    "github_repo_owner": "o",
    "github_repo_name": "r",
    "created_by": {"id": "65f0c1a2b3c4d5e6f7a8b9c0", "username": "u", "email": "e"},
    "members": [{"id": "65f0c1a2b3c4d5e6f7a8b9c0", "username": "u", "email": "e"}],
    "task_count": 2,
    "created_at": "2026-01-30T12:00:00Z",
    "updated_at": "2026-01-30T12:00:00Z"
}"#;
