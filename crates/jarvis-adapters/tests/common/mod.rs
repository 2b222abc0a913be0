#![allow(dead_code)]

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};
use tiny_http::{Response, Server, StatusCode};

use jarvis_core::{PortError, Prompter};

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

/// Scratch home directory, removed on drop.
pub struct TempHome {
    path: PathBuf,
}

impl TempHome {
    pub fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "jarvis-{tag}-{}-{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("create temp home");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path.join(name);
        fs::write(&path, body).expect("write fixture");
        path
    }
}

impl Drop for TempHome {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// What a mock node answers: an HTTP status plus a body.
pub enum Reply {
    Result(Value),
    Error(Value),
    Http(u16),
}

/// JSON-RPC node on a random local port. Returns its URL and the methods
/// it has served so far.
pub fn spawn_rpc_node<F>(handler: F) -> (String, Arc<Mutex<Vec<String>>>)
where
    F: Fn(&str, &Value) -> Reply + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").expect("start server");
    let url = format!("http://{}", server.server_addr());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    thread::spawn(move || {
        for mut req in server.incoming_requests() {
            let mut body = String::new();
            let _ = req.as_reader().read_to_string(&mut body);
            let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            let method = payload["method"].as_str().unwrap_or_default().to_owned();
            if let Ok(mut g) = log.lock() {
                g.push(method.clone());
            }
            let (code, out) = match handler(&method, &payload["params"]) {
                Reply::Result(result) => (200, json!({"jsonrpc": "2.0", "id": 1, "result": result})),
                Reply::Error(error) => (200, json!({"jsonrpc": "2.0", "id": 1, "error": error})),
                Reply::Http(code) => (code, json!({"error": "unavailable"})),
            };
            let response = Response::from_string(out.to_string())
                .with_status_code(StatusCode(code))
                .with_header(
                    "Content-Type: application/json"
                        .parse::<tiny_http::Header>()
                        .expect("header"),
                );
            let _ = req.respond(response);
        }
    });
    (url, seen)
}

/// Plain HTTP server answering every GET with `body`; records request URLs.
pub fn spawn_http(code: u16, body: Value) -> (String, Arc<Mutex<Vec<String>>>) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let url = format!("http://{}", server.server_addr());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    thread::spawn(move || {
        for req in server.incoming_requests() {
            if let Ok(mut g) = log.lock() {
                g.push(req.url().to_owned());
            }
            let response =
                Response::from_string(body.to_string()).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });
    (url, seen)
}

/// Answers secret prompts from a queue and records the questions.
#[derive(Default)]
pub struct QueuedPrompter {
    pub secrets: Mutex<Vec<String>>,
    pub asked: Mutex<Vec<String>>,
}

impl QueuedPrompter {
    pub fn with_secrets(secrets: &[&str]) -> Self {
        Self {
            secrets: Mutex::new(secrets.iter().rev().map(|s| s.to_string()).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }
}

impl Prompter for QueuedPrompter {
    fn confirm(&self, _message: &str) -> Result<bool, PortError> {
        Ok(true)
    }

    fn input(&self, message: &str) -> Result<String, PortError> {
        self.secret(message)
    }

    fn secret(&self, message: &str) -> Result<String, PortError> {
        self.asked.lock().expect("asked lock").push(message.to_owned());
        self.secrets
            .lock()
            .expect("secrets lock")
            .pop()
            .ok_or_else(|| PortError::Aborted("no scripted answer".to_owned()))
    }

    fn select(&self, _message: &str, _options: &[String]) -> Result<usize, PortError> {
        Ok(0)
    }
}
