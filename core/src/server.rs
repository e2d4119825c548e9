use crate::docs::DocumentStore;
use crate::error::RpcError;
use crate::handlers;
use crate::search::terminate_child;
use crate::transport;
use serde_json::json;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::RwLock;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

/// Cancellation surface of one dispatched request: a monotonic cancel flag
/// plus the pid of the currently running search child (0 when none).
#[derive(Default)]
pub(crate) struct InFlight {
    pub(crate) cancelled: CancellationToken,
    pub(crate) child_pid: AtomicI32,
}

#[derive(Default)]
pub(crate) struct WorkspaceRoots {
    pub(crate) root_uri: String,
    pub(crate) root_path: String,
}

/// State shared between the dispatch loop and its request workers.
pub(crate) struct SessionState {
    pub(crate) docs: DocumentStore,
    pub(crate) serve_files: Vec<String>,
    pub(crate) roots: RwLock<WorkspaceRoots>,
    pub(crate) file_status: AtomicBool,
    inflight: Mutex<HashMap<String, Arc<InFlight>>>,
}

impl SessionState {
    pub(crate) fn lock_inflight(&self) -> MutexGuard<'_, HashMap<String, Arc<InFlight>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Framed-stdio LSP session: single reader loop, per-request worker tasks,
/// and a write mutex that keeps response frames whole.
pub struct Server<R, W> {
    reader: BufReader<R>,
    writer: Arc<tokio::sync::Mutex<W>>,
    state: Arc<SessionState>,
    trace: bool,
    shutdown_received: bool,
    exit_requested: bool,
}

impl<R, W> Server<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// `serve_files`, when non-empty, pins every search to that explicit
    /// file list instead of recursing over the workspace root.
    pub fn new(reader: R, writer: W, serve_files: Vec<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            state: Arc::new(SessionState {
                docs: DocumentStore::default(),
                serve_files,
                roots: RwLock::new(WorkspaceRoots::default()),
                file_status: AtomicBool::new(false),
                inflight: Mutex::new(HashMap::new()),
            }),
            trace: trace_enabled(),
            shutdown_received: false,
            exit_requested: false,
        }
    }

    /// Serves the session until `exit` or stream close. Resolves to whether
    /// a `shutdown` request was seen; the CLI turns that into exit code 0.
    pub async fn run(mut self) -> bool {
        loop {
            let body = match transport::read_message(&mut self.reader).await {
                Ok(Some(body)) => body,
                Ok(None) => break,
                Err(err) => {
                    warn!("transport read failed: {err}");
                    break;
                }
            };
            if body.is_empty() {
                continue;
            }
            self.handle_message(&body).await;
            if self.exit_requested {
                break;
            }
        }
        self.shutdown_received
    }

    async fn handle_message(&mut self, body: &[u8]) {
        let message: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to parse message: {err}");
                return;
            }
        };
        if !message.is_object() {
            warn!("failed to parse message: not an object");
            return;
        }
        let Some(method) = message
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return;
        };
        if self.trace {
            debug!("LSP <= {method}");
        }
        let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
        match message.get("id") {
            Some(id) => self.handle_request(&method, id.clone(), params).await,
            None => self.handle_notification(&method, &params).await,
        }
    }

    async fn handle_request(&mut self, method: &str, id: Value, params: Value) {
        match method {
            "initialize" => {
                let result = handlers::initialize(&self.state, &params);
                self.reply_result(&id, result).await;
            }
            "shutdown" => {
                self.shutdown_received = true;
                self.reply_result(&id, Value::Null).await;
            }
            // vscode-clangd issues these for fix-its/tweaks and source/header
            // switching; replying null is better editor UX than -32601.
            "workspace/executeCommand" | "textDocument/switchSourceHeader" => {
                self.reply_result(&id, Value::Null).await;
            }
            "workspace/symbol"
            | "textDocument/hover"
            | "textDocument/definition"
            | "textDocument/references" => {
                // Potentially slow: run on a worker so $/cancelRequest can be
                // processed while the search child is still producing output.
                self.dispatch_worker(method, id, params);
            }
            other => {
                self.reply_error(&id, &RpcError::MethodNotFound(other.to_string()))
                    .await;
            }
        }
    }

    fn dispatch_worker(&self, method: &str, id: Value, params: Value) {
        let inflight = Arc::new(InFlight::default());
        let key = inflight_key(&id);
        self.state
            .lock_inflight()
            .insert(key.clone(), inflight.clone());

        let state = self.state.clone();
        let writer = self.writer.clone();
        let method = method.to_string();
        tokio::spawn(async move {
            let result = match method.as_str() {
                "workspace/symbol" => handlers::workspace_symbol(&state, &params, &inflight).await,
                "textDocument/hover" => handlers::hover(&state, &params, &inflight).await,
                "textDocument/definition" => handlers::definition(&state, &params, &inflight).await,
                _ => handlers::references(&state, &params, &inflight).await,
            };
            let response = if inflight.cancelled.is_cancelled() {
                error_response(&id, &RpcError::Cancelled)
            } else {
                match result {
                    Ok(value) => result_response(&id, value),
                    Err(err) => error_response(&id, &RpcError::Internal(err.to_string())),
                }
            };
            // The response goes out before the entry is dropped, so a late
            // $/cancelRequest can never observe a half-finished request.
            write_value(&writer, &response).await;
            state.lock_inflight().remove(&key);
        });
    }

    async fn handle_notification(&mut self, method: &str, params: &Value) {
        match method {
            "initialized" | "$/setTrace" | "workspace/didChangeConfiguration" => {}
            "exit" => self.exit_requested = true,
            "$/cancelRequest" => self.on_cancel_request(params),
            "textDocument/didOpen" => self.on_did_open(params).await,
            "textDocument/didChange" => self.on_did_change(params).await,
            "textDocument/didClose" => self.on_did_close(params),
            _ => {}
        }
    }

    fn on_cancel_request(&self, params: &Value) {
        let Some(id) = params.get("id") else {
            return;
        };
        let inflight = self.state.lock_inflight().get(&inflight_key(id)).cloned();
        // Unknown or already-completed ids are silently dropped.
        let Some(inflight) = inflight else {
            return;
        };
        inflight.cancelled.cancel();
        let pid = inflight.child_pid.load(Ordering::Acquire);
        if pid > 0 {
            terminate_child(pid);
        }
    }

    async fn on_did_open(&self, params: &Value) {
        let document = params.get("textDocument").cloned().unwrap_or_default();
        let uri = document.get("uri").and_then(Value::as_str).unwrap_or_default();
        if uri.is_empty() {
            return;
        }
        let text = document
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.state.docs.upsert(uri, text.to_string());
        self.notify_file_status(uri).await;
    }

    async fn on_did_change(&self, params: &Value) {
        let document = params.get("textDocument").cloned().unwrap_or_default();
        let uri = document.get("uri").and_then(Value::as_str).unwrap_or_default();
        if uri.is_empty() {
            return;
        }
        // Full-sync only: the first change carries the whole new text.
        let Some(text) = params
            .get("contentChanges")
            .and_then(Value::as_array)
            .and_then(|changes| changes.first())
            .map(|change| change.get("text").and_then(Value::as_str).unwrap_or_default())
        else {
            return;
        };
        self.state.docs.upsert(uri, text.to_string());
        self.notify_file_status(uri).await;
    }

    fn on_did_close(&self, params: &Value) {
        let document = params.get("textDocument").cloned().unwrap_or_default();
        let uri = document.get("uri").and_then(Value::as_str).unwrap_or_default();
        if uri.is_empty() {
            return;
        }
        self.state.docs.remove(uri);
    }

    async fn notify_file_status(&self, uri: &str) {
        if !self.state.file_status.load(Ordering::Relaxed) {
            return;
        }
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "textDocument/clangd.fileStatus",
            "params": {"uri": uri, "state": "Idle"},
        });
        write_value(&self.writer, &notification).await;
    }

    async fn reply_result(&self, id: &Value, result: Value) {
        write_value(&self.writer, &result_response(id, result)).await;
    }

    async fn reply_error(&self, id: &Value, error: &RpcError) {
        write_value(&self.writer, &error_response(id, error)).await;
    }
}

// Stable key for numeric and string ids: the id's compact JSON text, so
// `7` and `"7"` never collide.
fn inflight_key(id: &Value) -> String {
    id.to_string()
}

fn result_response(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error_response(id: &Value, error: &RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": error.code(), "message": error.to_string()},
    })
}

async fn write_value<W>(writer: &Arc<tokio::sync::Mutex<W>>, value: &Value)
where
    W: AsyncWrite + Unpin,
{
    let body = match serde_json::to_vec(value) {
        Ok(body) => body,
        Err(err) => {
            warn!("failed to serialize response: {err}");
            return;
        }
    };
    let mut guard = writer.lock().await;
    if let Err(err) = transport::write_message(&mut *guard, &body).await {
        warn!("transport write failed: {err}");
    }
}

fn trace_enabled() -> bool {
    let enabled = |name: &str| {
        std::env::var(name)
            .map(|value| !value.is_empty() && value != "0")
            .unwrap_or(false)
    };
    enabled("SLCLANGD_TRACE") || enabled("CLANGD_TRACE")
}
