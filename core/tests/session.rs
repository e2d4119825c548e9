//! Whole-session tests: a client drives the server over an in-memory duplex
//! stream using the same framing codec the server itself exposes.

use pretty_assertions::assert_eq;
use serde_json::json;
use serde_json::Value;
use slclangd_core::transport;
use slclangd_core::Server;
use std::os::unix::ffi::OsStrExt;
use tokio::io::BufReader;
use tokio::io::DuplexStream;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::task::JoinHandle;

struct TestClient {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    server: JoinHandle<bool>,
}

fn start_server(serve_files: Vec<String>) -> TestClient {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_end);
    let server = tokio::spawn(Server::new(server_read, server_write, serve_files).run());
    let (client_read, client_write) = tokio::io::split(client_end);
    TestClient {
        reader: BufReader::new(client_read),
        writer: client_write,
        server,
    }
}

impl TestClient {
    async fn send(&mut self, message: Value) {
        let body = serde_json::to_vec(&message).unwrap();
        transport::write_message(&mut self.writer, &body).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let body = transport::read_message(&mut self.reader)
            .await
            .unwrap()
            .expect("server closed the stream");
        serde_json::from_slice(&body).unwrap()
    }

    async fn initialize(&mut self, params: Value) -> Value {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": params,
        }))
        .await;
        self.recv().await
    }
}

#[tokio::test]
async fn initialize_shutdown_handshake_succeeds() {
    let mut client = start_server(Vec::new());

    let init = client
        .initialize(json!({"rootUri": "file:///tmp/x", "capabilities": {}}))
        .await;
    assert_eq!(init["id"], json!(1));
    assert_eq!(init["result"]["capabilities"]["hoverProvider"], json!(true));
    assert_eq!(
        init["result"]["capabilities"]["textDocumentSync"],
        json!({"openClose": true, "change": 1})
    );
    assert_eq!(
        init["result"]["serverInfo"],
        json!({"name": "super-lazy-clangd", "version": "0.1.0"})
    );

    client
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "shutdown"}))
        .await;
    let shutdown = client.recv().await;
    assert_eq!(shutdown["id"], json!(2));
    assert_eq!(shutdown["result"], Value::Null);

    client.send(json!({"jsonrpc": "2.0", "method": "exit"})).await;
    assert!(client.server.await.unwrap());
}

#[tokio::test]
async fn stream_close_without_shutdown_is_a_failure_exit() {
    let client = start_server(Vec::new());
    drop(client.reader);
    drop(client.writer);
    assert!(!client.server.await.unwrap());
}

#[tokio::test]
async fn unknown_method_gets_method_not_found() {
    let mut client = start_server(Vec::new());
    client.initialize(json!({})).await;

    client
        .send(json!({"jsonrpc": "2.0", "id": 9, "method": "textDocument/formatting"}))
        .await;
    let response = client.recv().await;
    assert_eq!(response["id"], json!(9));
    assert_eq!(response["error"]["code"], json!(-32601));
    assert_eq!(
        response["error"]["message"],
        json!("Method not found: textDocument/formatting")
    );
}

#[tokio::test]
async fn hover_on_unknown_document_returns_null() {
    let mut client = start_server(Vec::new());
    client.initialize(json!({"rootUri": "file:///tmp/x"})).await;

    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": 10,
            "method": "textDocument/hover",
            "params": {
                "textDocument": {"uri": "file:///no/such"},
                "position": {"line": 0, "character": 0},
            },
        }))
        .await;
    let response = client.recv().await;
    assert_eq!(response["id"], json!(10));
    assert_eq!(response["result"], Value::Null);
}

#[tokio::test]
async fn workspace_symbol_with_empty_query_returns_empty_array() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.cpp");
    std::fs::write(&file, "int alpha = 1;\n").unwrap();

    let mut client = start_server(vec![file.to_string_lossy().into_owned()]);
    client.initialize(json!({})).await;

    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "workspace/symbol",
            "params": {"query": ""},
        }))
        .await;
    let response = client.recv().await;
    assert_eq!(response["id"], json!(3));
    assert_eq!(response["result"], json!([]));
}

#[tokio::test]
async fn cancel_request_yields_request_cancelled_and_session_survives() {
    let dir = tempfile::tempdir().unwrap();
    // grep blocks opening a FIFO with no writer, so the request stays in
    // flight until the cancel path terminates the child.
    let fifo = dir.path().join("blocked.fifo");
    let fifo_c = std::ffi::CString::new(fifo.as_os_str().as_bytes()).unwrap();
    assert_eq!(unsafe { libc::mkfifo(fifo_c.as_ptr(), 0o644) }, 0);

    let mut client = start_server(vec![fifo.to_string_lossy().into_owned()]);
    client.initialize(json!({})).await;

    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "method": "workspace/symbol",
            "params": {"query": "needle"},
        }))
        .await;
    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "$/cancelRequest",
            "params": {"id": "abc"},
        }))
        .await;

    let response = client.recv().await;
    assert_eq!(response["id"], json!("abc"));
    assert_eq!(response["error"]["code"], json!(-32800));
    assert_eq!(response["error"]["message"], json!("Request cancelled"));

    // The session keeps serving afterwards.
    client
        .send(json!({"jsonrpc": "2.0", "id": 5, "method": "shutdown"}))
        .await;
    let shutdown = client.recv().await;
    assert_eq!(shutdown["id"], json!(5));
    assert_eq!(shutdown["result"], Value::Null);

    client.send(json!({"jsonrpc": "2.0", "method": "exit"})).await;
    assert!(client.server.await.unwrap());
}

#[tokio::test]
async fn cancel_for_unknown_id_is_silently_dropped() {
    let mut client = start_server(Vec::new());
    client.initialize(json!({})).await;

    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "$/cancelRequest",
            "params": {"id": 424242},
        }))
        .await;

    // Still responsive, and no stray response was produced for the cancel.
    client
        .send(json!({"jsonrpc": "2.0", "id": 6, "method": "shutdown"}))
        .await;
    let response = client.recv().await;
    assert_eq!(response["id"], json!(6));
}

#[tokio::test]
async fn definition_returns_single_strong_hit() {
    let dir = tempfile::tempdir().unwrap();
    let source = "\
int compute(int x) { return x + 1; }
int usage_a = compute + 1;
// compute mentioned in a comment
const char* label = \"compute\";
int usage_b = compute + 2;
";
    let file = dir.path().join("math.cpp");
    std::fs::write(&file, source).unwrap();
    let root_uri = format!("file://{}", dir.path().display());
    let doc_uri = format!("file://{}", file.display());

    let mut client = start_server(Vec::new());
    client.initialize(json!({"rootUri": root_uri})).await;
    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didOpen",
            "params": {"textDocument": {"uri": doc_uri.as_str(), "text": source}},
        }))
        .await;

    // Cursor sits inside the plain `compute` mention on the second line; the
    // definition on the first line is the only strong-scoring hit.
    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": 11,
            "method": "textDocument/definition",
            "params": {
                "textDocument": {"uri": doc_uri.as_str()},
                "position": {"line": 1, "character": 16},
            },
        }))
        .await;
    let response = client.recv().await;
    assert_eq!(response["id"], json!(11));

    let locations = response["result"].as_array().expect("locations array");
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0]["range"]["start"]["line"], json!(0));
    assert_eq!(locations[0]["range"]["start"]["character"], json!(4));
    let uri = locations[0]["uri"].as_str().unwrap();
    assert!(uri.ends_with("math.cpp"));
}

#[tokio::test]
async fn file_status_notification_follows_open_when_requested() {
    let mut client = start_server(Vec::new());
    client
        .initialize(json!({
            "rootUri": "file:///tmp/x",
            "initializationOptions": {"clangdFileStatus": true},
        }))
        .await;

    client
        .send(json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didOpen",
            "params": {"textDocument": {"uri": "file:///tmp/x/a.cpp", "text": "int a;"}},
        }))
        .await;

    let notification = client.recv().await;
    assert_eq!(notification["method"], json!("textDocument/clangd.fileStatus"));
    assert_eq!(
        notification["params"],
        json!({"uri": "file:///tmp/x/a.cpp", "state": "Idle"})
    );
}
