//! In-process mock language server.
//!
//! Speaks framed JSON-RPC over duplex pipes so client behavior (correlation,
//! timeouts, cancellation, lifecycle pairing) can be tested without a real
//! SourceKit-LSP on the machine. A responder closure decides, per request,
//! what to answer, after what delay, or whether to answer at all.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};

use swiftlens::lsp::transport::{FrameReader, FrameWriter};
use swiftlens::lsp::{LspClient, LspClientConfig};

/// What the mock does with one incoming request.
pub enum MockReply {
    /// Respond with this `result` payload.
    Result(Value),
    /// Respond with a JSON-RPC error.
    Error { code: i64, message: String },
    /// Never respond (used for timeout tests).
    Ignore,
    /// Drop the connection immediately.
    Close,
}

/// A reply plus the delay before it is sent.
pub struct MockResponse {
    pub reply: MockReply,
    pub delay: Duration,
}

impl MockResponse {
    pub fn result(value: Value) -> Self {
        Self {
            reply: MockReply::Result(value),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(value: Value, delay: Duration) -> Self {
        Self {
            reply: MockReply::Result(value),
            delay,
        }
    }
}

pub type Responder = Arc<dyn Fn(&str, &Value) -> MockResponse + Send + Sync>;

/// Handle over everything the mock received.
#[derive(Clone)]
pub struct MockServerHandle {
    received: Arc<Mutex<Vec<Value>>>,
}

impl MockServerHandle {
    pub fn messages(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    /// Number of received messages with the given method.
    pub fn count(&self, method: &str) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.get("method").and_then(Value::as_str) == Some(method))
            .count()
    }

    /// Polls until `method` has been seen `count` times or the deadline
    /// passes.
    pub async fn wait_for(&self, method: &str, count: usize, deadline: Duration) -> bool {
        let started = tokio::time::Instant::now();
        while started.elapsed() < deadline {
            if self.count(method) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// Default replies for the handshake and document operations.
pub fn baseline_reply(method: &str) -> MockResponse {
    match method {
        "initialize" => MockResponse::result(json!({ "capabilities": {} })),
        "shutdown" => MockResponse::result(Value::Null),
        "textDocument/documentSymbol" => MockResponse::result(Value::Null),
        "textDocument/hover" => MockResponse::result(Value::Null),
        "textDocument/references" => MockResponse::result(json!([])),
        "textDocument/definition" => MockResponse::result(Value::Null),
        other => MockResponse::result(json!(
            { "unhandled": other }
        )),
    }
}

fn spawn_mock<R, W>(reader: R, writer: W, responder: Responder) -> MockServerHandle
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let received = Arc::new(Mutex::new(Vec::new()));
    let handle = MockServerHandle {
        received: Arc::clone(&received),
    };

    tokio::spawn(async move {
        let mut reader = FrameReader::new(reader);
        let writer = Arc::new(FrameWriter::new(writer));

        while let Ok(Some(message)) = reader.recv().await {
            received.lock().unwrap().push(message.clone());

            let (Some(method), Some(id)) = (
                message.get("method").and_then(Value::as_str),
                message.get("id").cloned(),
            ) else {
                continue; // notification
            };

            let response = responder(method, message.get("params").unwrap_or(&Value::Null));
            match response.reply {
                MockReply::Close => break,
                MockReply::Ignore => {}
                MockReply::Result(result) => {
                    let writer = Arc::clone(&writer);
                    tokio::spawn(async move {
                        tokio::time::sleep(response.delay).await;
                        let _ = writer
                            .send(&json!({ "jsonrpc": "2.0", "id": id, "result": result }))
                            .await;
                    });
                }
                MockReply::Error { code, message } => {
                    let writer = Arc::clone(&writer);
                    tokio::spawn(async move {
                        tokio::time::sleep(response.delay).await;
                        let _ = writer
                            .send(&json!({
                                "jsonrpc": "2.0",
                                "id": id,
                                "error": { "code": code, "message": message },
                            }))
                            .await;
                    });
                }
            }
        }
    });

    handle
}

/// Client config with short deadlines suited to mock tests.
pub fn test_client_config(workspace_root: &std::path::Path) -> LspClientConfig {
    LspClientConfig {
        workspace_root: workspace_root.to_path_buf(),
        init_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_millis(500),
        quick_timeout: Duration::from_millis(300),
        heavy_timeout: Duration::from_millis(800),
        ..LspClientConfig::default()
    }
}

/// Connects an initialized client to a mock server driven by `responder`.
pub async fn connect(
    workspace_root: &std::path::Path,
    responder: Responder,
) -> (LspClient, MockServerHandle) {
    let (client_io, server_io) = tokio::io::duplex(1024 * 1024);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (server_read, server_write) = tokio::io::split(server_io);

    let handle = spawn_mock(server_read, server_write, responder);
    let client = LspClient::from_parts(
        Box::new(client_read),
        Box::new(client_write),
        None,
        test_client_config(workspace_root),
    );
    client.initialize().await.expect("handshake should succeed");
    (client, handle)
}

/// Connects with the baseline responder.
pub async fn connect_baseline(
    workspace_root: &std::path::Path,
) -> (LspClient, MockServerHandle) {
    connect(workspace_root, Arc::new(|method, _| baseline_reply(method))).await
}
