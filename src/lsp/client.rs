//! LSP client implementation.
//!
//! Spawns a language-server subprocess and speaks JSON-RPC over its stdio
//! through the framed transport. A single reader task owns the receive side
//! and dispatches responses by id to awaiting callers; any task may send.
//!
//! Session life cycle: `New -> Initializing -> Ready -> Draining ->
//! Terminated`. Only `Ready` accepts document operations. A fatal transport
//! error terminates the session and fails every pending request with
//! `session-lost`; repeated request timeouts flag the session so the
//! supervisor replaces it on the next acquire.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lsp_types::notification::Notification;
use lsp_types::request::Request;
use lsp_types::{
    CancelParams, ClientCapabilities, ClientInfo, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DocumentSymbolClientCapabilities, DocumentSymbolParams,
    DocumentSymbolResponse, DynamicRegistrationClientCapabilities, GotoCapability,
    GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverClientCapabilities, HoverParams,
    InitializeParams, InitializeResult, InitializedParams, Location, MarkupKind, NumberOrString,
    PartialResultParams, Position, ReferenceContext, ReferenceParams, ServerCapabilities,
    TextDocumentClientCapabilities, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, TextDocumentSyncClientCapabilities, Url,
    WorkDoneProgressParams, WorkspaceFolder,
};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{Mutex, oneshot};

use crate::error::{AnalysisError, Result};

use super::transport::{FrameReader, FrameWriter};

type BoxedReader = FrameReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = FrameWriter<Box<dyn AsyncWrite + Send + Unpin>>;
type PendingMap = Arc<StdMutex<HashMap<i64, oneshot::Sender<Result<Value>>>>>;

/// Grace period for draining in-flight requests and for the subprocess to
/// exit after `exit` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Session life-cycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, handshake not started.
    New,
    /// `initialize` in flight.
    Initializing,
    /// Accepting document operations.
    Ready,
    /// Rejecting new requests, waiting for in-flight ones.
    Draining,
    /// Transport closed or subprocess gone.
    Terminated,
}

/// Configuration for building an LSP client.
#[derive(Debug, Clone)]
pub struct LspClientConfig {
    /// Command to start the language server.
    pub server_command: PathBuf,
    /// Arguments to pass to the language server.
    pub server_args: Vec<String>,
    /// Root directory of the workspace; also the subprocess cwd.
    pub workspace_root: PathBuf,
    /// Timeout for the initialize handshake.
    pub init_timeout: Duration,
    /// Timeout for ordinary requests.
    pub request_timeout: Duration,
    /// Timeout for quick requests (hover).
    pub quick_timeout: Duration,
    /// Timeout for heavy requests (document symbols, references).
    pub heavy_timeout: Duration,
    /// Consecutive timeouts before the session is flagged for restart.
    pub max_consecutive_timeouts: u32,
}

impl Default for LspClientConfig {
    fn default() -> Self {
        Self {
            server_command: PathBuf::from("sourcekit-lsp"),
            server_args: Vec::new(),
            workspace_root: PathBuf::from("."),
            init_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            quick_timeout: Duration::from_secs(15),
            heavy_timeout: Duration::from_secs(120),
            max_consecutive_timeouts: 3,
        }
    }
}

/// Builder for constructing an LSP client.
#[derive(Debug, Default)]
pub struct LspClientBuilder {
    config: LspClientConfig,
}

impl LspClientBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server command.
    #[must_use]
    pub fn server_command(mut self, command: impl Into<PathBuf>) -> Self {
        self.config.server_command = command.into();
        self
    }

    /// Sets the server arguments.
    #[must_use]
    pub fn server_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.server_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the workspace root.
    #[must_use]
    pub fn workspace_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = path.into();
        self
    }

    /// Sets the initialization timeout.
    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Sets the default request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the quick-request timeout (hover).
    #[must_use]
    pub fn quick_timeout(mut self, timeout: Duration) -> Self {
        self.config.quick_timeout = timeout;
        self
    }

    /// Sets the heavy-request timeout (document symbols, references).
    #[must_use]
    pub fn heavy_timeout(mut self, timeout: Duration) -> Self {
        self.config.heavy_timeout = timeout;
        self
    }

    /// Spawns the language-server subprocess and performs the LSP handshake.
    pub async fn build(self) -> Result<LspClient> {
        let workspace_root = self.config.workspace_root.canonicalize().map_err(|e| {
            AnalysisError::Validation(format!(
                "cannot resolve workspace root {}: {e}",
                self.config.workspace_root.display()
            ))
        })?;
        let config = LspClientConfig {
            workspace_root,
            ..self.config
        };

        let mut child = tokio::process::Command::new(&config.server_command)
            .args(&config.server_args)
            .current_dir(&config.workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AnalysisError::Environment(format!(
                    "failed to spawn '{}': {e}",
                    config.server_command.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AnalysisError::Internal("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AnalysisError::Internal("failed to capture stdout".to_string()))?;

        let client = LspClient::from_parts(
            Box::new(stdout) as Box<dyn AsyncRead + Send + Unpin>,
            Box::new(stdin) as Box<dyn AsyncWrite + Send + Unpin>,
            Some(child),
            config,
        );
        client.initialize().await?;
        Ok(client)
    }
}

/// LSP client bound to one language-server subprocess.
pub struct LspClient {
    config: LspClientConfig,
    writer: Arc<BoxedWriter>,
    pending: PendingMap,
    next_id: AtomicI64,
    state: Arc<StdMutex<SessionState>>,
    consecutive_timeouts: AtomicU32,
    capabilities: StdMutex<Option<ServerCapabilities>>,
    open_documents: Mutex<HashSet<Url>>,
    child: Option<Mutex<Child>>,
    _reader_task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for LspClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LspClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish_non_exhaustive()
    }
}

impl LspClient {
    /// Creates a new builder for constructing an LSP client.
    pub fn builder() -> LspClientBuilder {
        LspClientBuilder::new()
    }

    /// Assembles a client over arbitrary byte streams.
    ///
    /// Used by `builder().build()` with the subprocess pipes, and by tests
    /// with in-memory duplex streams and a mock server on the other end.
    pub fn from_parts(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        child: Option<Child>,
        config: LspClientConfig,
    ) -> Self {
        let writer = Arc::new(FrameWriter::new(writer));
        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let state = Arc::new(StdMutex::new(SessionState::New));

        let reader_task = tokio::spawn(reader_loop(
            FrameReader::new(reader),
            Arc::clone(&pending),
            Arc::clone(&writer),
            Arc::clone(&state),
        ));

        Self {
            config,
            writer,
            pending,
            next_id: AtomicI64::new(1),
            state,
            consecutive_timeouts: AtomicU32::new(0),
            capabilities: StdMutex::new(None),
            open_documents: Mutex::new(HashSet::new()),
            child: child.map(Mutex::new),
            _reader_task: reader_task,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Whether the supervisor should replace this session.
    pub fn needs_restart(&self) -> bool {
        self.state() == SessionState::Terminated
            || self.consecutive_timeouts.load(Ordering::Relaxed)
                >= self.config.max_consecutive_timeouts
    }

    /// Server capabilities from the initialize handshake.
    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        self.capabilities.lock().unwrap().clone()
    }

    /// Performs the `initialize`/`initialized` handshake. Must be called
    /// exactly once, before any other request.
    pub async fn initialize(&self) -> Result<ServerCapabilities> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != SessionState::New {
                return Err(AnalysisError::Internal(format!(
                    "initialize called in state {:?}",
                    *state
                )));
            }
            *state = SessionState::Initializing;
        }

        let root_uri = Url::from_file_path(&self.config.workspace_root).map_err(|()| {
            AnalysisError::Validation(format!(
                "invalid workspace root path: {}",
                self.config.workspace_root.display()
            ))
        })?;

        #[allow(deprecated)] // root_uri is deprecated but sourcekit-lsp still reads it
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri.clone()),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: self
                    .config
                    .workspace_root
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("workspace")
                    .to_string(),
            }]),
            capabilities: client_capabilities(),
            client_info: Some(ClientInfo {
                name: "swiftlens".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..InitializeParams::default()
        };

        let result: InitializeResult = self
            .request::<lsp_types::request::Initialize>(params, self.config.init_timeout)
            .await
            .inspect_err(|_| self.terminate_state())?;

        self.notify::<lsp_types::notification::Initialized>(InitializedParams {})
            .await?;

        *self.capabilities.lock().unwrap() = Some(result.capabilities.clone());
        *self.state.lock().unwrap() = SessionState::Ready;
        Ok(result.capabilities)
    }

    /// Opens `path` if it is not already open. Returns the document URI and
    /// whether this call actually opened it (the caller then owes the
    /// matching close).
    pub async fn ensure_open(&self, path: &Path) -> Result<(Url, bool)> {
        let uri = super::types::path_to_uri(path)?;

        let mut open = self.open_documents.lock().await;
        if open.contains(&uri) {
            return Ok((uri, false));
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AnalysisError::FileNotFound(format!("{}: {e}", path.display())))?;

        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id_for(path).to_string(),
                version: 0,
                text,
            },
        };
        self.notify::<lsp_types::notification::DidOpenTextDocument>(params)
            .await?;
        open.insert(uri.clone());
        Ok((uri, true))
    }

    /// Closes an open document.
    pub async fn close_document(&self, uri: &Url) -> Result<()> {
        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        };
        self.notify::<lsp_types::notification::DidCloseTextDocument>(params)
            .await?;
        self.open_documents.lock().await.remove(uri);
        Ok(())
    }

    /// Best-effort close used on the tail of every analysis operation: only
    /// closes when `newly_opened` is set, and never turns a close failure
    /// into the operation's result.
    pub async fn finish_document(&self, uri: &Url, newly_opened: bool) {
        if newly_opened {
            if let Err(e) = self.close_document(uri).await {
                tracing::debug!(uri = %uri, error = %e, "failed to close document");
            }
        }
    }

    /// `textDocument/documentSymbol`.
    pub async fn document_symbols(&self, uri: &Url) -> Result<DocumentSymbolResponse> {
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let response: Option<DocumentSymbolResponse> = self
            .request::<lsp_types::request::DocumentSymbolRequest>(params, self.config.heavy_timeout)
            .await?;
        Ok(response.unwrap_or(DocumentSymbolResponse::Nested(Vec::new())))
    }

    /// `textDocument/hover`.
    pub async fn hover(&self, uri: &Url, position: Position) -> Result<Option<Hover>> {
        let params = HoverParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
                position,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        self.request::<lsp_types::request::HoverRequest>(params, self.config.quick_timeout)
            .await
    }

    /// `textDocument/references`.
    pub async fn references(
        &self,
        uri: &Url,
        position: Position,
        include_declaration: bool,
    ) -> Result<Vec<Location>> {
        let params = ReferenceParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
                position,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: ReferenceContext {
                include_declaration,
            },
        };
        let response: Option<Vec<Location>> = self
            .request::<lsp_types::request::References>(params, self.config.heavy_timeout)
            .await?;
        Ok(response.unwrap_or_default())
    }

    /// `textDocument/definition`.
    pub async fn definition(&self, uri: &Url, position: Position) -> Result<GotoDefinitionResponse> {
        let params = GotoDefinitionParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
                position,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let response: Option<GotoDefinitionResponse> = self
            .request::<lsp_types::request::GotoDefinition>(params, self.config.request_timeout)
            .await?;
        Ok(response.unwrap_or(GotoDefinitionResponse::Array(Vec::new())))
    }

    /// Ordered termination: drain in-flight requests with a bounded grace,
    /// close any documents still open, `shutdown`, `exit`, then kill the
    /// subprocess if it does not leave on its own.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if matches!(*state, SessionState::Terminated | SessionState::Draining) {
                return;
            }
            *state = SessionState::Draining;
        }

        // Bounded drain of in-flight requests.
        let drain_deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while !self.pending.lock().unwrap().is_empty()
            && tokio::time::Instant::now() < drain_deadline
        {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let open: Vec<Url> = self.open_documents.lock().await.iter().cloned().collect();
        for uri in open {
            let _ = self.close_document(&uri).await;
        }

        if let Err(e) = self
            .request::<lsp_types::request::Shutdown>((), Duration::from_secs(5))
            .await
        {
            tracing::debug!(error = %e, "shutdown request failed");
        }
        if let Err(e) = self.notify::<lsp_types::notification::Exit>(()).await {
            tracing::debug!(error = %e, "exit notification failed");
        }

        if let Some(child) = &self.child {
            let mut child = child.lock().await;
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "language server exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "error waiting for language server"),
                Err(_) => {
                    tracing::warn!("language server did not exit in time, killing");
                    let _ = child.kill().await;
                }
            }
        }

        self.terminate_state();
    }

    /// Number of entries currently awaiting a response. Test hook for the
    /// no-orphaned-requests invariant.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Number of documents currently announced as open.
    pub async fn open_document_count(&self) -> usize {
        self.open_documents.lock().await.len()
    }

    async fn request<R>(&self, params: R::Params, deadline: Duration) -> Result<R::Result>
    where
        R: Request,
        R::Params: Serialize,
    {
        self.check_sendable(R::METHOD)?;
        let params = serde_json::to_value(params)
            .map_err(|e| AnalysisError::Internal(format!("unserializable params: {e}")))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        // Removes the pending entry and tells the server to stop if this
        // future is dropped before a response arrives.
        let mut guard = PendingGuard {
            client: self,
            id,
            armed: true,
        };

        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": R::METHOD,
            "params": params,
        });

        if let Err(e) = self.writer.send(&message).await {
            guard.armed = false;
            self.pending.lock().unwrap().remove(&id);
            self.terminate_state();
            return Err(e.into());
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(value))) => {
                guard.armed = false;
                self.consecutive_timeouts.store(0, Ordering::Relaxed);
                serde_json::from_value(value)
                    .map_err(|e| AnalysisError::Internal(format!("malformed {} response: {e}", R::METHOD)))
            }
            Ok(Ok(Err(err))) => {
                guard.armed = false;
                self.consecutive_timeouts.store(0, Ordering::Relaxed);
                Err(err)
            }
            Ok(Err(_closed)) => {
                guard.armed = false;
                Err(AnalysisError::SessionLost(
                    "language server closed the connection".to_string(),
                ))
            }
            Err(_elapsed) => {
                guard.armed = false;
                self.pending.lock().unwrap().remove(&id);
                self.cancel_request(id).await;
                let timeouts = self.consecutive_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                if timeouts >= self.config.max_consecutive_timeouts {
                    tracing::warn!(
                        timeouts,
                        "consecutive request timeouts, session flagged for restart"
                    );
                }
                Err(AnalysisError::Timeout(deadline))
            }
        }
    }

    async fn notify<N>(&self, params: N::Params) -> Result<()>
    where
        N: Notification,
        N::Params: Serialize,
    {
        self.check_sendable(N::METHOD)?;
        let message = json!({
            "jsonrpc": "2.0",
            "method": N::METHOD,
            "params": serde_json::to_value(params)
                .map_err(|e| AnalysisError::Internal(format!("unserializable params: {e}")))?,
        });
        self.writer.send(&message).await.map_err(|e| {
            self.terminate_state();
            e.into()
        })
    }

    /// Best-effort `$/cancelRequest` for an id whose pending entry has
    /// already been removed.
    async fn cancel_request(&self, id: i64) {
        let params = CancelParams {
            id: NumberOrString::Number(id as i32),
        };
        let message = json!({
            "jsonrpc": "2.0",
            "method": lsp_types::notification::Cancel::METHOD,
            "params": serde_json::to_value(params).unwrap_or(Value::Null),
        });
        if let Err(e) = self.writer.send(&message).await {
            tracing::debug!(error = %e, "failed to send cancellation");
        }
    }

    fn check_sendable(&self, method: &str) -> Result<()> {
        let state = self.state();
        let allowed = match state {
            SessionState::Ready => true,
            SessionState::Initializing => {
                matches!(method, "initialize" | "initialized")
            }
            SessionState::Draining => {
                matches!(method, "shutdown" | "exit" | "textDocument/didClose")
            }
            SessionState::New => false,
            SessionState::Terminated => false,
        };
        if allowed {
            Ok(())
        } else if state == SessionState::Terminated {
            Err(AnalysisError::SessionLost(
                "language server session is terminated".to_string(),
            ))
        } else {
            Err(AnalysisError::Internal(format!(
                "cannot send {method} in state {state:?}"
            )))
        }
    }

    fn terminate_state(&self) {
        *self.state.lock().unwrap() = SessionState::Terminated;
    }
}

/// Removes the pending entry and sends `$/cancelRequest` when a request
/// future is dropped before completion, so late responses are discarded and
/// nothing leaks.
struct PendingGuard<'a> {
    client: &'a LspClient,
    id: i64,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.client.pending.lock().unwrap().remove(&self.id).is_none() {
            return;
        }
        let writer = Arc::clone(&self.client.writer);
        let id = self.id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let message = json!({
                    "jsonrpc": "2.0",
                    "method": lsp_types::notification::Cancel::METHOD,
                    "params": { "id": id },
                });
                let _ = writer.send(&message).await;
            });
        }
    }
}

/// Reader task: dispatches responses by id, answers unsupported
/// server-to-client requests, and fails every pending caller when the
/// stream dies.
async fn reader_loop(
    mut reader: BoxedReader,
    pending: PendingMap,
    writer: Arc<BoxedWriter>,
    state: Arc<StdMutex<SessionState>>,
) {
    loop {
        match reader.recv().await {
            Ok(Some(message)) => dispatch_message(message, &pending, &writer).await,
            Ok(None) => {
                tracing::debug!("language server closed its output stream");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "fatal transport error");
                break;
            }
        }
    }

    *state.lock().unwrap() = SessionState::Terminated;
    // Dropping the senders wakes every waiting caller with session-lost.
    let drained = {
        let mut map = pending.lock().unwrap();
        let count = map.len();
        map.clear();
        count
    };
    if drained > 0 {
        tracing::warn!(pending = drained, "reader loop exited with pending requests");
    }
}

async fn dispatch_message(message: Value, pending: &PendingMap, writer: &Arc<BoxedWriter>) {
    let has_id = message.get("id").is_some();
    let has_method = message.get("method").is_some();

    if has_method {
        if has_id {
            // Server-to-client request; none are supported.
            let reply = json!({
                "jsonrpc": "2.0",
                "id": message["id"],
                "error": { "code": -32601, "message": "method not supported" },
            });
            if let Err(e) = writer.send(&reply).await {
                tracing::debug!(error = %e, "failed to reject server request");
            }
        } else {
            tracing::trace!(
                method = message["method"].as_str().unwrap_or("?"),
                "server notification"
            );
        }
        return;
    }

    let Some(id) = message.get("id").and_then(Value::as_i64) else {
        tracing::debug!("dropping message with no usable id");
        return;
    };

    let sender = pending.lock().unwrap().remove(&id);
    let Some(sender) = sender else {
        // Cancelled or timed out locally; the late response is dropped.
        tracing::debug!(id, "dropping response for unknown request id");
        return;
    };

    let outcome = if let Some(error) = message.get("error") {
        Err(AnalysisError::Lsp {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown server error")
                .to_string(),
        })
    } else {
        Ok(message.get("result").cloned().unwrap_or(Value::Null))
    };
    let _ = sender.send(outcome);
}

fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                dynamic_registration: Some(false),
                will_save: Some(false),
                will_save_wait_until: Some(false),
                did_save: Some(false),
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(false),
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(false),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                dynamic_registration: Some(false),
                hierarchical_document_symbol_support: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn language_id_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("swift") => "swift",
        Some("m") => "objective-c",
        Some("h") => "objective-c",
        _ => "plaintext",
    }
}
