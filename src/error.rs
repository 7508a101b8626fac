//! Error types for the swiftlens MCP server.
//!
//! The analysis pipeline reports failures through a single stable taxonomy;
//! every variant maps to a wire-level kind string that tool callers can
//! match on. Transport and telemetry keep their own subsystem enums and are
//! wrapped into [`AnalysisError`] at the component boundary where they occur.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by the framed JSON-RPC transport.
///
/// Any variant other than a clean end-of-stream is fatal for the transport:
/// once a malformed frame is observed the byte stream cannot be resynchronized.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The header block could not be parsed.
    #[error("malformed frame header: {0}")]
    MalformedHeader(String),

    /// The advertised body length exceeds the hard cap.
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(u64),

    /// The stream ended in the middle of a frame.
    #[error("stream closed mid-frame")]
    TruncatedFrame,

    /// The body was not valid UTF-8 JSON.
    #[error("invalid frame body: {0}")]
    InvalidBody(String),

    /// IO failure on the underlying stream.
    #[error("transport IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the telemetry store and sink.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Database open, schema, or query failure.
    #[error("telemetry database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The background writer has shut down.
    #[error("telemetry sink is shut down")]
    ShutDown,

    /// A pooled connection task was cancelled or panicked.
    #[error("telemetry task failed: {0}")]
    TaskFailed(String),
}

/// The stable failure taxonomy for every analysis operation.
///
/// `kind()` yields the wire string carried in the error envelope. Only
/// [`AnalysisError::SessionLost`] is retriable; it signals the supervisor to
/// drop the session so the next acquire spawns a fresh language server.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Input failed a precondition; non-retryable.
    #[error("{0}")]
    Validation(String),

    /// The path does not resolve to an existing file.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The extension check failed.
    #[error("file must be a Swift file (.swift extension): {0}")]
    NotSwiftFile(String),

    /// Project discovery yielded no project where one is required.
    #[error("no Swift project found for: {0}")]
    ProjectNotFound(String),

    /// A required external tool is unavailable.
    #[error("{0}")]
    Environment(String),

    /// A deadline elapsed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The language-server session died mid-operation.
    #[error("language server session lost: {0}")]
    SessionLost(String),

    /// The language server returned a JSON-RPC error.
    #[error("language server error: {message} (code {code})")]
    Lsp {
        /// JSON-RPC error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
    },

    /// A compiler or index build failed; attached output is sanitized.
    #[error("{0}")]
    Build(String),

    /// Another index build holds the lock for this project.
    #[error("another build is already in progress for this project")]
    BuildInProgress,

    /// An invariant violation inside the core.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Stable kind string for the wire-level error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::FileNotFound(_) => "file-not-found",
            Self::NotSwiftFile(_) => "not-swift-file",
            Self::ProjectNotFound(_) => "project-not-found",
            Self::Environment(_) => "environment",
            Self::Timeout(_) => "timeout",
            Self::SessionLost(_) => "session-lost",
            Self::Lsp { .. } => "lsp-error",
            Self::Build(_) => "build-error",
            Self::BuildInProgress => "build-in-progress",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether retrying on a fresh session can succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }
}

impl From<TransportError> for AnalysisError {
    fn from(err: TransportError) -> Self {
        Self::SessionLost(err.to_string())
    }
}

impl From<TelemetryError> for AnalysisError {
    fn from(err: TelemetryError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Structured error envelope returned across the tool boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// Always `false`.
    pub ok: bool,
    /// Stable kind string from the taxonomy.
    pub kind: String,
    /// Human-readable message; sensitive values already sanitized upstream.
    pub message: String,
    /// Optional structured payload (e.g. the JSON-RPC error code).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&AnalysisError> for ErrorEnvelope {
    fn from(err: &AnalysisError) -> Self {
        let details = match err {
            AnalysisError::Lsp { code, .. } => Some(serde_json::json!({ "code": code })),
            _ => None,
        };
        Self {
            ok: false,
            kind: err.kind().to_string(),
            message: err.to_string(),
            details,
        }
    }
}

/// A specialized Result type for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
