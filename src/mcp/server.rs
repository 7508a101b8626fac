//! MCP server: tool routing plus telemetry middleware.
//!
//! Every tool handler runs through [`SwiftLens::dispatch`], which writes the
//! telemetry start entry, awaits the operation, and always writes the
//! terminal entry with the duration and outcome. Successful operations
//! return their record serialized as JSON text; failures return the stable
//! error envelope with `is_error` set.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rmcp::handler::server::tool::ToolRouter;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::wrapper::Parameters,
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::analysis::{BatchExecutor, FileAnalyzer};
use crate::compiler::SwiftCompiler;
use crate::error::ErrorEnvelope;
use crate::index::IndexBuilder;
use crate::telemetry::{LogStatus, TelemetrySink};

use super::tools::{
    BuildIndexParams, FilePathParams, HoverParams, MultiFileParams, SymbolDefinitionParams,
    SymbolReferenceParams,
};

/// MCP server exposing Swift semantic analysis tools.
#[derive(Clone)]
pub struct SwiftLens {
    analyzer: FileAnalyzer,
    batch: BatchExecutor,
    compiler: Arc<SwiftCompiler>,
    index_builder: Arc<IndexBuilder>,
    telemetry: Arc<TelemetrySink>,
    client_id: String,
    session_id: String,
    tool_router: ToolRouter<SwiftLens>,
}

impl SwiftLens {
    /// Creates the server. `session_id` identifies this process lifetime in
    /// the telemetry log; open it with
    /// [`TelemetrySink::start_session`] before serving.
    pub fn new(
        analyzer: FileAnalyzer,
        batch: BatchExecutor,
        compiler: Arc<SwiftCompiler>,
        index_builder: Arc<IndexBuilder>,
        telemetry: Arc<TelemetrySink>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            analyzer,
            batch,
            compiler,
            index_builder,
            telemetry,
            client_id: client_id.into(),
            session_id: Uuid::new_v4().to_string(),
            tool_router: Self::tool_router(),
        }
    }

    /// Telemetry session id for this server instance.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Telemetry middleware: one start entry, the operation, one terminal
    /// entry on every path.
    async fn dispatch<T, F>(
        &self,
        tool: &str,
        params: Value,
        operation: F,
    ) -> Result<CallToolResult, McpError>
    where
        T: Serialize,
        F: Future<Output = crate::error::Result<T>>,
    {
        let log_id = self
            .telemetry
            .log_start(tool, params, &self.client_id, &self.session_id);
        let started = Instant::now();

        let outcome = operation.await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(record) => {
                let value = serde_json::to_value(&record).unwrap_or(Value::Null);
                self.telemetry
                    .log_end(&log_id, Some(value.clone()), elapsed_ms, LogStatus::Success, None);
                Ok(CallToolResult::success(vec![Content::text(pretty(&value))]))
            }
            Err(err) => {
                let envelope = serde_json::to_value(ErrorEnvelope::from(&err)).unwrap_or(Value::Null);
                self.telemetry.log_end(
                    &log_id,
                    Some(envelope.clone()),
                    elapsed_ms,
                    LogStatus::Error,
                    Some(err.to_string()),
                );
                Ok(CallToolResult::error(vec![Content::text(pretty(&envelope))]))
            }
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn params_value<T: Serialize>(params: &T) -> Value {
    serde_json::to_value(params).unwrap_or(Value::Null)
}

/// Tool implementations.
#[tool_router]
impl SwiftLens {
    /// Full symbol tree of one Swift file.
    #[tool(
        description = "Analyze a Swift file and return its full symbol tree (types, methods, properties) in source order."
    )]
    async fn swift_analyze_file(
        &self,
        Parameters(params): Parameters<FilePathParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_analyze_file", raw, async {
            self.analyzer
                .analyze_file_symbols(Path::new(&params.file_path))
                .await
        })
        .await
    }

    /// Batch analysis sharing one language-server session per project.
    #[tool(
        description = "Analyze multiple Swift files in parallel. Returns per-file symbol trees; one bad file never fails the batch."
    )]
    async fn swift_analyze_multiple_files(
        &self,
        Parameters(params): Parameters<MultiFileParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_analyze_multiple_files", raw, async {
            self.batch.analyze_many(&params.file_paths).await
        })
        .await
    }

    /// Top-level declarations only.
    #[tool(
        description = "List only the top-level declarations of a Swift file. Cheaper than a full analysis for large files."
    )]
    async fn swift_get_symbols_overview(
        &self,
        Parameters(params): Parameters<FilePathParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_get_symbols_overview", raw, async {
            self.analyzer
                .get_symbols_overview(Path::new(&params.file_path))
                .await
        })
        .await
    }

    /// Dotted declaration paths in depth-first source order.
    #[tool(
        description = "Return the fully qualified declaration paths of a Swift file (e.g. MyType.myMethod), in source order."
    )]
    async fn swift_get_declaration_context(
        &self,
        Parameters(params): Parameters<FilePathParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_get_declaration_context", raw, async {
            self.analyzer
                .get_declaration_context(Path::new(&params.file_path))
                .await
        })
        .await
    }

    /// Hover information at a position.
    #[tool(
        description = "Get type information and documentation for the symbol at a position (line is 1-based, character 0-based)."
    )]
    async fn swift_get_hover_info(
        &self,
        Parameters(params): Parameters<HoverParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_get_hover_info", raw, async {
            self.analyzer
                .get_hover_info(Path::new(&params.file_path), params.line, params.character)
                .await
        })
        .await
    }

    /// References to a named symbol.
    #[tool(
        description = "Find all references to a symbol declared in the given file. Cross-file results require a built index."
    )]
    async fn swift_find_symbol_references(
        &self,
        Parameters(params): Parameters<SymbolReferenceParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_find_symbol_references", raw, async {
            self.analyzer
                .find_symbol_references(
                    Path::new(&params.file_path),
                    &params.symbol_name,
                    params.include_declaration,
                )
                .await
        })
        .await
    }

    /// Definition sites of a named symbol.
    #[tool(description = "Resolve the definition location(s) of a symbol by name.")]
    async fn swift_get_symbol_definition(
        &self,
        Parameters(params): Parameters<SymbolDefinitionParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_get_symbol_definition", raw, async {
            self.analyzer
                .get_symbol_definition(Path::new(&params.file_path), &params.symbol_name)
                .await
        })
        .await
    }

    /// Token-budgeted symbol outline for model context windows.
    #[tool(
        description = "Format a Swift file's symbol tree as an indented outline with a token estimate, sized for model context windows."
    )]
    async fn swift_format_context(
        &self,
        Parameters(params): Parameters<FilePathParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_format_context", raw, async {
            self.analyzer.format_context(Path::new(&params.file_path)).await
        })
        .await
    }

    /// Symbol-kind counts for a file.
    #[tool(
        description = "Summarize a Swift file as symbol-kind counts (classes, functions, properties, ...)."
    )]
    async fn swift_summarize_file(
        &self,
        Parameters(params): Parameters<FilePathParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_summarize_file", raw, async {
            self.analyzer.summarize_file(Path::new(&params.file_path)).await
        })
        .await
    }

    /// Typecheck diagnostics for a file.
    #[tool(
        description = "Typecheck a Swift file with the compiler and return its diagnostics. Uses package context when available."
    )]
    async fn swift_validate_file(
        &self,
        Parameters(params): Parameters<FilePathParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_validate_file", raw, async {
            self.compiler
                .typecheck_with_project_context(Path::new(&params.file_path))
                .await
        })
        .await
    }

    /// Swift toolchain availability.
    #[tool(description = "Check whether the Swift toolchain is available (result is cached for five minutes).")]
    async fn swift_check_environment(&self) -> Result<CallToolResult, McpError> {
        self.dispatch("swift_check_environment", Value::Null, async {
            Ok(self.compiler.check_environment().await)
        })
        .await
    }

    /// Build or refresh the project index store.
    #[tool(
        description = "Build the project's symbol index so cross-file references and definitions work. Supports Swift packages and Xcode projects."
    )]
    async fn swift_build_index(
        &self,
        Parameters(params): Parameters<BuildIndexParams>,
    ) -> Result<CallToolResult, McpError> {
        let raw = params_value(&params);
        self.dispatch("swift_build_index", raw, async {
            let project_path = match &params.project_path {
                Some(path) => std::path::PathBuf::from(path),
                None => std::env::current_dir().map_err(|e| {
                    crate::error::AnalysisError::Internal(format!(
                        "cannot read current directory: {e}"
                    ))
                })?,
            };
            self.index_builder
                .build_index(
                    &project_path,
                    params.timeout_seconds.map(Duration::from_secs),
                    params.scheme.as_deref(),
                )
                .await
        })
        .await
    }
}

#[tool_handler]
impl ServerHandler for SwiftLens {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "swiftlens".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Semantic analysis of Swift code via SourceKit-LSP: symbol trees, hover, \
                 references, definitions, declaration contexts, multi-file batches, typecheck \
                 diagnostics, and project index builds. Cross-file queries need an index; run \
                 swift_build_index once per project if references come back empty."
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lsp::supervisor::ServerSupervisor;
    use crate::telemetry::TelemetryStore;
    use rmcp::model::RawContent;

    async fn test_server() -> (tempfile::TempDir, SwiftLens) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(Config {
            lsp_server: Some(std::path::PathBuf::from("/nonexistent/sourcekit-lsp")),
            db_path: dir.path().join("logs.db"),
            ..Config::default()
        });
        let store = Arc::new(TelemetryStore::open(&config.db_path, 2).unwrap());
        let telemetry = TelemetrySink::start(store, &config);
        let supervisor = ServerSupervisor::new(Arc::clone(&config));
        let analyzer = FileAnalyzer::new(supervisor);
        let batch = BatchExecutor::new(analyzer.clone(), Arc::clone(&config));
        let server = SwiftLens::new(
            analyzer,
            batch,
            Arc::new(SwiftCompiler::default()),
            Arc::new(IndexBuilder::new()),
            telemetry,
            "test-client",
        );
        (dir, server)
    }

    fn content_text(result: &CallToolResult) -> String {
        match &result.content[0].raw {
            RawContent::Text(text) => text.text.clone(),
            _ => panic!("expected text content"),
        }
    }

    #[tokio::test]
    async fn validation_failures_return_the_error_envelope() {
        let (_dir, server) = test_server().await;
        let result = server
            .swift_analyze_file(Parameters(FilePathParams {
                file_path: "/not/swift.txt".to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let envelope: Value = serde_json::from_str(&content_text(&result)).unwrap();
        assert_eq!(envelope["ok"], false);
        assert_eq!(envelope["kind"], "not-swift-file");
    }

    #[tokio::test]
    async fn batch_tool_reports_per_file_outcomes() {
        let (_dir, server) = test_server().await;
        let result = server
            .swift_analyze_multiple_files(Parameters(MultiFileParams {
                file_paths: vec!["/missing/A.swift".to_string(), "/missing/B.swift".to_string()],
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        let analysis: Value = serde_json::from_str(&content_text(&result)).unwrap();
        assert_eq!(analysis["total_files"], 2);
        assert_eq!(analysis["files"]["/missing/A.swift"]["kind"], "file-not-found");
    }

    #[tokio::test]
    async fn hover_rejects_zero_line_before_any_session_work() {
        let (dir, server) = test_server().await;
        let file = dir.path().join("A.swift");
        std::fs::write(&file, "struct A {}\n").unwrap();

        let result = server
            .swift_get_hover_info(Parameters(HoverParams {
                file_path: file.display().to_string(),
                line: 0,
                character: 0,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let envelope: Value = serde_json::from_str(&content_text(&result)).unwrap();
        assert_eq!(envelope["kind"], "validation");
    }

    #[tokio::test]
    async fn format_context_reports_the_stable_kind_on_bad_input() {
        let (_dir, server) = test_server().await;
        let result = server
            .swift_format_context(Parameters(FilePathParams {
                file_path: "/not/swift.py".to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let envelope: Value = serde_json::from_str(&content_text(&result)).unwrap();
        assert_eq!(envelope["kind"], "not-swift-file");
    }

    #[tokio::test]
    async fn build_index_on_bare_directory_is_a_validation_error() {
        let (dir, server) = test_server().await;
        let result = server
            .swift_build_index(Parameters(BuildIndexParams {
                project_path: Some(dir.path().display().to_string()),
                timeout_seconds: None,
                scheme: None,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let envelope: Value = serde_json::from_str(&content_text(&result)).unwrap();
        assert_eq!(envelope["kind"], "validation");
    }
}
