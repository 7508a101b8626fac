//! SwiftLens MCP Server - Entry Point
//!
//! Sets up logging, resolves configuration, wires the analysis pipeline to
//! the telemetry sink, and serves MCP over stdio.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use serde_json::json;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use swiftlens::analysis::{BatchExecutor, FileAnalyzer};
use swiftlens::compiler::SwiftCompiler;
use swiftlens::config::Config;
use swiftlens::index::IndexBuilder;
use swiftlens::lsp::ServerSupervisor;
use swiftlens::mcp::SwiftLens;
use swiftlens::telemetry::{TelemetrySink, TelemetryStore};

/// MCP server for semantic analysis of Swift code via SourceKit-LSP.
#[derive(Parser, Debug)]
#[command(name = "swiftlens")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Language server executable to use instead of the resolved
    /// sourcekit-lsp.
    #[arg(long)]
    language_server: Option<PathBuf>,

    /// Telemetry database path.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Port for the dashboard collaborator.
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn parse_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => anyhow::bail!("invalid log level: {}", other),
        }
    }

    /// Environment configuration with CLI flags layered on top.
    fn resolve_config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(server) = &self.language_server {
            config.lsp_server = Some(server.clone());
        }
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
        if let Some(port) = self.dashboard_port {
            config.dashboard_port = port;
        }
        config
    }
}

/// Initializes the tracing subscriber.
///
/// Logs go to stderr so stdout stays clean for MCP framing.
fn init_tracing(level: Level) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("swiftlens={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.parse_log_level()?)?;
    let config = Arc::new(args.resolve_config());

    info!(
        db_path = %config.db_path.display(),
        dashboard_port = config.dashboard_port,
        "starting swiftlens MCP server"
    );

    let store = Arc::new(
        TelemetryStore::open(&config.db_path, config.pool_size)
            .context("failed to open telemetry database")?,
    );
    let telemetry = TelemetrySink::start(store, &config);

    let supervisor = ServerSupervisor::new(Arc::clone(&config));
    let analyzer = FileAnalyzer::new(Arc::clone(&supervisor));
    let batch = BatchExecutor::new(analyzer.clone(), Arc::clone(&config));

    let server = SwiftLens::new(
        analyzer,
        batch,
        Arc::new(SwiftCompiler::default()),
        Arc::new(IndexBuilder::new()),
        Arc::clone(&telemetry),
        "mcp-stdio",
    );

    telemetry
        .start_session(
            server.session_id(),
            json!({
                "transport": "stdio",
                "version": env!("CARGO_PKG_VERSION"),
            }),
        )
        .await
        .context("failed to open telemetry session")?;
    let session_id = server.session_id().to_string();

    info!("serving MCP over stdio");
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;

    info!("shutting down");
    supervisor.shutdown_all().await;
    if let Err(e) = telemetry.end_session(&session_id).await {
        tracing::warn!(error = %e, "failed to close telemetry session");
    }
    telemetry.shutdown().await;

    Ok(())
}
