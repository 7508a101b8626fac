//! SwiftLens MCP Server
//!
//! An MCP (Model Context Protocol) server that gives LLM applications
//! semantic analysis of Swift source code by supervising SourceKit-LSP
//! subprocesses and compiler invocations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     stdio      ┌─────────────────┐
//! │   LLM Client    │◄──────────────►│   MCP Server    │
//! │  (Claude Code)  │    (MCP)       │   (swiftlens)   │
//! └─────────────────┘                └────────┬────────┘
//!                                             │
//!                      ┌──────────────┬───────┴──────┬─────────────┐
//!                      │              │              │             │
//!               ┌──────▼──────┐ ┌─────▼─────┐ ┌──────▼─────┐ ┌─────▼─────┐
//!               │  Analyzer / │ │ Compiler  │ │   Index    │ │ Telemetry │
//!               │ Supervisor  │ │  Driver   │ │  Builder   │ │   Sink    │
//!               └──────┬──────┘ └─────┬─────┘ └──────┬─────┘ └─────┬─────┘
//!                      │ JSON-RPC     │              │             │
//!               ┌──────▼────────┐  swiftc       xcodebuild /    SQLite +
//!               │ SourceKit-LSP │  -typecheck   swift build     observers
//!               │ (per project) │
//!               └───────────────┘
//! ```
//!
//! # Modules
//!
//! - [`error`] - Stable failure taxonomy and the wire error envelope
//! - [`config`] - Environment-driven configuration
//! - [`validation`] - Input canonicalization and precondition checks
//! - [`project`] - Swift project discovery
//! - [`lsp`] - Framed transport, LSP client, session supervisor
//! - [`analysis`] - Per-file operations, batches, result records
//! - [`compiler`] - `swiftc -typecheck` driver
//! - [`index`] - Project index builds and output sanitization
//! - [`telemetry`] - Durable invocation log with live fan-out
//! - [`mcp`] - Tool schemas and the MCP server

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod compiler;
pub mod config;
pub mod error;
pub mod index;
pub mod lsp;
pub mod mcp;
pub mod project;
pub mod telemetry;
pub mod validation;

pub use config::Config;
pub use error::{AnalysisError, ErrorEnvelope, Result};
