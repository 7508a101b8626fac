//! MCP tool parameter definitions.
//!
//! Each struct is the JSON-schema'd input of one tool exposed by the server.
//! Positions follow the public convention: one-based `line`, zero-based
//! `character`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input for tools that operate on a single Swift file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct FilePathParams {
    /// Path to the Swift source file (absolute, or relative to the server cwd).
    #[schemars(description = "Path to the Swift source file")]
    pub file_path: String,
}

/// Input for the multi-file analysis tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct MultiFileParams {
    /// Swift files to analyze; outcomes are keyed by these paths.
    #[schemars(description = "Paths of the Swift files to analyze")]
    pub file_paths: Vec<String>,
}

/// Input for the hover tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct HoverParams {
    /// Path to the Swift source file.
    #[schemars(description = "Path to the Swift source file")]
    pub file_path: String,
    /// One-based line number.
    #[schemars(description = "Line number (1-based)")]
    pub line: u32,
    /// Zero-based character offset in UTF-16 code units.
    #[schemars(description = "Character offset within the line (0-based)")]
    pub character: u32,
}

/// Input for the symbol-references tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct SymbolReferenceParams {
    /// Path to the Swift source file declaring the symbol.
    #[schemars(description = "Path to the Swift source file declaring the symbol")]
    pub file_path: String,
    /// Symbol name to look up (first declaration in source order wins).
    #[schemars(description = "Name of the symbol to find references for")]
    pub symbol_name: String,
    /// Whether the declaration itself is included in the results.
    #[serde(default = "default_true")]
    #[schemars(description = "Include the declaration in the results (default: true)")]
    pub include_declaration: bool,
}

/// Input for the symbol-definition tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct SymbolDefinitionParams {
    /// Path to the Swift source file referencing the symbol.
    #[schemars(description = "Path to the Swift source file referencing the symbol")]
    pub file_path: String,
    /// Symbol name to resolve.
    #[schemars(description = "Name of the symbol to resolve the definition of")]
    pub symbol_name: String,
}

/// Input for the index-build tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct BuildIndexParams {
    /// Project directory; the server cwd when omitted.
    #[schemars(description = "Path to the Swift project directory (default: server cwd)")]
    pub project_path: Option<String>,
    /// Build deadline in seconds (default 60, capped at 300).
    #[schemars(description = "Maximum build time in seconds (default 60, max 300)")]
    pub timeout_seconds: Option<u64>,
    /// Xcode scheme to build; auto-detected when omitted.
    #[schemars(description = "Xcode scheme to build (auto-detected if omitted)")]
    pub scheme: Option<String>,
}

fn default_true() -> bool {
    true
}
