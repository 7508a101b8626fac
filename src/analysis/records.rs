//! Structured records returned by analysis operations.
//!
//! These are the payloads that cross the tool boundary. Positions follow the
//! public convention: one-based `line`, zero-based `character` (UTF-16).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ErrorEnvelope;

/// One node of the document symbol tree. Children are in source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SymbolRecord {
    /// Symbol name as reported by the language server.
    pub name: String,
    /// Stable kind name (`struct`, `method`, `enum-member`, ...).
    pub kind: String,
    /// One-based line of the symbol's selection range.
    pub line: u32,
    /// Zero-based character of the symbol's selection range.
    pub character: u32,
    /// Nested declarations, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SymbolRecord>,
}

impl SymbolRecord {
    /// Number of nodes in this subtree, itself included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(SymbolRecord::subtree_len).sum::<usize>()
    }
}

/// A range in a source file, one-based lines.
#[derive(
    Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SourceRange {
    /// One-based start line.
    pub start_line: u32,
    /// Zero-based start character.
    pub start_character: u32,
    /// One-based end line.
    pub end_line: u32,
    /// Zero-based end character (exclusive).
    pub end_character: u32,
}

/// A resolved location in some file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Absolute path of the file.
    pub file_path: String,
    /// Range the location covers.
    pub range: SourceRange,
}

/// Hover payload for a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoverRecord {
    /// Rendered hover text.
    pub contents: String,
    /// Range the hover applies to, when the server reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<SourceRange>,
}

/// Full symbol analysis of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSymbols {
    /// Absolute path of the analyzed file.
    pub file_path: String,
    /// Symbol tree in source order.
    pub symbols: Vec<SymbolRecord>,
    /// Total number of symbols in the tree.
    pub symbol_count: usize,
}

/// Dotted declaration paths of a file, depth-first source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationContext {
    /// Absolute path of the analyzed file.
    pub file_path: String,
    /// Fully qualified declaration paths (`Outer.Inner.method`).
    pub declarations: Vec<String>,
    /// Number of declarations.
    pub declaration_count: usize,
}

/// Hover result for one position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoverInfo {
    /// Absolute path of the analyzed file.
    pub file_path: String,
    /// One-based line the query targeted.
    pub line: u32,
    /// Zero-based character the query targeted.
    pub character: u32,
    /// Hover content, absent when the server had nothing to say.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hover: Option<HoverRecord>,
}

/// References to a named symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolReferences {
    /// Absolute path of the file the symbol was resolved in.
    pub file_path: String,
    /// The symbol that was looked up.
    pub symbol_name: String,
    /// Reference locations, deduplicated, ordered by (path, line, character).
    pub references: Vec<LocationRecord>,
    /// Number of references.
    pub reference_count: usize,
}

/// Definitions of a named symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolDefinitions {
    /// Absolute path of the file the symbol was resolved in.
    pub file_path: String,
    /// The symbol that was looked up.
    pub symbol_name: String,
    /// Definition locations.
    pub definitions: Vec<LocationRecord>,
    /// Number of definitions.
    pub definition_count: usize,
}

/// Indented symbol outline of one file, sized for model context windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattedContext {
    /// Absolute path of the analyzed file.
    pub file_path: String,
    /// Symbol outline, one `name (kind)` line per declaration.
    pub formatted_context: String,
    /// Rough token estimate for the outline (~4 characters per token).
    pub token_count: usize,
}

/// Symbol-kind counts for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    /// Absolute path of the analyzed file.
    pub file_path: String,
    /// Count per kind name, highest first.
    pub symbol_counts: IndexMap<String, usize>,
    /// Total symbols counted.
    pub total_symbols: usize,
}

/// Per-file outcome inside a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FileOutcome {
    /// The file was analyzed.
    Ok(FileSymbols),
    /// The file failed; the envelope carries the kind and message.
    Err(ErrorEnvelope),
}

impl FileOutcome {
    /// Symbols counted toward the batch total (zero on failure).
    pub fn symbol_count(&self) -> usize {
        match self {
            Self::Ok(symbols) => symbols.symbol_count,
            Self::Err(_) => 0,
        }
    }

    /// Whether this outcome is a success.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Aggregated outcome of a multi-file analysis.
#[derive(Debug, Clone, Serialize)]
pub struct MultiFileAnalysis {
    /// Per-file outcomes keyed by the input path, in input order.
    pub files: IndexMap<String, FileOutcome>,
    /// Number of input files.
    pub total_files: usize,
    /// Symbols across all successful files.
    pub total_symbols: usize,
}

/// Result of a typecheck run. `ok` means the compiler ran to completion;
/// diagnostics are carried in `stderr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypecheckOutcome {
    /// Absolute path of the checked file.
    pub file_path: String,
    /// Whether the compiler process ran to completion.
    pub ok: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error (compiler diagnostics).
    pub stderr: String,
}

/// Cached result of the compiler environment probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    /// Whether the Swift toolchain is usable.
    pub available: bool,
    /// Human-readable detail (version string or failure reason).
    pub message: String,
}

/// Result of an index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBuildOutcome {
    /// Whether the build succeeded.
    pub success: bool,
    /// Canonical project root that was built.
    pub project_path: String,
    /// Index store location, when it exists after the build.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_path: Option<String>,
    /// Sanitized build output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_output: Option<String>,
    /// Wall-clock build time in seconds.
    pub build_time: f64,
    /// `package` or `xcode`.
    pub project_type: String,
}
