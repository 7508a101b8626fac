//! File analyzer: composes LSP primitives into analysis operations.
//!
//! Every operation follows the same shape: validate the input, discover the
//! project root, acquire the shared session, open the document (idempotent,
//! always paired with a close), run the LSP request, and normalize the
//! result into the public records. Only a `session-lost` failure invalidates
//! the session; everything else leaves it warm for the next call.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use lsp_types::{
    DocumentSymbol, DocumentSymbolResponse, GotoDefinitionResponse, Hover, HoverContents, Location,
    MarkedString, Position, Url,
};

use crate::error::{AnalysisError, Result};
use crate::lsp::supervisor::{ServerSession, ServerSupervisor};
use crate::lsp::types::{from_wire_position, symbol_kind_name, to_wire_position, uri_to_path_string};
use crate::validation;

use super::locator;
use super::records::{
    DeclarationContext, FileSummary, FileSymbols, FormattedContext, HoverInfo, HoverRecord,
    LocationRecord, SourceRange, SymbolDefinitions, SymbolRecord, SymbolReferences,
};

/// Depth cap when walking symbol trees; a deeper tree is pathological input.
const MAX_SYMBOL_DEPTH: usize = 50;

/// Analyzer bound to the process-wide supervisor.
#[derive(Debug, Clone)]
pub struct FileAnalyzer {
    supervisor: Arc<ServerSupervisor>,
}

impl FileAnalyzer {
    /// Creates an analyzer sharing the given supervisor.
    pub fn new(supervisor: Arc<ServerSupervisor>) -> Self {
        Self { supervisor }
    }

    /// The supervisor this analyzer routes through.
    pub fn supervisor(&self) -> &Arc<ServerSupervisor> {
        &self.supervisor
    }

    /// Full document-symbol tree of `path`, in source order.
    pub async fn analyze_file_symbols(&self, path: &Path) -> Result<FileSymbols> {
        let file = validation::ensure_swift_file(path)?;
        let symbols = self.fetch_symbols(&file).await?;
        let symbol_count = symbols.iter().map(SymbolRecord::subtree_len).sum();
        Ok(FileSymbols {
            file_path: file.display().to_string(),
            symbols,
            symbol_count,
        })
    }

    /// Top-level declarations only.
    pub async fn get_symbols_overview(&self, path: &Path) -> Result<FileSymbols> {
        let file = validation::ensure_swift_file(path)?;
        let mut symbols = self.fetch_symbols(&file).await?;
        for symbol in &mut symbols {
            symbol.children.clear();
        }
        let symbol_count = symbols.len();
        Ok(FileSymbols {
            file_path: file.display().to_string(),
            symbols,
            symbol_count,
        })
    }

    /// Dotted declaration paths in depth-first source order.
    pub async fn get_declaration_context(&self, path: &Path) -> Result<DeclarationContext> {
        let file = validation::ensure_swift_file(path)?;
        let symbols = self.fetch_symbols(&file).await?;

        let mut declarations = Vec::new();
        let mut trail = Vec::new();
        for symbol in &symbols {
            collect_declaration_paths(symbol, &mut trail, &mut declarations);
        }

        Ok(DeclarationContext {
            file_path: file.display().to_string(),
            declaration_count: declarations.len(),
            declarations,
        })
    }

    /// Hover content at a position (`line` one-based, `character` zero-based).
    pub async fn get_hover_info(&self, path: &Path, line: u32, character: u32) -> Result<HoverInfo> {
        let file = validation::ensure_swift_file(path)?;
        validation::ensure_one_based_line(line)?;
        let position = to_wire_position(line, character)?;

        let session = self.acquire_session(&file).await?;
        let outcome = self
            .with_open_document(&session, &file, |uri| {
                let client = session.client();
                async move { client.hover(&uri, position).await }
            })
            .await;
        let hover = self.finish(&session, outcome).await?;

        Ok(HoverInfo {
            file_path: file.display().to_string(),
            line,
            character,
            hover: hover.map(hover_record),
        })
    }

    /// All references to the first symbol named `symbol_name` in `path`.
    pub async fn find_symbol_references(
        &self,
        path: &Path,
        symbol_name: &str,
        include_declaration: bool,
    ) -> Result<SymbolReferences> {
        let file = validation::ensure_swift_file(path)?;
        let session = self.acquire_session(&file).await?;

        let outcome = self
            .with_open_document(&session, &file, |uri| {
                let client = session.client();
                let symbol_name = symbol_name.to_string();
                async move {
                    let position =
                        resolve_symbol_position(client, &uri, &symbol_name).await?;
                    client.references(&uri, position, include_declaration).await
                }
            })
            .await;
        let locations = self.finish(&session, outcome).await?;

        Ok(SymbolReferences {
            file_path: file.display().to_string(),
            symbol_name: symbol_name.to_string(),
            reference_count: locations.len(),
            references: normalize_locations(locations),
        })
    }

    /// Definition sites of the first symbol named `symbol_name` in `path`.
    pub async fn get_symbol_definition(
        &self,
        path: &Path,
        symbol_name: &str,
    ) -> Result<SymbolDefinitions> {
        let file = validation::ensure_swift_file(path)?;
        let session = self.acquire_session(&file).await?;

        let outcome = self
            .with_open_document(&session, &file, |uri| {
                let client = session.client();
                let symbol_name = symbol_name.to_string();
                async move {
                    let position =
                        resolve_symbol_position(client, &uri, &symbol_name).await?;
                    client.definition(&uri, position).await
                }
            })
            .await;
        let response = self.finish(&session, outcome).await?;
        let locations = definition_locations(response);

        Ok(SymbolDefinitions {
            file_path: file.display().to_string(),
            symbol_name: symbol_name.to_string(),
            definition_count: locations.len(),
            definitions: normalize_locations(locations),
        })
    }

    /// Indented symbol outline of `path` for model context windows.
    pub async fn format_context(&self, path: &Path) -> Result<FormattedContext> {
        let file = validation::ensure_swift_file(path)?;
        let symbols = self.fetch_symbols(&file).await?;

        let formatted_context = if symbols.is_empty() {
            "No symbols found".to_string()
        } else {
            let mut lines = Vec::new();
            for symbol in &symbols {
                format_symbol_outline(symbol, 0, &mut lines);
            }
            lines.join("\n")
        };

        Ok(FormattedContext {
            file_path: file.display().to_string(),
            token_count: estimate_token_count(&formatted_context),
            formatted_context,
        })
    }

    /// Symbol-kind counts for `path`.
    pub async fn summarize_file(&self, path: &Path) -> Result<FileSummary> {
        let file = validation::ensure_swift_file(path)?;
        let symbols = self.fetch_symbols(&file).await?;

        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for symbol in &symbols {
            count_symbols(symbol, &mut counts, 0);
        }
        counts.sort_by(|ka, va, kb, vb| vb.cmp(va).then_with(|| ka.cmp(kb)));
        let total_symbols = counts.values().sum();

        Ok(FileSummary {
            file_path: file.display().to_string(),
            symbol_counts: counts,
            total_symbols,
        })
    }

    async fn fetch_symbols(&self, file: &Path) -> Result<Vec<SymbolRecord>> {
        let session = self.acquire_session(file).await?;
        let outcome = self
            .with_open_document(&session, file, |uri| {
                let client = session.client();
                async move { client.document_symbols(&uri).await }
            })
            .await;
        let response = self.finish(&session, outcome).await?;
        Ok(normalize_symbols(response))
    }

    async fn acquire_session(&self, file: &Path) -> Result<Arc<ServerSession>> {
        let root = self.supervisor.locator().discover(file)?;
        self.supervisor.acquire(&root).await
    }

    /// Opens the document (idempotently), runs `op`, and always pairs the
    /// open with a close before returning.
    async fn with_open_document<T, F, Fut>(
        &self,
        session: &ServerSession,
        file: &Path,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(Url) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (uri, newly_opened) = session.client().ensure_open(file).await?;
        let outcome = op(uri.clone()).await;
        session.client().finish_document(&uri, newly_opened).await;
        outcome
    }

    /// Post-operation bookkeeping: a lost session is invalidated so the next
    /// caller gets a fresh one.
    async fn finish<T>(&self, session: &ServerSession, outcome: Result<T>) -> Result<T> {
        if let Err(err) = &outcome {
            if err.is_retriable() {
                self.supervisor.invalidate(session.root()).await;
            }
        }
        outcome
    }
}

/// Resolves a symbol name to a wire position: first match in the document
/// symbol tree, else the text-based locator.
async fn resolve_symbol_position(
    client: &crate::lsp::LspClient,
    uri: &Url,
    symbol_name: &str,
) -> Result<Position> {
    let response = client.document_symbols(uri).await?;
    if let Some(position) = position_in_symbol_tree(&response, symbol_name) {
        return Ok(position);
    }

    let path = uri
        .to_file_path()
        .map_err(|()| AnalysisError::Internal(format!("non-file URI: {uri}")))?;
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| AnalysisError::FileNotFound(format!("{}: {e}", path.display())))?;

    let found = locator::find_symbol(&content, symbol_name).ok_or_else(|| {
        AnalysisError::Validation(format!("symbol '{symbol_name}' not found in file"))
    })?;
    to_wire_position(found.line, found.character)
}

fn position_in_symbol_tree(
    response: &DocumentSymbolResponse,
    symbol_name: &str,
) -> Option<Position> {
    match response {
        DocumentSymbolResponse::Nested(symbols) => find_nested(symbols, symbol_name),
        DocumentSymbolResponse::Flat(symbols) => symbols
            .iter()
            .find(|s| s.name == symbol_name)
            .map(|s| s.location.range.start),
    }
}

fn find_nested(symbols: &[DocumentSymbol], name: &str) -> Option<Position> {
    for symbol in symbols {
        if symbol.name == name {
            return Some(symbol.selection_range.start);
        }
        if let Some(children) = &symbol.children {
            if let Some(found) = find_nested(children, name) {
                return Some(found);
            }
        }
    }
    None
}

/// Converts a document-symbol response into records, preserving source order.
/// Flat responses are lifted into a childless tree.
pub(crate) fn normalize_symbols(response: DocumentSymbolResponse) -> Vec<SymbolRecord> {
    match response {
        DocumentSymbolResponse::Nested(symbols) => symbols
            .iter()
            .map(|s| nested_to_record(s, 0))
            .collect(),
        DocumentSymbolResponse::Flat(symbols) => symbols
            .iter()
            .map(|s| {
                let (line, character) = from_wire_position(s.location.range.start);
                SymbolRecord {
                    name: s.name.clone(),
                    kind: symbol_kind_name(s.kind).to_string(),
                    line,
                    character,
                    children: Vec::new(),
                }
            })
            .collect(),
    }
}

fn nested_to_record(symbol: &DocumentSymbol, depth: usize) -> SymbolRecord {
    let (line, character) = from_wire_position(symbol.selection_range.start);
    let children = if depth >= MAX_SYMBOL_DEPTH {
        Vec::new()
    } else {
        symbol
            .children
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(|child| nested_to_record(child, depth + 1))
            .collect()
    };
    SymbolRecord {
        name: symbol.name.clone(),
        kind: symbol_kind_name(symbol.kind).to_string(),
        line,
        character,
        children,
    }
}

fn collect_declaration_paths(
    symbol: &SymbolRecord,
    trail: &mut Vec<String>,
    out: &mut Vec<String>,
) {
    trail.push(symbol.name.clone());
    out.push(trail.join("."));
    for child in &symbol.children {
        collect_declaration_paths(child, trail, out);
    }
    trail.pop();
}

/// One `name (kind)` line per declaration, indented two spaces per level.
fn format_symbol_outline(symbol: &SymbolRecord, depth: usize, lines: &mut Vec<String>) {
    if depth > MAX_SYMBOL_DEPTH {
        return;
    }
    lines.push(format!(
        "{}{} ({})",
        "  ".repeat(depth),
        symbol.name,
        symbol.kind
    ));
    for child in &symbol.children {
        format_symbol_outline(child, depth + 1, lines);
    }
}

/// Rough token estimate: ~4 characters per token, at least 1 for non-empty
/// text.
fn estimate_token_count(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        (text.len() / 4).max(1)
    }
}

fn count_symbols(symbol: &SymbolRecord, counts: &mut IndexMap<String, usize>, depth: usize) {
    if depth > MAX_SYMBOL_DEPTH {
        return;
    }
    *counts.entry(symbol.kind.clone()).or_insert(0) += 1;
    for child in &symbol.children {
        count_symbols(child, counts, depth + 1);
    }
}

/// Deduplicates by (path, range) and orders by (path, line, character).
pub(crate) fn normalize_locations(locations: Vec<Location>) -> Vec<LocationRecord> {
    let mut seen = HashSet::new();
    let mut records: Vec<LocationRecord> = locations
        .into_iter()
        .map(|location| LocationRecord {
            file_path: uri_to_path_string(&location.uri),
            range: wire_range(location.range),
        })
        .filter(|record| seen.insert((record.file_path.clone(), record.range.clone())))
        .collect();
    records.sort_by(|a, b| {
        (&a.file_path, &a.range)
            .cmp(&(&b.file_path, &b.range))
    });
    records
}

fn definition_locations(response: GotoDefinitionResponse) -> Vec<Location> {
    match response {
        GotoDefinitionResponse::Scalar(location) => vec![location],
        GotoDefinitionResponse::Array(locations) => locations,
        GotoDefinitionResponse::Link(links) => links
            .into_iter()
            .map(|link| Location {
                uri: link.target_uri,
                range: link.target_selection_range,
            })
            .collect(),
    }
}

fn wire_range(range: lsp_types::Range) -> SourceRange {
    let (start_line, start_character) = from_wire_position(range.start);
    let (end_line, end_character) = from_wire_position(range.end);
    SourceRange {
        start_line,
        start_character,
        end_line,
        end_character,
    }
}

fn hover_record(hover: Hover) -> HoverRecord {
    HoverRecord {
        contents: hover_text(hover.contents),
        range: hover.range.map(wire_range),
    }
}

/// Extracts plain text from the three hover content shapes.
fn hover_text(contents: HoverContents) -> String {
    fn marked(ms: MarkedString) -> String {
        match ms {
            MarkedString::String(s) => s,
            MarkedString::LanguageString(ls) => format!("```{}\n{}\n```", ls.language, ls.value),
        }
    }
    match contents {
        HoverContents::Scalar(ms) => marked(ms),
        HoverContents::Array(items) => items
            .into_iter()
            .map(marked)
            .collect::<Vec<_>>()
            .join("\n\n"),
        HoverContents::Markup(markup) => markup.value,
    }
}
