//! Position conversion, URI helpers, and symbol-kind names.
//!
//! Convention at the public surface: lines are one-based, characters are
//! zero-based UTF-16 code units. The LSP wire uses zero-based for both, so
//! every position crosses through this module on its way in or out.

use std::path::Path;

use lsp_types::{Position, Url};

use crate::error::{AnalysisError, Result};

/// Converts a path to a canonical `file://` URI.
///
/// Relative paths are resolved against the process cwd; symlinks are
/// resolved before encoding so the server and the analyzer agree on one
/// spelling of every document.
pub fn path_to_uri(path: &Path) -> Result<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| AnalysisError::Internal(format!("cannot read current directory: {e}")))?
            .join(path)
    };

    let canonical = absolute
        .canonicalize()
        .map_err(|e| AnalysisError::FileNotFound(format!("{}: {e}", path.display())))?;

    Url::from_file_path(&canonical)
        .map_err(|()| AnalysisError::Validation(format!("invalid path: {}", canonical.display())))
}

/// Extracts the filesystem path from a `file://` URI, falling back to the
/// raw URI string for non-file schemes.
pub fn uri_to_path_string(uri: &Url) -> String {
    uri.to_file_path()
        .map_or_else(|()| uri.to_string(), |p| p.display().to_string())
}

/// Converts a user-facing position (one-based line, zero-based character)
/// to a wire position.
pub fn to_wire_position(line: u32, character: u32) -> Result<Position> {
    if line < 1 {
        return Err(AnalysisError::Validation(
            "line number must be 1-based (>= 1)".to_string(),
        ));
    }
    Ok(Position {
        line: line - 1,
        character,
    })
}

/// Converts a wire position back to the user-facing convention.
pub fn from_wire_position(position: Position) -> (u32, u32) {
    (position.line + 1, position.character)
}

/// Stable name for an LSP symbol kind.
pub fn symbol_kind_name(kind: lsp_types::SymbolKind) -> &'static str {
    use lsp_types::SymbolKind;
    match kind {
        SymbolKind::FILE => "file",
        SymbolKind::MODULE => "module",
        SymbolKind::NAMESPACE => "namespace",
        SymbolKind::PACKAGE => "package",
        SymbolKind::CLASS => "class",
        SymbolKind::METHOD => "method",
        SymbolKind::PROPERTY => "property",
        SymbolKind::FIELD => "field",
        SymbolKind::CONSTRUCTOR => "constructor",
        SymbolKind::ENUM => "enum",
        SymbolKind::INTERFACE => "interface",
        SymbolKind::FUNCTION => "function",
        SymbolKind::VARIABLE => "variable",
        SymbolKind::CONSTANT => "constant",
        SymbolKind::STRING => "string",
        SymbolKind::NUMBER => "number",
        SymbolKind::BOOLEAN => "boolean",
        SymbolKind::ARRAY => "array",
        SymbolKind::OBJECT => "object",
        SymbolKind::KEY => "key",
        SymbolKind::NULL => "null",
        SymbolKind::ENUM_MEMBER => "enum-member",
        SymbolKind::STRUCT => "struct",
        SymbolKind::EVENT => "event",
        SymbolKind::OPERATOR => "operator",
        SymbolKind::TYPE_PARAMETER => "type-parameter",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_position_shifts_only_the_line() {
        let pos = to_wire_position(1, 0).unwrap();
        assert_eq!((pos.line, pos.character), (0, 0));

        let pos = to_wire_position(10, 4).unwrap();
        assert_eq!((pos.line, pos.character), (9, 4));
    }

    #[test]
    fn wire_position_rejects_zero_line() {
        assert!(to_wire_position(0, 0).is_err());
    }

    #[test]
    fn wire_roundtrip() {
        let (line, character) = from_wire_position(Position {
            line: 9,
            character: 4,
        });
        assert_eq!((line, character), (10, 4));
        let back = to_wire_position(line, character).unwrap();
        assert_eq!((back.line, back.character), (9, 4));
    }

    #[test]
    fn kind_names_use_kebab_case() {
        assert_eq!(symbol_kind_name(lsp_types::SymbolKind::STRUCT), "struct");
        assert_eq!(
            symbol_kind_name(lsp_types::SymbolKind::ENUM_MEMBER),
            "enum-member"
        );
        assert_eq!(
            symbol_kind_name(lsp_types::SymbolKind::TYPE_PARAMETER),
            "type-parameter"
        );
    }

    #[test]
    fn uri_roundtrip_for_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Thing.swift");
        std::fs::write(&file, "struct Thing {}\n").unwrap();

        let uri = path_to_uri(&file).unwrap();
        assert!(uri.as_str().starts_with("file://"));
        assert!(uri_to_path_string(&uri).ends_with("Thing.swift"));
    }
}
