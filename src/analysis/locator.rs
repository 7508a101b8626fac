//! Text-based symbol locator.
//!
//! Fallback used when the language server's symbol tree does not contain the
//! requested name (typically a cold index). Handles a deliberately small set
//! of declaration forms:
//!
//! - `class|struct|enum|protocol <name>`
//! - `func <name>`
//! - `var|let <name>`
//! - `init`
//!
//! No attempt is made to parse Swift beyond these line-anchored shapes.

use once_cell::sync::Lazy;
use regex::Regex;

/// A symbol found through text scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSymbol {
    /// Matched name.
    pub name: String,
    /// Declaration form that matched (`type`, `func`, `property`, `init`).
    pub form: &'static str,
    /// One-based line of the declaration.
    pub line: u32,
    /// Zero-based UTF-16 character offset of the name within the line.
    pub character: u32,
}

static TYPE_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:public |internal |private |fileprivate |open |final )*(?:class|struct|enum|protocol)\s+").unwrap());
static FUNC_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:public |internal |private |fileprivate |open |static |override )*func\s+").unwrap());
static PROPERTY_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:public |internal |private |fileprivate |static |lazy )*(?:var|let)\s+").unwrap());
static INIT_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:public |internal |private |fileprivate |convenience |required )*init\s*[(<]").unwrap());

/// Scans `content` for the first declaration of `name` in source order.
pub fn find_symbol(content: &str, name: &str) -> Option<TextSymbol> {
    for (index, line) in content.lines().enumerate() {
        let line_no = (index + 1) as u32;

        if name == "init" {
            if let Some(found) = INIT_KEYWORD.find(line) {
                let offset = line[..found.end()].rfind("init").unwrap_or(0);
                return Some(TextSymbol {
                    name: name.to_string(),
                    form: "init",
                    line: line_no,
                    character: utf16_offset(line, offset),
                });
            }
            continue;
        }

        for (pattern, form) in [
            (&*TYPE_KEYWORDS, "type"),
            (&*FUNC_KEYWORD, "func"),
            (&*PROPERTY_KEYWORD, "property"),
        ] {
            if let Some(matched) = pattern.find(line) {
                let rest = &line[matched.end()..];
                if is_name_at_start(rest, name) {
                    return Some(TextSymbol {
                        name: name.to_string(),
                        form,
                        line: line_no,
                        character: utf16_offset(line, matched.end()),
                    });
                }
            }
        }
    }
    None
}

/// The candidate must be followed by a non-identifier character so `run`
/// does not match `runner`.
fn is_name_at_start(rest: &str, name: &str) -> bool {
    rest.starts_with(name)
        && !rest[name.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn utf16_offset(line: &str, byte_offset: usize) -> u32 {
    line[..byte_offset].encode_utf16().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"import Foundation

struct Point {
    var x: Int
    let label: String

    init(x: Int) {
        self.x = x
        self.label = "p"
    }

    func distance() -> Double { 0 }
}

protocol Shape {
    func area() -> Double
}

enum Direction {
    case north
}
"#;

    #[test]
    fn finds_struct_declaration() {
        let symbol = find_symbol(SOURCE, "Point").unwrap();
        assert_eq!(symbol.form, "type");
        assert_eq!(symbol.line, 3);
        assert_eq!(symbol.character, 7);
    }

    #[test]
    fn finds_protocol_and_enum() {
        assert_eq!(find_symbol(SOURCE, "Shape").unwrap().line, 15);
        assert_eq!(find_symbol(SOURCE, "Direction").unwrap().line, 19);
    }

    #[test]
    fn finds_func_declaration() {
        let symbol = find_symbol(SOURCE, "distance").unwrap();
        assert_eq!(symbol.form, "func");
        assert_eq!(symbol.line, 12);
    }

    #[test]
    fn finds_properties() {
        assert_eq!(find_symbol(SOURCE, "x").unwrap().form, "property");
        assert_eq!(find_symbol(SOURCE, "label").unwrap().line, 5);
    }

    #[test]
    fn finds_initializer() {
        let symbol = find_symbol(SOURCE, "init").unwrap();
        assert_eq!(symbol.form, "init");
        assert_eq!(symbol.line, 7);
    }

    #[test]
    fn does_not_match_prefixes() {
        // `distance` exists; `dist` must not match it.
        assert!(find_symbol(SOURCE, "dist").is_none());
    }

    #[test]
    fn missing_symbol_yields_none() {
        assert!(find_symbol(SOURCE, "Nope").is_none());
    }

    #[test]
    fn first_match_in_source_order_wins() {
        let source = "func twice() {}\nfunc twice() {}\n";
        assert_eq!(find_symbol(source, "twice").unwrap().line, 1);
    }
}
