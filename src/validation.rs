//! Input validation for the public tool surface.
//!
//! Every operation canonicalizes and checks its inputs here before any
//! subprocess or language-server work happens. Scheme-name and index-path
//! checks used by the index builder also live here so the security rules
//! are in one place.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AnalysisError, Result};

/// Scheme names may contain word characters and hyphens, with single spaces
/// between words. Anything else (shell metacharacters, control characters,
/// leading/trailing/double spaces) is rejected.
static SCHEME_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+( [A-Za-z0-9_-]+)*$").unwrap());

/// Maximum accepted scheme-name length.
const MAX_SCHEME_LEN: usize = 100;

/// Resolves `path` against the process cwd and requires an existing `.swift`
/// source file. Returns the absolute path.
pub fn ensure_swift_file(path: &Path) -> Result<PathBuf> {
    let absolute = absolutize(path)?;

    if absolute.extension().and_then(|e| e.to_str()) != Some("swift") {
        return Err(AnalysisError::NotSwiftFile(absolute.display().to_string()));
    }
    if !absolute.is_file() {
        return Err(AnalysisError::FileNotFound(absolute.display().to_string()));
    }

    Ok(absolute)
}

/// Requires an existing directory and returns its canonical (symlink-free)
/// path.
pub fn ensure_project_dir(path: &Path) -> Result<PathBuf> {
    let absolute = absolutize(path)?;
    if !absolute.is_dir() {
        return Err(AnalysisError::Validation(format!(
            "project path is not a directory: {}",
            absolute.display()
        )));
    }
    absolute.canonicalize().map_err(|e| {
        AnalysisError::Validation(format!(
            "cannot resolve project path {}: {e}",
            absolute.display()
        ))
    })
}

/// User-facing positions carry a one-based line; zero is invalid.
/// The character component is zero-based and unsigned, so no lower-bound
/// check is needed there.
pub fn ensure_one_based_line(line: u32) -> Result<()> {
    if line < 1 {
        return Err(AnalysisError::Validation(
            "line number must be 1-based (>= 1)".to_string(),
        ));
    }
    Ok(())
}

/// Enforces the per-file size cap for compiler invocations.
pub fn ensure_file_size(path: &Path, max_bytes: u64) -> Result<u64> {
    let size = std::fs::metadata(path)
        .map_err(|e| AnalysisError::FileNotFound(format!("{}: {e}", path.display())))?
        .len();
    if size > max_bytes {
        return Err(AnalysisError::Validation(format!(
            "file too large: {:.1}MB (limit: {:.1}MB)",
            size as f64 / (1024.0 * 1024.0),
            max_bytes as f64 / (1024.0 * 1024.0),
        )));
    }
    Ok(size)
}

/// Validates an Xcode scheme name against the safe grammar.
pub fn is_valid_scheme_name(scheme: &str) -> bool {
    !scheme.is_empty()
        && scheme.len() <= MAX_SCHEME_LEN
        && !scheme.chars().any(char::is_control)
        && SCHEME_NAME.is_match(scheme)
}

/// Checks that `candidate` stays inside `root` after lexical normalization.
///
/// `candidate` may not exist yet (the index store is created by the build),
/// so `..` components are resolved lexically against the already-canonical
/// root instead of through the filesystem.
pub fn path_within_root(candidate: &Path, root: &Path) -> bool {
    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            std::path::Component::ParentDir => {
                if !normalized.pop() {
                    return false;
                }
            }
            std::path::Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized.starts_with(root)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(AnalysisError::Validation("empty path".to_string()));
    }
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| AnalysisError::Internal(format!("cannot read current directory: {e}")))?;
        Ok(cwd.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_swift_extension() {
        let err = ensure_swift_file(Path::new("/tmp/whatever.rs")).unwrap_err();
        assert_eq!(err.kind(), "not-swift-file");
    }

    #[test]
    fn rejects_missing_swift_file() {
        let err = ensure_swift_file(Path::new("/definitely/not/here/App.swift")).unwrap_err();
        assert_eq!(err.kind(), "file-not-found");
    }

    #[test]
    fn accepts_existing_swift_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Main.swift");
        std::fs::write(&file, "struct A {}\n").unwrap();
        let resolved = ensure_swift_file(&file).unwrap();
        assert!(resolved.is_absolute());
    }

    #[test]
    fn line_must_be_one_based() {
        assert!(ensure_one_based_line(0).is_err());
        assert!(ensure_one_based_line(1).is_ok());
    }

    #[test]
    fn file_size_cap_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Big.swift");
        std::fs::write(&file, vec![b'a'; 2048]).unwrap();
        assert!(ensure_file_size(&file, 4096).is_ok());
        let err = ensure_file_size(&file, 1024).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn scheme_names_accepted() {
        for name in ["MyApp", "My-App_2024", "App One"] {
            assert!(is_valid_scheme_name(name), "{name} should be accepted");
        }
    }

    #[test]
    fn scheme_names_rejected() {
        let long = "a".repeat(101);
        for name in [
            "app; rm -rf /",
            "app`whoami`",
            "app\n x",
            "app\0",
            " app",
            "app ",
            "a  b",
            "",
            long.as_str(),
        ] {
            assert!(!is_valid_scheme_name(name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn index_path_containment() {
        let root = Path::new("/projects/app");
        assert!(path_within_root(
            Path::new("/projects/app/.build/index/store"),
            root
        ));
        assert!(!path_within_root(
            Path::new("/projects/app/../other/index"),
            root
        ));
        assert!(!path_within_root(Path::new("/elsewhere/index"), root));
    }
}
