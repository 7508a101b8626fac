//! Swift project discovery.
//!
//! Walks ancestor directories of a source file to find the nearest project
//! marker: a `Package.swift` manifest, an `.xcworkspace` bundle, or an
//! `.xcodeproj` bundle. A workspace beats a project in the same directory.
//! Results are memoized per absolute path for the lifetime of the locator.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{AnalysisError, Result};

/// Classification of a discovered project root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    /// Directory containing a `Package.swift` manifest.
    Package,
    /// Directory containing an `.xcodeproj` bundle.
    XcodeProject,
    /// Directory containing an `.xcworkspace` bundle.
    XcodeWorkspace,
    /// No marker found up to the filesystem root.
    None,
}

impl ProjectKind {
    /// Wire string for records and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::XcodeProject => "xcode-project",
            Self::XcodeWorkspace => "xcode-workspace",
            Self::None => "none",
        }
    }
}

/// A discovered project root. Immutable after construction.
#[derive(Debug, Clone)]
pub struct ProjectRoot {
    /// Absolute, symlink-resolved root directory.
    pub path: PathBuf,
    /// Project classification.
    pub kind: ProjectKind,
    /// The path discovery started from.
    pub discovered_from: PathBuf,
}

impl ProjectRoot {
    /// Whether any project marker was found.
    pub fn is_project(&self) -> bool {
        self.kind != ProjectKind::None
    }
}

/// Memoizing project locator shared across tool invocations.
#[derive(Debug, Default)]
pub struct ProjectLocator {
    cache: Mutex<HashMap<PathBuf, Arc<ProjectRoot>>>,
}

impl ProjectLocator {
    /// Creates an empty locator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovers the project root for `path` (a file or directory).
    pub fn discover(&self, path: &Path) -> Result<Arc<ProjectRoot>> {
        let canonical = path.canonicalize().map_err(|e| {
            AnalysisError::FileNotFound(format!("{}: {e}", path.display()))
        })?;

        if let Some(root) = self.cache.lock().unwrap().get(&canonical) {
            return Ok(Arc::clone(root));
        }

        let root = Arc::new(discover_uncached(&canonical));
        self.cache
            .lock()
            .unwrap()
            .insert(canonical, Arc::clone(&root));
        Ok(root)
    }
}

fn discover_uncached(canonical: &Path) -> ProjectRoot {
    let start_dir = if canonical.is_dir() {
        canonical.to_path_buf()
    } else {
        canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| canonical.to_path_buf())
    };

    for dir in start_dir.ancestors() {
        if let Some(kind) = classify_dir(dir) {
            return ProjectRoot {
                path: dir.to_path_buf(),
                kind,
                discovered_from: canonical.to_path_buf(),
            };
        }
    }

    ProjectRoot {
        path: start_dir,
        kind: ProjectKind::None,
        discovered_from: canonical.to_path_buf(),
    }
}

/// Classifies a single directory, honoring the workspace-over-project
/// precedence inside it. Returns `None` when the directory carries no marker.
fn classify_dir(dir: &Path) -> Option<ProjectKind> {
    if dir.join("Package.swift").is_file() {
        return Some(ProjectKind::Package);
    }
    if dir_contains_bundle(dir, "xcworkspace") {
        return Some(ProjectKind::XcodeWorkspace);
    }
    if dir_contains_bundle(dir, "xcodeproj") {
        return Some(ProjectKind::XcodeProject);
    }
    None
}

fn dir_contains_bundle(dir: &Path, extension: &str) -> bool {
    find_bundle(dir, extension).is_some()
}

/// Finds the Xcode workspace or project bundle inside `dir`, workspace
/// preferred. Hidden entries are skipped; symlinked bundles are accepted when
/// their target exists, and the symlink path itself is returned.
pub fn find_xcode_container(dir: &Path) -> Option<PathBuf> {
    find_bundle(dir, "xcworkspace").or_else(|| find_bundle(dir, "xcodeproj"))
}

fn find_bundle(dir: &Path, extension: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name();
            let name = name.to_str()?;
            if name.starts_with('.') {
                return None;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                return None;
            }
            // Resolve symlinks only to verify the target exists.
            if path.is_symlink() {
                let target = std::fs::canonicalize(&path).ok()?;
                target.exists().then_some(path)
            } else {
                path.is_dir().then_some(path)
            }
        })
        .collect();
    found.sort();
    found.into_iter().next()
}
