//! Fixture workspaces for integration tests.
//!
//! Fixtures use the `//- /relative/path` file-separator format; an optional
//! `$0` marker records a cursor position (one-based line, zero-based
//! character) and is stripped from the written file.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A parsed fixture: files plus an optional cursor.
#[derive(Debug)]
pub struct Fixture {
    /// Relative path and content of every file.
    pub files: Vec<(PathBuf, String)>,
    /// Cursor position, when the fixture contains `$0`.
    pub cursor: Option<(PathBuf, u32, u32)>,
}

/// Parses the fixture text.
///
/// ## Panics
/// Panics when the input has content before the first `//- ` header.
pub fn parse_fixture(input: &str) -> Fixture {
    let mut files = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_content = String::new();
    let mut cursor = None;

    for line in input.lines() {
        if let Some(path) = line.strip_prefix("//- ") {
            if let Some(done) = current_path.take() {
                files.push((done, std::mem::take(&mut current_content)));
            }
            current_path = Some(PathBuf::from(path.trim().trim_start_matches('/')));
        } else {
            let path = current_path
                .clone()
                .expect("fixture content before the first //- header");
            let mut text = line.to_string();
            if let Some(index) = text.find("$0") {
                let line_no = (current_content.lines().count() + 1) as u32;
                let character = text[..index].encode_utf16().count() as u32;
                cursor = Some((path, line_no, character));
                text = text.replace("$0", "");
            }
            current_content.push_str(&text);
            current_content.push('\n');
        }
    }
    if let Some(done) = current_path {
        files.push((done, current_content));
    }

    Fixture { files, cursor }
}

/// A fixture written out to a temporary directory.
pub struct TestWorkspace {
    _root: TempDir,
    /// Parsed fixture description.
    pub fixture: Fixture,
    canonical_root: PathBuf,
}

impl TestWorkspace {
    /// Writes `fixture` into a fresh temporary directory.
    pub fn new(fixture: &str) -> Self {
        let root = TempDir::new().expect("failed to create temp directory");
        let fixture = parse_fixture(fixture);

        for (path, content) in &fixture.files {
            let absolute = root.path().join(path);
            std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
            std::fs::write(&absolute, content).unwrap();
        }

        // Resolves symlinks like /var -> /private/var on macOS.
        let canonical_root = root.path().canonicalize().unwrap();
        Self {
            _root: root,
            fixture,
            canonical_root,
        }
    }

    /// Canonical workspace root.
    pub fn root(&self) -> &Path {
        &self.canonical_root
    }

    /// Absolute path of a fixture-relative path.
    pub fn apath(&self, path: &str) -> PathBuf {
        self.canonical_root.join(path)
    }

    /// Cursor from the fixture as `(absolute path, line, character)`.
    ///
    /// ## Panics
    /// Panics when the fixture has no `$0` marker.
    pub fn cursor(&self) -> (PathBuf, u32, u32) {
        let (path, line, character) = self
            .fixture
            .cursor
            .as_ref()
            .expect("fixture has no $0 cursor");
        (self.canonical_root.join(path), *line, *character)
    }
}
