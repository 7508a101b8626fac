//! Project index builder.
//!
//! Builds the on-disk index store that SourceKit-LSP consults for cross-file
//! queries. Swift packages go through `swift build` with an explicit index
//! store path; Xcode projects and workspaces go through `xcodebuild` with a
//! validated scheme. An advisory non-blocking file lock keeps builds for one
//! project exclusive, and every line of build output is sanitized before it
//! leaves this module.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::analysis::records::IndexBuildOutcome;
use crate::compiler::run_with_deadline;
use crate::error::{AnalysisError, Result};
use crate::project::find_xcode_container;
use crate::validation;

/// Default deadline for one build.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Hard cap on the build deadline.
const MAX_TIMEOUT: Duration = Duration::from_secs(300);
/// Deadline for environment probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for scheme auto-detection.
const SCHEME_DETECTION_TIMEOUT: Duration = Duration::from_secs(10);
/// Index store location relative to the project root.
const INDEX_STORE_RELATIVE: &str = ".build/index/store";

/// Sanitization patterns applied to build output, in order: absolute paths,
/// environment assignments, long alphanumeric tokens, key-like prefixes,
/// IPv4 addresses, UUIDs.
static SANITIZERS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"/[\w\-\./]+").unwrap(), "<path>"),
        (Regex::new(r"\b[A-Z_]+=[\w\-\./]+").unwrap(), "<env_var>"),
        (Regex::new(r"\b[a-zA-Z0-9]{20,}\b").unwrap(), "<token>"),
        (
            Regex::new(r"\b(?:sk|pk|api_key|token|secret)[-_]?[a-zA-Z0-9]{10,}\b").unwrap(),
            "<token>",
        ),
        (
            Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap(),
            "<ip>",
        ),
        (
            Regex::new(
                r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
            )
            .unwrap(),
            "<uuid>",
        ),
    ]
});

/// Masks absolute paths, environment assignments, token-like strings, IP
/// addresses, and UUIDs in build output.
pub fn sanitize_build_output(output: &str) -> String {
    let mut sanitized = output.to_string();
    for (pattern, replacement) in SANITIZERS.iter() {
        sanitized = pattern.replace_all(&sanitized, *replacement).into_owned();
    }
    sanitized
}

/// Builder for project index stores.
#[derive(Debug, Default)]
pub struct IndexBuilder;

impl IndexBuilder {
    /// Creates an index builder.
    pub fn new() -> Self {
        Self
    }

    /// Builds or refreshes the index for the project at `project_path`.
    pub async fn build_index(
        &self,
        project_path: &Path,
        timeout: Option<Duration>,
        scheme: Option<&str>,
    ) -> Result<IndexBuildOutcome> {
        let root = validation::ensure_project_dir(project_path)?;
        let timeout = clamp_timeout(timeout);

        if root.join("Package.swift").is_file() {
            self.build_package(&root, timeout).await
        } else if let Some(container) = find_xcode_container(&root) {
            self.build_xcode(&root, &container, scheme, timeout).await
        } else {
            Err(AnalysisError::Validation(format!(
                "no Swift project found at {} (Package.swift or .xcodeproj/.xcworkspace)",
                root.display()
            )))
        }
    }

    async fn build_package(&self, root: &Path, timeout: Duration) -> Result<IndexBuildOutcome> {
        ensure_tool_available("swift", "Swift command not found. Install Xcode or a Swift toolchain.")
            .await?;

        with_build_lock(root, || async {
            let started = Instant::now();

            let mut command = tokio::process::Command::new("xcrun");
            command
                .args([
                    "swift",
                    "build",
                    "-Xswiftc",
                    "-index-store-path",
                    "-Xswiftc",
                    INDEX_STORE_RELATIVE,
                ])
                .current_dir(root);

            let output = run_build(command, timeout).await?;
            Ok(build_outcome(root, "package", started, output))
        })
        .await
    }

    async fn build_xcode(
        &self,
        root: &Path,
        container: &Path,
        scheme: Option<&str>,
        timeout: Duration,
    ) -> Result<IndexBuildOutcome> {
        // A hostile explicit scheme is rejected before anything is spawned.
        if let Some(name) = scheme {
            if !validation::is_valid_scheme_name(name) {
                return Err(invalid_scheme_error());
            }
        }

        ensure_tool_available("xcodebuild", "xcodebuild not found. Install Xcode.").await?;

        let scheme = match scheme {
            Some(name) => name.to_string(),
            None => detect_scheme(container).await.ok_or_else(|| {
                AnalysisError::Validation(
                    "no scheme found in Xcode project; specify a scheme".to_string(),
                )
            })?,
        };
        if !validation::is_valid_scheme_name(&scheme) {
            return Err(invalid_scheme_error());
        }

        let index_path = root.join(INDEX_STORE_RELATIVE);
        if !validation::path_within_root(&index_path, root) {
            return Err(AnalysisError::Validation(
                "invalid index path: index must be inside the project directory".to_string(),
            ));
        }
        tokio::fs::create_dir_all(&index_path)
            .await
            .map_err(|e| AnalysisError::Build(format!("cannot create index directory: {e}")))?;

        let container_flag = if container.extension().and_then(|e| e.to_str()) == Some("xcworkspace")
        {
            "-workspace"
        } else {
            "-project"
        };

        with_build_lock(root, || async {
            let started = Instant::now();

            let mut command = tokio::process::Command::new("xcrun");
            command
                .arg("xcodebuild")
                .arg(container_flag)
                .arg(container)
                .arg("-scheme")
                .arg(&scheme)
                .arg("build")
                .arg(format!("INDEX_STORE_PATH={}", index_path.display()))
                .arg(format!("CLANG_INDEX_STORE_PATH={}", index_path.display()))
                .arg("INDEX_ENABLE_BUILD_ARENA=YES")
                .current_dir(root);

            let output = run_build(command, timeout).await?;
            Ok(build_outcome(root, "xcode", started, output))
        })
        .await
    }
}

/// Runs `f` holding the exclusive advisory lock for `root`'s build
/// directory. Contention fails fast with `build-in-progress`.
async fn with_build_lock<T, F, Fut>(root: &Path, f: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let lock_path = root.join(".build/.index-build.lock");
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AnalysisError::Build(format!("cannot create build directory: {e}")))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| AnalysisError::Build(format!("cannot open lock file: {e}")))?;

    let mut lock = fd_lock::RwLock::new(file);
    let _guard = lock.try_write().map_err(|e| match e.kind() {
        std::io::ErrorKind::WouldBlock => AnalysisError::BuildInProgress,
        _ => AnalysisError::Build(format!("cannot acquire build lock: {e}")),
    })?;

    f().await
}

async fn run_build(
    command: tokio::process::Command,
    timeout: Duration,
) -> Result<std::process::Output> {
    match run_with_deadline(command, timeout).await {
        Ok(output) => Ok(output),
        Err(AnalysisError::Timeout(_)) => Err(AnalysisError::Build(format!(
            "build timed out after {} seconds",
            timeout.as_secs()
        ))),
        Err(other) => Err(other),
    }
}

fn build_outcome(
    root: &Path,
    project_type: &str,
    started: Instant,
    output: std::process::Output,
) -> IndexBuildOutcome {
    let build_time = started.elapsed().as_secs_f64();
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let index_path = root.join(INDEX_STORE_RELATIVE);

    IndexBuildOutcome {
        success: output.status.success(),
        project_path: root.display().to_string(),
        index_path: index_path
            .exists()
            .then(|| index_path.display().to_string()),
        build_output: Some(sanitize_build_output(&combined)),
        build_time,
        project_type: project_type.to_string(),
    }
}

fn invalid_scheme_error() -> AnalysisError {
    AnalysisError::Validation(
        "invalid scheme name: only alphanumerics, hyphens, underscores, and single spaces \
         are allowed"
            .to_string(),
    )
}

async fn ensure_tool_available(tool: &str, message: &str) -> Result<()> {
    let probe = tokio::process::Command::new("xcrun")
        .args(["--find", tool])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(_) => Err(AnalysisError::Environment(message.to_string())),
        Err(_) => Err(AnalysisError::Environment(format!(
            "{tool} environment check timed out"
        ))),
    }
}

/// Asks `xcodebuild -list -json` for the container's schemes and picks the
/// first non-hidden one.
async fn detect_scheme(container: &Path) -> Option<String> {
    let flag = if container.extension().and_then(|e| e.to_str()) == Some("xcworkspace") {
        "-workspace"
    } else {
        "-project"
    };

    let mut command = tokio::process::Command::new("xcrun");
    command
        .arg("xcodebuild")
        .arg(flag)
        .arg(container)
        .args(["-list", "-json"]);

    let output = run_with_deadline(command, SCHEME_DETECTION_TIMEOUT)
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let listing: Value = serde_json::from_slice(&output.stdout).ok()?;
    let is_workspace = flag == "-workspace";
    first_scheme(&listing, is_workspace)
}

fn first_scheme(listing: &Value, is_workspace: bool) -> Option<String> {
    let section = if is_workspace { "workspace" } else { "project" };
    listing
        .get(section)?
        .get("schemes")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .find(|scheme| !scheme.is_empty() && !scheme.starts_with('.'))
        .map(str::to_string)
}

fn clamp_timeout(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(t) if t > MAX_TIMEOUT => MAX_TIMEOUT,
        Some(t) if t < Duration::from_secs(1) => DEFAULT_TIMEOUT,
        Some(t) => t,
        None => DEFAULT_TIMEOUT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizer_masks_paths_env_tokens_ips_uuids() {
        let output = "compiling /Users/dev/Secret/App.swift\n\
                      TOKEN=abcdef123456abcdef123456\n\
                      key sk-abcdef12345 leaked\n\
                      host 192.168.1.100\n\
                      id 123e4567-e89b-12d3-a456-426614174000";
        let sanitized = sanitize_build_output(output);

        assert!(sanitized.contains("compiling <path>"));
        assert!(sanitized.contains("<env_var>"), "{sanitized}");
        assert!(sanitized.contains("key <token> leaked"), "{sanitized}");
        assert!(sanitized.contains("host <ip>"));
        assert!(sanitized.contains("id <uuid>"));
        assert!(!sanitized.contains("Secret"));
        assert!(!sanitized.contains("192.168"));
    }

    #[test]
    fn sanitizer_masks_long_alphanumeric_runs() {
        let sanitized = sanitize_build_output("token a1b2c3d4e5f6a1b2c3d4e5 end");
        assert_eq!(sanitized, "token <token> end");
    }

    #[test]
    fn sanitizer_leaves_ordinary_output_alone() {
        let output = "Compiling module App (3 sources)";
        assert_eq!(sanitize_build_output(output), output);
    }

    #[test]
    fn timeout_clamping() {
        assert_eq!(clamp_timeout(None), DEFAULT_TIMEOUT);
        assert_eq!(clamp_timeout(Some(Duration::from_secs(1000))), MAX_TIMEOUT);
        assert_eq!(clamp_timeout(Some(Duration::ZERO)), DEFAULT_TIMEOUT);
        assert_eq!(
            clamp_timeout(Some(Duration::from_secs(90))),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn first_scheme_prefers_non_hidden() {
        let listing = serde_json::json!({
            "project": { "schemes": [".hidden", "", "MyApp", "Other"] }
        });
        assert_eq!(first_scheme(&listing, false).unwrap(), "MyApp");

        let listing = serde_json::json!({
            "workspace": { "schemes": ["WorkspaceApp"] }
        });
        assert_eq!(first_scheme(&listing, true).unwrap(), "WorkspaceApp");
        assert_eq!(first_scheme(&listing, false), None);
    }

    #[tokio::test]
    async fn build_lock_contention_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let slow_root = root.clone();
        let holder = tokio::spawn(async move {
            with_build_lock(&slow_root, || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await
        });

        // Give the holder time to take the lock.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let contended = with_build_lock(&root, || async { Ok(()) }).await;
        assert!(matches!(contended, Err(AnalysisError::BuildInProgress)));
        assert!(started.elapsed() < Duration::from_millis(100));

        holder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn lock_is_released_after_use() {
        let dir = tempfile::tempdir().unwrap();
        with_build_lock(dir.path(), || async { Ok(()) }).await.unwrap();
        with_build_lock(dir.path(), || async { Ok(()) }).await.unwrap();
        assert!(dir.path().join(".build/.index-build.lock").exists());
    }

    #[tokio::test]
    async fn missing_project_markers_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = IndexBuilder::new()
            .build_index(dir.path(), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn missing_directory_rejected() {
        let err = IndexBuilder::new()
            .build_index(Path::new("/definitely/not/a/project"), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
