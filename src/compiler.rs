//! Swift compiler driver for typecheck diagnostics.
//!
//! Invokes `swiftc -typecheck` through the toolchain locator with the
//! working directory set to a freshly created temporary directory, so
//! compiler-generated artifacts never land in user-controlled paths. When a
//! package manifest is found above the file, the package driver is tried
//! first and the per-file invocation is the fallback.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::sync::Mutex;

use crate::analysis::records::{EnvironmentStatus, TypecheckOutcome};
use crate::error::{AnalysisError, Result};
use crate::validation;

/// Default deadline for one compiler invocation.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Hard cap on the deadline.
const MAX_TIMEOUT: Duration = Duration::from_secs(60);
/// Deadline for the environment probe commands.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a cached environment probe stays valid.
const ENV_CACHE_TTL: Duration = Duration::from_secs(300);
/// Grace between SIGTERM and SIGKILL when a deadline expires.
const KILL_GRACE: Duration = Duration::from_secs(2);
/// Largest file accepted for typechecking.
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Client for Swift compiler typecheck operations.
#[derive(Debug)]
pub struct SwiftCompiler {
    timeout: Duration,
    env_cache: Mutex<Option<(Instant, EnvironmentStatus)>>,
}

impl Default for SwiftCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl SwiftCompiler {
    /// Creates a compiler client; the timeout is clamped to the hard cap.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: timeout.min(MAX_TIMEOUT),
            env_cache: Mutex::new(None),
        }
    }

    /// Probes the Swift toolchain, caching the result for five minutes.
    pub async fn check_environment(&self) -> EnvironmentStatus {
        let mut cache = self.env_cache.lock().await;
        if let Some((probed_at, status)) = cache.as_ref() {
            if probed_at.elapsed() < ENV_CACHE_TTL {
                return status.clone();
            }
        }

        let status = probe_environment().await;
        *cache = Some((Instant::now(), status.clone()));
        status
    }

    /// Runs `swiftc -typecheck` on a single file inside a sandbox cwd.
    pub async fn typecheck_file(&self, path: &Path) -> Result<TypecheckOutcome> {
        let environment = self.check_environment().await;
        if !environment.available {
            return Err(AnalysisError::Environment(environment.message));
        }

        let file = validation::ensure_swift_file(path)?;
        validation::ensure_file_size(&file, MAX_FILE_SIZE)?;

        let workdir = tempfile::Builder::new()
            .prefix("swift_typecheck_")
            .tempdir()
            .map_err(|e| AnalysisError::Internal(format!("cannot create sandbox dir: {e}")))?;

        let mut command = tokio::process::Command::new("xcrun");
        command
            .arg("swiftc")
            .arg("-typecheck")
            .arg(&file)
            .current_dir(workdir.path());

        let output = run_with_deadline(command, self.timeout).await?;
        Ok(TypecheckOutcome {
            file_path: file.display().to_string(),
            ok: true,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Typechecks with project context: builds the enclosing package with
    /// `-Xswiftc -typecheck` when a manifest exists, falling back to the
    /// per-file invocation when there is no package or the build fails.
    pub async fn typecheck_with_project_context(&self, path: &Path) -> Result<TypecheckOutcome> {
        let file = validation::ensure_swift_file(path)?;

        let Some(package_dir) = find_package_dir(&file) else {
            return self.typecheck_file(&file).await;
        };

        let environment = self.check_environment().await;
        if !environment.available {
            return Err(AnalysisError::Environment(environment.message));
        }

        let mut command = tokio::process::Command::new("xcrun");
        command
            .args(["swift", "build", "--build-tests", "-Xswiftc", "-typecheck"])
            .current_dir(&package_dir);

        match run_with_deadline(command, self.timeout).await {
            Ok(output) if output.status.success() => Ok(TypecheckOutcome {
                file_path: file.display().to_string(),
                ok: true,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            // Package builds fail for reasons unrelated to this file
            // (missing dependencies, unbuilt targets); the single-file
            // check still produces useful diagnostics.
            Ok(_) => self.typecheck_file(&file).await,
            Err(AnalysisError::Timeout(d)) => Err(AnalysisError::Timeout(d)),
            Err(_) => self.typecheck_file(&file).await,
        }
    }
}

/// Nearest ancestor directory containing `Package.swift`.
fn find_package_dir(file: &Path) -> Option<PathBuf> {
    file.parent()?
        .ancestors()
        .find(|dir| dir.join("Package.swift").is_file())
        .map(Path::to_path_buf)
}

async fn probe_environment() -> EnvironmentStatus {
    let find = tokio::process::Command::new("xcrun")
        .args(["--find", "swiftc"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();
    let find = match tokio::time::timeout(PROBE_TIMEOUT, find).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return EnvironmentStatus {
                available: false,
                message: format!("xcrun not found or Swift compiler not available: {e}"),
            };
        }
        Err(_) => {
            return EnvironmentStatus {
                available: false,
                message: "Swift compiler check timed out".to_string(),
            };
        }
    };
    if !find.status.success() {
        return EnvironmentStatus {
            available: false,
            message: "xcrun not found or Swift compiler not available".to_string(),
        };
    }

    let version = tokio::process::Command::new("xcrun")
        .args(["swiftc", "--version"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();
    match tokio::time::timeout(PROBE_TIMEOUT, version).await {
        Ok(Ok(output)) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = stdout.lines().next().unwrap_or("unknown version");
            EnvironmentStatus {
                available: true,
                message: format!("Swift compiler available: {version}"),
            }
        }
        Ok(Ok(_)) | Ok(Err(_)) => EnvironmentStatus {
            available: false,
            message: "Swift compiler not functional".to_string(),
        },
        Err(_) => EnvironmentStatus {
            available: false,
            message: "Swift compiler check timed out".to_string(),
        },
    }
}

/// Runs a command to completion within `deadline`. On expiry the subprocess
/// receives SIGTERM, then SIGKILL after a short grace.
pub(crate) async fn run_with_deadline(
    mut command: tokio::process::Command,
    deadline: Duration,
) -> Result<std::process::Output> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let child = command
        .spawn()
        .map_err(|e| AnalysisError::Environment(format!("failed to spawn compiler: {e}")))?;
    let pid = child.id().map(|id| Pid::from_raw(id as i32));

    match tokio::time::timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(AnalysisError::Build(format!("compiler IO error: {e}"))),
        Err(_) => {
            if let Some(pid) = pid {
                let _ = signal::kill(pid, Signal::SIGTERM);
                tokio::time::sleep(KILL_GRACE).await;
                let _ = signal::kill(pid, Signal::SIGKILL);
            }
            Err(AnalysisError::Timeout(deadline))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_clamped_to_the_cap() {
        let compiler = SwiftCompiler::new(Duration::from_secs(600));
        assert_eq!(compiler.timeout, MAX_TIMEOUT);
        let compiler = SwiftCompiler::new(Duration::from_secs(10));
        assert_eq!(compiler.timeout, Duration::from_secs(10));
    }

    #[test]
    fn package_dir_found_in_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Package.swift"), "// swift-tools").unwrap();
        let nested = dir.path().join("Sources/App");
        std::fs::create_dir_all(&nested).unwrap();
        let file = nested.join("Main.swift");
        std::fs::write(&file, "struct A {}").unwrap();

        assert_eq!(find_package_dir(&file).unwrap(), dir.path());

        let bare = tempfile::tempdir().unwrap();
        let loose = bare.path().join("B.swift");
        std::fs::write(&loose, "struct B {}").unwrap();
        assert!(find_package_dir(&loose).is_none());
    }

    #[tokio::test]
    async fn deadline_kills_the_subprocess() {
        let mut command = tokio::process::Command::new("sleep");
        command.arg("30");
        let started = Instant::now();
        let err = run_with_deadline(command, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
        // SIGTERM grace is 2s; the call must not take much longer than that.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn completed_command_returns_output() {
        let mut command = tokio::process::Command::new("echo");
        command.arg("diagnostics");
        let output = run_with_deadline(command, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "diagnostics");
    }
}
