//! Environment-driven configuration.
//!
//! All knobs have defaults and can be overridden through `SWIFTLENS_*`
//! environment variables; command-line flags parsed in `main` take precedence
//! over both. The resolved [`Config`] is constructed once at startup and
//! passed explicitly to the components that need it.

use std::path::PathBuf;
use std::time::Duration;

/// Default path of the telemetry database.
pub const DEFAULT_DB_PATH: &str = "dashboard_logs.db";

/// Default port handed to the external dashboard collaborator.
pub const DEFAULT_DASHBOARD_PORT: u16 = 53729;

/// Resolved configuration for the analysis pipeline and telemetry sink.
#[derive(Debug, Clone)]
pub struct Config {
    /// Override for the language-server executable; `sourcekit-lsp` from
    /// `PATH` (or via `xcrun`) when absent.
    pub lsp_server: Option<PathBuf>,
    /// Cap on concurrent per-file operations in a batch. `None` means
    /// `min(8, batch size)`.
    pub batch_workers: Option<usize>,
    /// Telemetry database file.
    pub db_path: PathBuf,
    /// Port for the dashboard collaborator.
    pub dashboard_port: u16,
    /// Deadline for ordinary LSP requests.
    pub request_timeout: Duration,
    /// Deadline for quick LSP requests (hover).
    pub quick_timeout: Duration,
    /// Deadline for heavy LSP requests (document symbols, references).
    pub heavy_timeout: Duration,
    /// Deadline for the initialize handshake. Generous because the server
    /// warms up its index on first launch.
    pub init_timeout: Duration,
    /// Idle time after which a language-server session is reaped.
    pub session_idle_timeout: Duration,
    /// Consecutive request timeouts before a session is restarted.
    pub max_consecutive_timeouts: u32,
    /// Telemetry retention window in days.
    pub log_retention_days: u32,
    /// Telemetry connection pool size (capped at 10).
    pub pool_size: usize,
    /// Telemetry queue capacity; the producer never blocks.
    pub queue_capacity: usize,
    /// Per-observer send deadline for live fan-out.
    pub observer_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lsp_server: None,
            batch_workers: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            dashboard_port: DEFAULT_DASHBOARD_PORT,
            request_timeout: Duration::from_secs(30),
            quick_timeout: Duration::from_secs(15),
            heavy_timeout: Duration::from_secs(120),
            init_timeout: Duration::from_secs(60),
            session_idle_timeout: Duration::from_secs(300),
            max_consecutive_timeouts: 3,
            log_retention_days: 30,
            pool_size: 5,
            queue_capacity: 10_000,
            observer_timeout: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Builds a configuration from the process environment.
    ///
    /// Unparseable values fall back to the default rather than failing
    /// startup; the offending variable is logged.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(path) = env_var("SWIFTLENS_LSP_SERVER") {
            config.lsp_server = Some(PathBuf::from(path));
        }
        if let Some(workers) = parse_env("SWIFTLENS_BATCH_WORKERS") {
            config.batch_workers = Some(workers);
        }
        if let Some(path) = env_var("SWIFTLENS_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(port) = parse_env("SWIFTLENS_DASHBOARD_PORT") {
            config.dashboard_port = port;
        }
        if let Some(secs) = parse_env("SWIFTLENS_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env("SWIFTLENS_INIT_TIMEOUT_SECS") {
            config.init_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env("SWIFTLENS_SESSION_IDLE_SECS") {
            config.session_idle_timeout = Duration::from_secs(secs);
        }
        if let Some(days) = parse_env("SWIFTLENS_LOG_RETENTION_DAYS") {
            config.log_retention_days = days;
        }
        if let Some(size) = parse_env::<usize>("SWIFTLENS_POOL_SIZE") {
            config.pool_size = size.min(10);
        }

        config
    }

    /// Effective worker cap for a batch of `batch_len` files.
    pub fn batch_worker_cap(&self, batch_len: usize) -> usize {
        self.batch_workers
            .unwrap_or_else(|| batch_len.min(8))
            .max(1)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_var(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
