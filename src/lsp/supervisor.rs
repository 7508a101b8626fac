//! Language-server session supervisor.
//!
//! Owns at most one [`ServerSession`] per project root. Sessions are created
//! lazily on first acquire, shared by every concurrent caller on the same
//! root, replaced when flagged unhealthy, reaped after sitting idle, and
//! drained in parallel on shutdown. Sessions never hold a strong reference
//! back to the supervisor; retirement always goes through the owner's map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::project::{ProjectLocator, ProjectRoot};

use super::client::LspClient;

/// How often the reaper looks for idle sessions.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// One initialized language-server subprocess scoped to a project root.
#[derive(Debug)]
pub struct ServerSession {
    root: PathBuf,
    client: LspClient,
    last_used: StdMutex<Instant>,
}

impl ServerSession {
    /// The LSP client bound to this session.
    pub fn client(&self) -> &LspClient {
        &self.client
    }

    /// Project root this session serves.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().unwrap().elapsed()
    }
}

/// Supervisor owning every language-server session in the process.
#[derive(Debug)]
pub struct ServerSupervisor {
    config: Arc<Config>,
    locator: Arc<ProjectLocator>,
    sessions: Mutex<HashMap<PathBuf, Arc<ServerSession>>>,
    reaper: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ServerSupervisor {
    /// Creates a supervisor and starts its idle-session reaper.
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        let supervisor = Arc::new(Self {
            config,
            locator: Arc::new(ProjectLocator::new()),
            sessions: Mutex::new(HashMap::new()),
            reaper: StdMutex::new(None),
        });

        let weak = Arc::downgrade(&supervisor);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(REAP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(supervisor) = weak.upgrade() else {
                    break;
                };
                supervisor.reap_idle_sessions().await;
            }
        });
        *supervisor.reaper.lock().unwrap() = Some(handle);

        supervisor
    }

    /// Shared project locator (discovery results are memoized here).
    pub fn locator(&self) -> &ProjectLocator {
        &self.locator
    }

    /// Returns the session for `root`, creating it if necessary. All
    /// concurrent callers on the same root get the same session; a session
    /// flagged unhealthy is replaced before being handed out.
    pub async fn acquire(&self, root: &ProjectRoot) -> Result<Arc<ServerSession>> {
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(&root.path) {
            if session.client().needs_restart() {
                tracing::info!(root = %root.path.display(), "replacing unhealthy session");
                let stale = sessions.remove(&root.path);
                drop_session_in_background(stale);
            } else {
                session.touch();
                return Ok(Arc::clone(session));
            }
        }

        // The map lock is held across creation on purpose: a second caller
        // for the same root must wait rather than spawn a duplicate server.
        let session = Arc::new(self.create_session(root).await?);
        sessions.insert(root.path.clone(), Arc::clone(&session));
        Ok(session)
    }

    /// Drops the session for `root`, if any. In-flight operations observe
    /// session-lost from the client; the subprocess is shut down in the
    /// background.
    pub async fn invalidate(&self, root: &Path) {
        let stale = self.sessions.lock().await.remove(root);
        if stale.is_some() {
            tracing::info!(root = %root.display(), "session invalidated");
        }
        drop_session_in_background(stale);
    }

    /// Drains every session in parallel and stops the reaper.
    pub async fn shutdown_all(&self) {
        if let Some(handle) = self.reaper.lock().unwrap().take() {
            handle.abort();
        }

        let sessions: Vec<Arc<ServerSession>> =
            self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        futures::future::join_all(
            sessions
                .iter()
                .map(|session| async move { session.client().shutdown().await }),
        )
        .await;
    }

    /// Number of live sessions. Test hook.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn create_session(&self, root: &ProjectRoot) -> Result<ServerSession> {
        let (command, args) = self.resolve_server_command();
        tracing::info!(
            root = %root.path.display(),
            kind = root.kind.as_str(),
            command = %command.display(),
            "starting language server"
        );

        let client = LspClient::builder()
            .server_command(command)
            .server_args(args)
            .workspace_root(&root.path)
            .init_timeout(self.config.init_timeout)
            .request_timeout(self.config.request_timeout)
            .quick_timeout(self.config.quick_timeout)
            .heavy_timeout(self.config.heavy_timeout)
            .build()
            .await?;

        Ok(ServerSession {
            root: root.path.clone(),
            client,
            last_used: StdMutex::new(Instant::now()),
        })
    }

    /// Resolution order: configured override, `sourcekit-lsp` on `PATH`,
    /// then `xcrun sourcekit-lsp` as the toolchain locator fallback.
    fn resolve_server_command(&self) -> (PathBuf, Vec<String>) {
        if let Some(path) = &self.config.lsp_server {
            return (path.clone(), Vec::new());
        }
        if let Ok(path) = which::which("sourcekit-lsp") {
            return (path, Vec::new());
        }
        (
            PathBuf::from("xcrun"),
            vec!["sourcekit-lsp".to_string()],
        )
    }

    async fn reap_idle_sessions(&self) {
        let idle_timeout = self.config.session_idle_timeout;
        let mut stale = Vec::new();
        {
            let mut sessions = self.sessions.lock().await;
            let expired: Vec<PathBuf> = sessions
                .iter()
                .filter(|(_, session)| session.idle_for() > idle_timeout)
                .map(|(root, _)| root.clone())
                .collect();
            for root in expired {
                tracing::info!(root = %root.display(), "reaping idle session");
                if let Some(session) = sessions.remove(&root) {
                    stale.push(session);
                }
            }
        }
        for session in stale {
            session.client().shutdown().await;
        }
    }
}

fn drop_session_in_background(session: Option<Arc<ServerSession>>) {
    if let Some(session) = session {
        tokio::spawn(async move {
            session.client().shutdown().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectKind;

    fn bare_root(dir: &Path) -> ProjectRoot {
        ProjectRoot {
            path: dir.to_path_buf(),
            kind: ProjectKind::None,
            discovered_from: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn acquire_on_missing_server_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            lsp_server: Some(PathBuf::from("/nonexistent/sourcekit-lsp")),
            ..Config::default()
        };
        let supervisor = ServerSupervisor::new(Arc::new(config));

        let err = supervisor
            .acquire(&bare_root(dir.path()))
            .await
            .expect_err("spawn must fail");
        assert_eq!(err.kind(), "environment");
        // No half-open session may be left behind.
        assert_eq!(supervisor.session_count().await, 0);
    }

    #[tokio::test]
    async fn invalidate_is_a_noop_without_session() {
        let supervisor = ServerSupervisor::new(Arc::new(Config::default()));
        supervisor.invalidate(Path::new("/nowhere")).await;
        assert_eq!(supervisor.session_count().await, 0);
    }

    #[test]
    fn server_command_prefers_override() {
        let config = Config {
            lsp_server: Some(PathBuf::from("/custom/lsp")),
            ..Config::default()
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let supervisor = runtime.block_on(async { ServerSupervisor::new(Arc::new(config)) });
        let (command, args) = supervisor.resolve_server_command();
        assert_eq!(command, PathBuf::from("/custom/lsp"));
        assert!(args.is_empty());
    }
}
