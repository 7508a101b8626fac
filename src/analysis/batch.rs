//! Batch executor: parallel fan-out of per-file analyses.
//!
//! Inputs are grouped by discovered project root so each group shares one
//! language-server session. Within the whole batch at most `W` per-file
//! operations run concurrently; one file's failure never aborts the rest.
//! The returned mapping is keyed by the input path strings in input order.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::Config;
use crate::error::{AnalysisError, ErrorEnvelope, Result};
use crate::validation;

use super::analyzer::FileAnalyzer;
use super::records::{FileOutcome, MultiFileAnalysis};

/// Executor sharing the analyzer's supervisor and the resolved worker cap.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    analyzer: FileAnalyzer,
    config: Arc<Config>,
}

impl BatchExecutor {
    /// Creates an executor over the given analyzer.
    pub fn new(analyzer: FileAnalyzer, config: Arc<Config>) -> Self {
        Self { analyzer, config }
    }

    /// Analyzes every path, aggregating per-file outcomes.
    pub async fn analyze_many(&self, paths: &[String]) -> Result<MultiFileAnalysis> {
        if paths.is_empty() {
            return Err(AnalysisError::Validation("no files provided".to_string()));
        }

        let workers = self.config.batch_worker_cap(paths.len());
        let semaphore = Arc::new(tokio::sync::Semaphore::new(workers));

        // Validate up front; invalid entries become outcomes without ever
        // touching a session.
        let mut prevalidated: Vec<(String, std::result::Result<PathBuf, AnalysisError>)> = paths
            .iter()
            .map(|raw| {
                let checked = validation::ensure_swift_file(std::path::Path::new(raw));
                (raw.clone(), checked)
            })
            .collect();

        // Warm one session per distinct project root so group members share
        // it instead of racing to create their own.
        let mut warmed = std::collections::HashSet::new();
        for (_, checked) in &prevalidated {
            if let Ok(file) = checked {
                if let Ok(root) = self.analyzer.supervisor().locator().discover(file) {
                    if warmed.insert(root.path.clone()) {
                        let _ = self.analyzer.supervisor().acquire(&root).await;
                    }
                }
            }
        }

        let tasks = prevalidated.drain(..).map(|(raw, checked)| {
            let analyzer = self.analyzer.clone();
            let semaphore = Arc::clone(&semaphore);
            async move {
                let outcome = match checked {
                    Err(err) => FileOutcome::Err(ErrorEnvelope::from(&err)),
                    Ok(file) => {
                        let _permit = semaphore.acquire().await.expect("semaphore closed");
                        match analyzer.analyze_file_symbols(&file).await {
                            Ok(symbols) => FileOutcome::Ok(symbols),
                            Err(err) => FileOutcome::Err(ErrorEnvelope::from(&err)),
                        }
                    }
                };
                (raw, outcome)
            }
        });

        let outcomes = futures::future::join_all(tasks).await;

        let mut files: IndexMap<String, FileOutcome> = IndexMap::with_capacity(outcomes.len());
        let mut total_symbols = 0;
        for (raw, outcome) in outcomes {
            total_symbols += outcome.symbol_count();
            files.insert(raw, outcome);
        }

        Ok(MultiFileAnalysis {
            total_files: files.len(),
            total_symbols,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::supervisor::ServerSupervisor;

    fn executor() -> BatchExecutor {
        let config = Arc::new(Config {
            // Point at a server that cannot spawn so no subprocess is needed.
            lsp_server: Some(PathBuf::from("/nonexistent/sourcekit-lsp")),
            ..Config::default()
        });
        let supervisor = ServerSupervisor::new(Arc::clone(&config));
        BatchExecutor::new(FileAnalyzer::new(supervisor), config)
    }

    #[tokio::test]
    async fn empty_batch_is_a_validation_error() {
        let err = executor().analyze_many(&[]).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn invalid_entries_keep_their_slot_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let not_swift = dir.path().join("main.rs");
        std::fs::write(&not_swift, "fn main() {}").unwrap();

        let inputs = vec![
            "/definitely/missing/A.swift".to_string(),
            not_swift.display().to_string(),
            "/also/missing/B.swift".to_string(),
        ];
        let analysis = executor().analyze_many(&inputs).await.unwrap();

        assert_eq!(analysis.total_files, 3);
        assert_eq!(analysis.total_symbols, 0);
        let keys: Vec<_> = analysis.files.keys().cloned().collect();
        assert_eq!(keys, inputs);

        let kinds: Vec<String> = analysis
            .files
            .values()
            .map(|outcome| match outcome {
                FileOutcome::Err(envelope) => envelope.kind.clone(),
                FileOutcome::Ok(_) => "ok".to_string(),
            })
            .collect();
        assert_eq!(kinds, vec!["file-not-found", "not-swift-file", "file-not-found"]);
    }

    #[tokio::test]
    async fn unreachable_server_yields_environment_outcomes_not_a_batch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Thing.swift");
        std::fs::write(&file, "struct Thing {}\n").unwrap();

        let inputs = vec![file.display().to_string()];
        let analysis = executor().analyze_many(&inputs).await.unwrap();

        assert_eq!(analysis.total_files, 1);
        match &analysis.files[0] {
            FileOutcome::Err(envelope) => assert_eq!(envelope.kind, "environment"),
            FileOutcome::Ok(_) => panic!("spawn cannot succeed in this test"),
        }
    }
}
