//! Long-lived holder of the most recent complete analysis.
//!
//! Runs execute on tokio's blocking pool, one at a time. Each successful run
//! replaces the published [`Snapshot`] in one step, so readers observe either
//! the previous complete result or the new one. The blocking task owns the
//! run lock, so an abandoned run still finishes before the next one starts.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::analyze::AnalyzeStats;
use crate::error::CovlensError;
use crate::pipeline::CoveragePipeline;
use crate::types::AnalysisResult;

/// An immutable, published analysis result.
#[derive(Debug)]
pub struct Snapshot {
    /// Starts at 1 and increases with every successful run.
    pub version: u64,
    pub completed_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

#[derive(Debug)]
pub struct CoverageSession {
    pipeline: Arc<CoveragePipeline>,
    run_lock: Arc<Mutex<()>>,
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl CoverageSession {
    pub fn new(pipeline: CoveragePipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            run_lock: Arc::new(Mutex::new(())),
            current: RwLock::new(None),
        }
    }

    pub fn pipeline(&self) -> &CoveragePipeline {
        &self.pipeline
    }

    /// Latest published snapshot, if any run has completed.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run a full analysis and publish it.
    ///
    /// Concurrent calls are serialised. On error or cancellation the previous
    /// snapshot stays current. Dropping the returned future cancels the run.
    #[instrument(skip_all, name = "session_run")]
    pub async fn run(
        &self,
        token: CancellationToken,
    ) -> crate::error::Result<(Arc<Snapshot>, AnalyzeStats)> {
        let guard = Arc::clone(&self.run_lock).lock_owned().await;

        let pipeline = Arc::clone(&self.pipeline);
        let task_token = token.child_token();
        let _cancel_on_drop = task_token.clone().drop_guard();
        // The guard comes back with the result and is held until publication.
        let (run, _guard) =
            tokio::task::spawn_blocking(move || (pipeline.analyze(&task_token), guard))
                .await
                .map_err(|e| {
                    warn!(error = %e, "Analysis task failed");
                    CovlensError::Io(std::io::Error::other(e.to_string()))
                })?;
        let run = run?;

        if token.is_cancelled() {
            return Err(CovlensError::Cancelled);
        }

        let version = self.current().map_or(1, |s| s.version + 1);
        let snapshot = Arc::new(Snapshot {
            version,
            completed_at: run.completed_at,
            result: run.result,
        });
        match self.current.write() {
            Ok(mut guard) => *guard = Some(Arc::clone(&snapshot)),
            Err(poisoned) => *poisoned.into_inner() = Some(Arc::clone(&snapshot)),
        }
        info!(version, units = snapshot.result.len(), "Snapshot published");
        Ok((snapshot, run.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CovlensConfig;
    use crate::exec::ExecDataWriter;
    use crate::progress::ProgressReporter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn session_with_exec(dir: &std::path::Path, exec: &[u8]) -> CoverageSession {
        let mut config = CovlensConfig::default();
        config.analysis.exec_file = Some("run.exec".into());
        std::fs::write(dir.join("run.exec"), exec).unwrap();
        CoverageSession::new(CoveragePipeline::with_config(dir, config))
    }

    fn empty_exec() -> Vec<u8> {
        let mut writer = ExecDataWriter::new(Vec::new()).unwrap();
        writer.flush().unwrap();
        writer.into_inner()
    }

    #[tokio::test]
    async fn successful_runs_bump_the_version() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_exec(dir.path(), &empty_exec());
        assert!(session.current().is_none());

        let (first, _) = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(first.version, 1);
        let (second, _) = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(session.current().unwrap().version, 2);
    }

    #[tokio::test]
    async fn failed_run_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_exec(dir.path(), &empty_exec());
        session.run(CancellationToken::new()).await.unwrap();

        std::fs::write(dir.path().join("run.exec"), [0x01, 0x00]).unwrap();
        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CovlensError::RecordLoad(_)));
        assert_eq!(session.current().unwrap().version, 1);
    }

    #[tokio::test]
    async fn cancelled_run_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.class"), b"").unwrap();
        let session = session_with_exec(dir.path(), &empty_exec());
        let token = CancellationToken::new();
        token.cancel();
        let err = session.run(token).await.unwrap_err();
        assert!(matches!(err, CovlensError::Cancelled));
        assert!(session.current().is_none());
    }

    /// Reporter whose `start` lingers, tracking how many runs are inside the analyzer.
    #[derive(Default)]
    struct SlowStart {
        active: AtomicUsize,
        peak: AtomicUsize,
        started: Notify,
    }

    impl ProgressReporter for SlowStart {
        fn start(&self, _task: &str, _total: Option<u64>) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.started.notify_one();
            std::thread::sleep(Duration::from_millis(100));
        }

        fn advance(&self, _amount: u64) {}

        fn finish(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn abandoned_run_finishes_before_the_next_starts() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Arc::new(SlowStart::default());
        let mut config = CovlensConfig::default();
        config.analysis.exec_file = Some("run.exec".into());
        std::fs::write(dir.path().join("run.exec"), empty_exec()).unwrap();
        let pipeline = CoveragePipeline::with_config(dir.path(), config)
            .with_progress(Arc::clone(&reporter) as Arc<dyn ProgressReporter>);
        let session = Arc::new(CoverageSession::new(pipeline));

        let abandoned = tokio::spawn({
            let s = Arc::clone(&session);
            async move { s.run(CancellationToken::new()).await.map(|(s, _)| s.version) }
        });
        reporter.started.notified().await;
        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());

        let (snapshot, _) = session.run(CancellationToken::new()).await.unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(reporter.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_runs_are_serialised() {
        let dir = tempfile::tempdir().unwrap();
        let session = Arc::new(session_with_exec(dir.path(), &empty_exec()));
        let a = tokio::spawn({
            let s = Arc::clone(&session);
            async move { s.run(CancellationToken::new()).await.map(|(s, _)| s.version) }
        });
        let b = tokio::spawn({
            let s = Arc::clone(&session);
            async move { s.run(CancellationToken::new()).await.map(|(s, _)| s.version) }
        });
        let mut versions = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2]);
    }
}
