//! Worker Supervisor
//!
//! Owns the long-running background workers (email dispatchers, retention
//! sweeper). Every worker loop receives a child of one root
//! `CancellationToken`; stopping cancels the root and waits for the loops
//! up to a grace deadline, aborting whatever is still running after it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker '{name}' failed to start: {reason}")]
    StartFailed { name: String, reason: String },
}

impl WorkerError {
    pub fn start_failed(name: &str, reason: impl std::fmt::Display) -> Self {
        WorkerError::StartFailed {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A supervised background worker
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Acquire resources (connections, topology); called once before `run`
    async fn start(&self) -> Result<(), WorkerError>;

    /// Main loop; returns once `shutdown` is cancelled
    async fn run(&self, shutdown: CancellationToken);

    /// Signal the worker to stop. Must be idempotent.
    async fn stop(&self) {}
}

/// Outcome of `WorkerSupervisor::stop`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub finished: usize,
    /// Workers still running at the deadline
    pub aborted: Vec<String>,
}

pub struct WorkerSupervisor {
    workers: Vec<Arc<dyn Worker>>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
    stopped: AtomicBool,
}

impl Default for WorkerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSupervisor {
    pub fn new() -> Self {
        Self {
            workers: Vec::new(),
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn add(&mut self, worker: Arc<dyn Worker>) {
        self.workers.push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Root token; cancelled by `stop`
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start every worker in order and spawn its loop
    ///
    /// If a worker fails to start, the workers already running are stopped
    /// and the error is returned.
    pub async fn start(&self) -> Result<(), WorkerError> {
        for worker in &self.workers {
            if let Err(e) = worker.start().await {
                tracing::error!(worker = worker.name(), error = %e, "Worker failed to start");
                self.stop(Duration::from_secs(5)).await;
                return Err(e);
            }

            let name = worker.name().to_string();
            let token = self.shutdown.child_token();
            let task = Arc::clone(worker);
            let handle = tokio::spawn(async move { task.run(token).await });
            self.handles.lock().await.push((name.clone(), handle));
            tracing::info!(worker = %name, "Worker started");
        }
        Ok(())
    }

    /// Signal all workers and wait for their loops, at most `grace`
    ///
    /// Idempotent: later calls return an empty report.
    pub async fn stop(&self, grace: Duration) -> StopReport {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return StopReport::default();
        }

        self.shutdown.cancel();
        for worker in &self.workers {
            worker.stop().await;
        }

        let deadline = tokio::time::Instant::now() + grace;
        let mut report = StopReport::default();
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();

        for (name, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {
                    report.finished += 1;
                    tracing::info!(worker = %name, "Worker stopped");
                }
                Ok(Err(e)) => {
                    report.finished += 1;
                    tracing::error!(worker = %name, error = %e, "Worker task failed");
                }
                Err(_) => {
                    handle.abort();
                    tracing::warn!(worker = %name, "Worker did not stop in time, aborted");
                    report.aborted.push(name);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingWorker {
        name: String,
        fail_start: bool,
        ignore_shutdown: bool,
        starts: AtomicUsize,
        stops: AtomicUsize,
        loops_done: AtomicUsize,
    }

    impl CountingWorker {
        fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Worker for CountingWorker {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self) -> Result<(), WorkerError> {
            if self.fail_start {
                return Err(WorkerError::start_failed(&self.name, "boom"));
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn run(&self, shutdown: CancellationToken) {
            if self.ignore_shutdown {
                std::future::pending::<()>().await;
            }
            shutdown.cancelled().await;
            self.loops_done.fetch_add(1, Ordering::SeqCst);
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let a = Arc::new(CountingWorker::named("a"));
        let b = Arc::new(CountingWorker::named("b"));
        let mut supervisor = WorkerSupervisor::new();
        supervisor.add(a.clone());
        supervisor.add(b.clone());

        supervisor.start().await.unwrap();
        let report = supervisor.stop(Duration::from_secs(1)).await;

        assert_eq!(report.finished, 2);
        assert!(report.aborted.is_empty());
        assert_eq!(a.loops_done.load(Ordering::SeqCst), 1);
        assert_eq!(b.stops.load(Ordering::SeqCst), 1);

        // second stop is a no-op
        let again = supervisor.stop(Duration::from_secs(1)).await;
        assert_eq!(again, StopReport::default());
        assert_eq!(b.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_start_stops_started_workers() {
        let a = Arc::new(CountingWorker::named("a"));
        let bad = Arc::new(CountingWorker {
            name: "bad".to_string(),
            fail_start: true,
            ..Default::default()
        });
        let c = Arc::new(CountingWorker::named("c"));

        let mut supervisor = WorkerSupervisor::new();
        supervisor.add(a.clone());
        supervisor.add(bad);
        supervisor.add(c.clone());

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, WorkerError::StartFailed { ref name, .. } if name == "bad"));

        assert_eq!(a.loops_done.load(Ordering::SeqCst), 1);
        assert_eq!(a.stops.load(Ordering::SeqCst), 1);
        assert_eq!(c.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_worker_is_aborted_after_grace() {
        let stuck = Arc::new(CountingWorker {
            name: "stuck".to_string(),
            ignore_shutdown: true,
            ..Default::default()
        });
        let ok = Arc::new(CountingWorker::named("ok"));

        let mut supervisor = WorkerSupervisor::new();
        supervisor.add(stuck);
        supervisor.add(ok);
        supervisor.start().await.unwrap();

        let report = supervisor.stop(Duration::from_millis(200)).await;
        assert_eq!(report.aborted, vec!["stuck".to_string()]);
        assert_eq!(report.finished, 1);
    }
}
