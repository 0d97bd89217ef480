//! Bounded worker pool with panic isolation and adaptive timeouts.
//!
//! Submission is non-blocking by default and reports queue saturation to the
//! caller. Each task runs under its own deadline; a panicking task is
//! converted into a failed result and the pool keeps serving.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sitepulse_common::error::SitepulseError;

use crate::metrics::EngineMetrics;

/// One unit of work: an identified URL plus the future that processes it,
/// bounded by a per-task deadline.
pub struct TaskSpec<P> {
    pub id: String,
    pub url: String,
    pub timeout: Duration,
    pub work: BoxFuture<'static, anyhow::Result<P>>,
}

impl<P> TaskSpec<P> {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
        work: BoxFuture<'static, anyhow::Result<P>>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            timeout,
            work,
        }
    }
}

/// Outcome record published for every task the pool accepted.
#[derive(Debug)]
pub struct TaskResult<P> {
    pub task_id: String,
    pub url: String,
    pub success: bool,
    pub payload: Option<P>,
    pub error: Option<String>,
    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
}

pub struct TaskEngine<P> {
    tx: mpsc::Sender<TaskSpec<P>>,
    cancel: CancellationToken,
    metrics: Arc<EngineMetrics>,
    workers: Vec<JoinHandle<()>>,
}

impl<P: Send + 'static> TaskEngine<P> {
    /// Start `workers` workers over a queue of `queue_capacity`. Returns the
    /// engine and the result stream; results stop when the engine shuts
    /// down and all workers have drained.
    pub fn start(workers: usize, queue_capacity: usize) -> (Self, mpsc::Receiver<TaskResult<P>>) {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<TaskSpec<P>>(queue_capacity.max(1));
        let (results_tx, results_rx) = mpsc::channel::<TaskResult<P>>(queue_capacity.max(1) * 2);
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();
        let metrics = Arc::new(EngineMetrics::default());

        let handles = (0..workers)
            .map(|worker_id| {
                let rx = rx.clone();
                let results_tx = results_tx.clone();
                let cancel = cancel.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, rx, results_tx, cancel, metrics).await;
                })
            })
            .collect();

        (
            Self {
                tx,
                cancel,
                metrics,
                workers: handles,
            },
            results_rx,
        )
    }

    /// Non-blocking submission. Returns `QueueFull` when the queue is
    /// saturated; the caller decides whether to drop or block.
    pub fn submit(&self, spec: TaskSpec<P>) -> Result<(), SitepulseError> {
        self.metrics.record_submitted();
        match self.tx.try_send(spec) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_rejected();
                Err(SitepulseError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.record_rejected();
                Err(SitepulseError::Network("task queue closed".into()))
            }
        }
    }

    /// Blocking submission with a caller-supplied patience budget.
    pub async fn submit_timeout(
        &self,
        spec: TaskSpec<P>,
        wait: Duration,
    ) -> Result<(), SitepulseError> {
        self.metrics.record_submitted();
        match self.tx.send_timeout(spec, wait).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                self.metrics.record_rejected();
                Err(SitepulseError::QueueFull)
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                self.metrics.record_rejected();
                Err(SitepulseError::Network("task queue closed".into()))
            }
        }
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Graceful shutdown: stop accepting work, signal cancellation, wait for
    /// workers up to `grace`, then abort whatever remains.
    pub async fn shutdown(self, grace: Duration) {
        drop(self.tx);
        self.cancel.cancel();
        let join_all = futures::future::join_all(self.workers);
        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!("Engine shutdown grace period elapsed with workers still running");
        }
    }

    /// Wait for every queued task to finish without cancelling anything.
    /// Used at the natural end of a run.
    pub async fn drain(self) {
        drop(self.tx);
        futures::future::join_all(self.workers).await;
    }
}

async fn worker_loop<P: Send + 'static>(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<TaskSpec<P>>>>,
    results_tx: mpsc::Sender<TaskResult<P>>,
    cancel: CancellationToken,
    metrics: Arc<EngineMetrics>,
) {
    loop {
        let spec = {
            let mut rx = rx.lock().await;
            tokio::select! {
                spec = rx.recv() => spec,
                _ = cancel.cancelled() => None,
            }
        };
        let Some(spec) = spec else {
            debug!(worker_id, "Worker stopping");
            return;
        };

        let started = Instant::now();
        let task_id = spec.id;
        let url = spec.url;
        let deadline = spec.timeout;

        // Panic isolation first, deadline second: a panicking or overrunning
        // task becomes a failed result, never a dead worker.
        let outcome = tokio::time::timeout(
            deadline,
            std::panic::AssertUnwindSafe(spec.work).catch_unwind(),
        )
        .await;

        let duration = started.elapsed();
        let (success, payload, error) = match outcome {
            Err(_) => (
                false,
                None,
                Some(format!("task timed out after {}s", deadline.as_secs())),
            ),
            Ok(Err(panic)) => (false, None, Some(format!("panic: {}", panic_message(&panic)))),
            Ok(Ok(Err(e))) => (false, None, Some(format!("{e:#}"))),
            Ok(Ok(Ok(payload))) => (true, Some(payload), None),
        };

        metrics.record_finished(success, duration);

        let result = TaskResult {
            task_id,
            url,
            success,
            payload,
            error,
            duration,
            completed_at: Utc::now(),
        };

        publish(&results_tx, &cancel, result).await;
    }
}

/// Best-effort result publication: try the queue, and if it is full wait
/// until either the send succeeds or shutdown begins. Never blocks past
/// cancellation, never panics on a closed channel.
async fn publish<P>(
    results_tx: &mpsc::Sender<TaskResult<P>>,
    cancel: &CancellationToken,
    result: TaskResult<P>,
) {
    match results_tx.try_send(result) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Closed(result)) => {
            warn!(task_id = %result.task_id, "Result queue closed, dropping result");
        }
        Err(mpsc::error::TrySendError::Full(result)) => {
            let task_id = result.task_id.clone();
            tokio::select! {
                sent = results_tx.send(result) => {
                    if sent.is_err() {
                        warn!(%task_id, "Result queue closed, dropping result");
                    }
                }
                _ = cancel.cancelled() => {
                    warn!(%task_id, "Shutdown in progress, dropping result");
                }
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_task(id: &str, value: u32) -> TaskSpec<u32> {
        TaskSpec::new(
            id,
            format!("https://a.test/{id}"),
            Duration::from_secs(5),
            async move { Ok(value) }.boxed(),
        )
    }

    #[tokio::test]
    async fn tasks_complete_and_account() {
        let (engine, mut results) = TaskEngine::start(4, 16);
        for i in 0..8u32 {
            engine.submit(ok_task(&format!("t{i}"), i)).unwrap();
        }
        let metrics = engine.metrics();
        let mut payloads = Vec::new();
        engine.drain().await;
        while let Some(r) = results.recv().await {
            assert!(r.success);
            payloads.push(r.payload.unwrap());
        }
        payloads.sort_unstable();
        assert_eq!(payloads, (0..8).collect::<Vec<_>>());

        let s = metrics.snapshot();
        assert_eq!(s.submitted, 8);
        assert_eq!(s.completed, 8);
        assert_eq!(s.failed, 0);
        assert_eq!(s.in_flight, 0);
        assert_eq!(s.submitted, s.completed + s.failed + s.in_flight + s.rejected);
    }

    #[tokio::test]
    async fn panic_is_isolated_and_pool_survives() {
        let (engine, mut results) = TaskEngine::start(1, 8);
        engine
            .submit(TaskSpec::new(
                "boom",
                "https://a.test/boom",
                Duration::from_secs(5),
                async { panic!("kaboom") }.boxed(),
            ))
            .unwrap();
        // The pool must still accept and run work after the panic.
        engine.submit(ok_task("after", 7)).unwrap();

        let metrics = engine.metrics();
        engine.drain().await;

        let first = results.recv().await.unwrap();
        assert!(!first.success);
        assert!(first.error.as_deref().unwrap().contains("panic: kaboom"));

        let second = results.recv().await.unwrap();
        assert!(second.success);
        assert_eq!(second.payload, Some(7));

        let s = metrics.snapshot();
        assert_eq!(s.completed, 1);
        assert_eq!(s.failed, 1);
    }

    #[tokio::test]
    async fn timeout_converts_to_failure() {
        let (engine, mut results) = TaskEngine::start(1, 8);
        engine
            .submit(TaskSpec::new(
                "slow",
                "https://a.test/slow",
                Duration::from_millis(50),
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(1u32)
                }
                .boxed(),
            ))
            .unwrap();
        engine.drain().await;

        let r = results.recv().await.unwrap();
        assert!(!r.success);
        assert!(r.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn saturated_queue_rejects() {
        let (engine, _results) = TaskEngine::start(1, 1);
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupy the single worker...
        engine
            .submit(TaskSpec::new(
                "block",
                "https://a.test/block",
                Duration::from_secs(5),
                async move {
                    let _ = gate_rx.await;
                    Ok(0u32)
                }
                .boxed(),
            ))
            .unwrap();
        // ...let it start, then fill the queue slot.
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.submit(ok_task("queued", 1)).unwrap();

        // Queue full now.
        let err = engine.submit(ok_task("rejected", 2)).unwrap_err();
        assert!(matches!(err, SitepulseError::QueueFull));

        let s = engine.metrics().snapshot();
        assert_eq!(s.submitted, 3);
        assert_eq!(s.rejected, 1);

        let _ = gate_tx.send(());
        engine.drain().await;
    }

    #[tokio::test]
    async fn shutdown_stops_workers() {
        let (engine, mut results) = TaskEngine::start(2, 8);
        engine.submit(ok_task("t", 1)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.shutdown(Duration::from_secs(5)).await;
        // The completed result is still observable after shutdown.
        let r = results.recv().await.unwrap();
        assert!(r.success);
        assert!(results.recv().await.is_none());
    }
}
