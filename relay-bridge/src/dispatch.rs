//! Bounded-concurrency request dispatch.
//!
//! Submitted requests are executed by a fixed set of worker tasks; each
//! completed request lands on an unbounded delivery queue as a
//! `RequestResult`. Submission never blocks: past pool capacity, new
//! work queues behind running work. Results arrive in completion order,
//! not submission order, so a fast request submitted after a slow one
//! may be delivered first.

use crate::backend::{BackendClient, OutboundRequest, Outcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Submission error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatcher is shut down")]
    ShutDown,
}

/// A completed request with its routing context.
///
/// Carries the originating session and sender keys so the delivery
/// stage can route the reply without re-deriving them, and the
/// conversation key so cache mutations hit the binding the request
/// was actually built from.
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub request_id: String,
    pub session_key: String,
    pub sender_key: String,
    pub conversation_key: String,
    pub outcome: Outcome,
}

struct Job {
    request: OutboundRequest,
    session_key: String,
    sender_key: String,
}

/// Fixed worker pool with an unbounded delivery queue.
pub struct RequestDispatcher {
    jobs: Option<mpsc::UnboundedSender<Job>>,
    results: mpsc::UnboundedReceiver<RequestResult>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl RequestDispatcher {
    /// Spawn `workers` request workers sharing one job queue.
    ///
    /// Must be called from within a runtime. A worker count of zero is
    /// clamped to one.
    pub fn new(workers: usize, backend: Arc<BackendClient>) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        let job_rx = Arc::new(Mutex::new(job_rx));
        let count = workers.max(1);
        let handles = (0..count)
            .map(|worker_id| {
                let jobs = Arc::clone(&job_rx);
                let results = result_tx.clone();
                let backend = Arc::clone(&backend);
                tokio::spawn(worker_loop(worker_id, jobs, results, backend))
            })
            .collect();

        Self {
            jobs: Some(job_tx),
            results: result_rx,
            workers: handles,
        }
    }

    /// Enqueue a request for execution. Returns immediately.
    ///
    /// Fails only after `shutdown`; queue growth is otherwise unbounded
    /// and backpressure is implicit in the pool draining it.
    pub fn submit(
        &self,
        request: OutboundRequest,
        session_key: &str,
        sender_key: &str,
    ) -> Result<(), DispatchError> {
        let Some(jobs) = self.jobs.as_ref() else {
            return Err(DispatchError::ShutDown);
        };
        let job = Job {
            request,
            session_key: session_key.to_string(),
            sender_key: sender_key.to_string(),
        };
        jobs.send(job).map_err(|_| DispatchError::ShutDown)
    }

    /// Wait up to `timeout` for one completed result.
    ///
    /// A zero timeout still drains an already-delivered result, so this
    /// doubles as a non-blocking poll.
    pub async fn poll(&mut self, timeout: Duration) -> Option<RequestResult> {
        tokio::time::timeout(timeout, self.results.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for the next completed result, however long it takes.
    ///
    /// Returns `None` only once every worker has exited and the queue
    /// is drained.
    pub async fn recv(&mut self) -> Option<RequestResult> {
        self.results.recv().await
    }

    /// Stop accepting submissions.
    ///
    /// With `wait`, blocks until the workers have drained every queued
    /// job; their results stay available via `poll`. Without it, the
    /// workers are detached and finish in the background.
    pub async fn shutdown(&mut self, wait: bool) {
        self.jobs = None;
        if wait {
            for handle in self.workers.drain(..) {
                let _ = handle.await;
            }
        } else {
            self.workers.clear();
        }
    }

    /// True once `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.jobs.is_none()
    }
}

/// One worker: pull a job, execute it, deliver the result.
///
/// The receiver lock is only held while waiting for a job, never while
/// executing one, so slow requests occupy a worker slot but leave the
/// queue reachable for the rest of the pool.
async fn worker_loop(
    worker_id: usize,
    jobs: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    results: mpsc::UnboundedSender<RequestResult>,
    backend: Arc<BackendClient>,
) {
    tracing::debug!(worker_id, "Request worker started");

    loop {
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };

        let outcome = backend.execute(&job.request).await;

        tracing::debug!(
            worker_id,
            request_id = %job.request.request_id,
            success = outcome.is_success(),
            status = ?outcome.status(),
            "Request completed"
        );

        let result = RequestResult {
            request_id: job.request.request_id.clone(),
            session_key: job.session_key,
            sender_key: job.sender_key,
            conversation_key: job.request.conversation_key.clone(),
            outcome,
        };

        if results.send(result).is_err() {
            break;
        }
    }

    tracing::debug!(worker_id, "Request worker stopped");
}

// ============================================================================
// Tests
// ============================================================================
