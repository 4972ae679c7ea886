/*!
 * Serial translation queue.
 *
 * Every provider call goes through this queue. A single worker drains an
 * unbounded FIFO: it waits for the rate limiter, runs one task at a time under
 * a request timeout and hands the result back to the caller.
 *
 * When the provider signals that its quota is exhausted, the worker keeps the
 * task, sleeps for a cooldown and runs it again before looking at the next
 * task. The total cooldown a task may accumulate is bounded; past the bound
 * the caller gets `TranslationError::ServiceUnavailable`. Any other provider
 * failure is returned to the caller after a single attempt.
 */

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, error, trace, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::app_config::PipelineConfig;
use crate::errors::{ProviderError, TranslationError};
use crate::translation::cache::CacheKey;
use crate::translation::rate_limiter::SlidingWindowLimiter;

/// Future produced by a task's `execute` closure
pub type TaskFuture = BoxFuture<'static, Result<String, ProviderError>>;

/// Re-runnable provider call; invoked once per attempt
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Callback invoked with the attempt number when a task hits the provider quota
pub type QuotaWaitFn = Arc<dyn Fn(u32) + Send + Sync>;

/// Lifecycle of a queued task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Enqueued,
    Admitted,
    Executing,
    RetryScheduled,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Enqueued => "enqueued",
            TaskState::Admitted => "admitted",
            TaskState::Executing => "executing",
            TaskState::RetryScheduled => "retry-scheduled",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A unit of work for the queue
pub struct QueuedTask {
    pub key: CacheKey,
    execute: TaskFn,
    pub enqueued_at: Instant,
    on_quota_wait: Option<QuotaWaitFn>,
}

impl fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("key", &self.key)
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}

impl QueuedTask {
    pub fn new<F>(key: CacheKey, execute: F) -> Self
    where
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        Self {
            key,
            execute: Arc::new(execute),
            enqueued_at: Instant::now(),
            on_quota_wait: None,
        }
    }

    /// Be told when the task starts waiting on the provider quota
    pub fn on_quota_wait<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.on_quota_wait = Some(Arc::new(callback));
        self
    }
}

/// Retry and timeout policy of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub retry_cooldown: Duration,
    pub max_quota_wait: Duration,
    pub request_timeout: Duration,
}

impl From<&PipelineConfig> for QueuePolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            retry_cooldown: config.retry_cooldown(),
            max_quota_wait: config.max_quota_wait(),
            request_timeout: config.request_timeout(),
        }
    }
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

struct Envelope {
    task: QueuedTask,
    responder: oneshot::Sender<Result<String, TranslationError>>,
}

#[derive(Debug, Default)]
struct QueueMetrics {
    depth: AtomicUsize,
    executing: AtomicBool,
    completed: AtomicUsize,
}

/// FIFO of provider calls drained by a single worker
#[derive(Debug)]
pub struct TranslationQueue {
    sender: mpsc::UnboundedSender<Envelope>,
    metrics: Arc<QueueMetrics>,
    limiter: Arc<SlidingWindowLimiter>,
    worker: JoinHandle<()>,
}

impl TranslationQueue {
    /// Start the queue worker. Must be called from within a tokio runtime.
    pub fn start(limiter: Arc<SlidingWindowLimiter>, policy: QueuePolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let metrics = Arc::new(QueueMetrics::default());
        let worker = tokio::spawn(run_worker(receiver, limiter.clone(), policy, metrics.clone()));

        Self {
            sender,
            metrics,
            limiter,
            worker,
        }
    }

    /// Submit a task and wait for its outcome
    pub async fn enqueue(&self, task: QueuedTask) -> Result<String, TranslationError> {
        let (responder, outcome) = oneshot::channel();
        trace!("Task for {} {}", task.key, TaskState::Enqueued);

        self.metrics.depth.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Envelope { task, responder }).is_err() {
            self.metrics.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(TranslationError::QueueClosed);
        }

        outcome.await.map_err(|_| TranslationError::QueueClosed)?
    }

    /// Tasks submitted and not yet finished, including the one executing
    pub fn depth(&self) -> usize {
        self.metrics.depth.load(Ordering::SeqCst)
    }

    /// Whether a provider call is in progress
    pub fn is_executing(&self) -> bool {
        self.metrics.executing.load(Ordering::SeqCst)
    }

    /// Tasks finished since start, successful or not
    pub fn completed(&self) -> usize {
        self.metrics.completed.load(Ordering::SeqCst)
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }
}

impl Drop for TranslationQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
    limiter: Arc<SlidingWindowLimiter>,
    policy: QueuePolicy,
    metrics: Arc<QueueMetrics>,
) {
    debug!("Translation queue worker started");

    while let Some(Envelope { task, responder }) = receiver.recv().await {
        let result = process_task(&task, &limiter, &policy, &metrics).await;

        match &result {
            Ok(_) => trace!("Task for {} {}", task.key, TaskState::Succeeded),
            Err(e) => debug!("Task for {} {}: {}", task.key, TaskState::Failed, e),
        }

        metrics.depth.fetch_sub(1, Ordering::SeqCst);
        metrics.completed.fetch_add(1, Ordering::SeqCst);
        // The caller may have stopped waiting
        let _ = responder.send(result);
    }

    debug!("Translation queue worker stopped");
}

async fn process_task(
    task: &QueuedTask,
    limiter: &SlidingWindowLimiter,
    policy: &QueuePolicy,
    metrics: &QueueMetrics,
) -> Result<String, TranslationError> {
    let mut attempts: u32 = 0;
    let mut quota_waited = Duration::ZERO;

    loop {
        limiter.admit().await;
        trace!("Task for {} {}", task.key, TaskState::Admitted);

        attempts += 1;
        metrics.executing.store(true, Ordering::SeqCst);
        let outcome = execute_once(task, policy.request_timeout).await;
        metrics.executing.store(false, Ordering::SeqCst);

        match outcome {
            Ok(translation) => return Ok(translation),
            Err(e) if e.is_rate_limited() => {
                if quota_waited + policy.retry_cooldown > policy.max_quota_wait {
                    warn!(
                        "Giving up on {} after {} rate-limited attempts ({}s of cooldown)",
                        task.key,
                        attempts,
                        quota_waited.as_secs()
                    );
                    return Err(TranslationError::ServiceUnavailable { attempts });
                }

                warn!(
                    "Provider quota reached for {} (attempt {}), retrying in {}ms",
                    task.key,
                    attempts,
                    policy.retry_cooldown.as_millis()
                );
                trace!("Task for {} {}", task.key, TaskState::RetryScheduled);
                if let Some(callback) = &task.on_quota_wait {
                    callback(attempts);
                }

                tokio::time::sleep(policy.retry_cooldown).await;
                quota_waited += policy.retry_cooldown;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn execute_once(task: &QueuedTask, request_timeout: Duration) -> Result<String, ProviderError> {
    trace!("Task for {} {}", task.key, TaskState::Executing);
    let call = AssertUnwindSafe((task.execute)()).catch_unwind();

    match tokio::time::timeout(request_timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => {
            error!("Provider call for {} panicked", task.key);
            Err(ProviderError::ServiceError("provider call panicked".to_string()))
        }
        Err(_) => Err(ProviderError::NetworkError(format!(
            "request timed out after {}ms",
            request_timeout.as_millis()
        ))),
    }
}
