/*!
 * Tests for the serial translation queue
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;

use livetl::errors::{ProviderError, TranslationError};
use livetl::providers::mock::MockProvider;
use livetl::providers::TranslationProvider;
use livetl::translation::{CacheKey, QueuePolicy, QueuedTask, SlidingWindowLimiter, TranslationQueue};

fn policy() -> QueuePolicy {
    QueuePolicy {
        retry_cooldown: Duration::from_millis(5000),
        max_quota_wait: Duration::from_millis(60_000),
        request_timeout: Duration::from_millis(10_000),
    }
}

fn start_queue(max_per_window: usize) -> TranslationQueue {
    let limiter = Arc::new(SlidingWindowLimiter::new(Duration::from_millis(1000), max_per_window));
    TranslationQueue::start(limiter, policy())
}

fn provider_task(provider: &MockProvider, text: &str) -> QueuedTask {
    let provider = provider.clone();
    let text = text.to_string();
    QueuedTask::new(CacheKey::new("en", "zh", &text), move || {
        let provider = provider.clone();
        let text = text.clone();
        async move { provider.translate(&text, "en", "zh").await }.boxed()
    })
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_withWorkingProvider_shouldReturnTranslation() {
    let queue = start_queue(5);
    let provider = MockProvider::working();

    let result = queue.enqueue(provider_task(&provider, "hello")).await;

    assert_eq!(result, Ok("[zh] hello".to_string()));
    assert_eq!(queue.completed(), 1);
    assert_eq!(queue.depth(), 0);
    assert!(!queue.is_executing());
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_concurrentSubmissions_shouldExecuteInFifoOrder() {
    let queue = start_queue(100);
    let provider = MockProvider::working();

    let texts: Vec<String> = (0..8).map(|i| format!("message {}", i)).collect();
    let results = join_all(texts.iter().map(|text| queue.enqueue(provider_task(&provider, text)))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    let order: Vec<String> = provider.calls().into_iter().map(|call| call.text).collect();
    assert_eq!(order, texts);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_slowCalls_shouldNeverOverlap() {
    let queue = start_queue(100);
    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));

    let tasks = (0..4).map(|i| {
        let running = running.clone();
        let max_running = max_running.clone();
        QueuedTask::new(CacheKey::new("en", "zh", &format!("t{}", i)), move || {
            let running = running.clone();
            let max_running = max_running.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ProviderError>("done".to_string())
            }
            .boxed()
        })
    });

    let results = join_all(tasks.map(|task| queue.enqueue(task))).await;
    assert_eq!(results.len(), 4);
    assert_eq!(max_running.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_overLimit_shouldWaitForWindow() {
    let queue = start_queue(5);
    let provider = MockProvider::working();
    let started = Instant::now();

    let finished = Arc::new(Mutex::new(Vec::new()));
    let futures = (0..6).map(|i| {
        let finished = finished.clone();
        let task = provider_task(&provider, &format!("m{}", i));
        let queue = &queue;
        async move {
            queue.enqueue(task).await.unwrap();
            finished.lock().push(Instant::now() - started);
        }
    });
    join_all(futures).await;

    let finished = finished.lock().clone();
    assert_eq!(finished.len(), 6);
    assert!(finished[..5].iter().all(|at| *at < Duration::from_millis(1000)));
    assert!(finished[5] >= Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_rateLimitedTwice_shouldRetryInPlaceAndSucceed() {
    let queue = start_queue(5);
    let provider = MockProvider::rate_limited(2);
    let waits = Arc::new(Mutex::new(Vec::new()));
    let started = Instant::now();

    let recorded = waits.clone();
    let task = provider_task(&provider, "hello").on_quota_wait(move |attempt| recorded.lock().push(attempt));
    let result = queue.enqueue(task).await;

    assert_eq!(result, Ok("[zh] hello".to_string()));
    assert_eq!(provider.request_count(), 3);
    assert_eq!(*waits.lock(), vec![1, 2]);
    // Two cooldowns of 5s each
    assert!(Instant::now() - started >= Duration::from_millis(10_000));
}

type CallLog = Arc<Mutex<Vec<(&'static str, Duration)>>>;

/// A provider task that logs its label and start offset on every attempt
fn logged_task(provider: &MockProvider, label: &'static str, log: &CallLog, started: Instant) -> QueuedTask {
    let provider = provider.clone();
    let log = log.clone();
    QueuedTask::new(CacheKey::new("en", "zh", label), move || {
        let provider = provider.clone();
        log.lock().push((label, Instant::now() - started));
        async move { provider.translate(label, "en", "zh").await }.boxed()
    })
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_retryingTask_shouldHoldBackLaterTasks() {
    let queue = Arc::new(start_queue(5));
    let limited = MockProvider::rate_limited(1);
    let working = MockProvider::working();
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let started = Instant::now();

    let first = {
        let queue = queue.clone();
        let task = logged_task(&limited, "first", &log, started);
        tokio::spawn(async move { queue.enqueue(task).await })
    };
    // Submit the second task only once the first one is in the queue
    while queue.depth() == 0 {
        tokio::task::yield_now().await;
    }
    let second = queue.enqueue(logged_task(&working, "second", &log, started)).await;

    assert_eq!(first.await.unwrap(), Ok("[zh] first".to_string()));
    assert_eq!(second, Ok("[zh] second".to_string()));

    let log = log.lock().clone();
    let labels: Vec<&str> = log.iter().map(|(label, _)| *label).collect();
    assert_eq!(labels, vec!["first", "first", "second"]);
    // The retry waited out the cooldown, and the second task only ran after it
    assert!(log[1].1 >= Duration::from_millis(5000));
    assert!(log[2].1 >= log[1].1);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_withServiceError_shouldFailAfterOneAttempt() {
    let queue = start_queue(5);
    let provider = MockProvider::failing();

    let result = queue.enqueue(provider_task(&provider, "hello")).await;

    assert!(matches!(
        result,
        Err(TranslationError::Provider(ProviderError::ServiceError(_)))
    ));
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_withNetworkError_shouldFailAfterOneAttempt() {
    let queue = start_queue(5);
    let provider = MockProvider::unreachable();

    let result = queue.enqueue(provider_task(&provider, "hello")).await;

    assert!(matches!(
        result,
        Err(TranslationError::Provider(ProviderError::NetworkError(_)))
    ));
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_alwaysRateLimited_shouldStopAtQuotaBound() {
    let queue = start_queue(5);
    let provider = MockProvider::always_rate_limited();

    let result = queue.enqueue(provider_task(&provider, "hello")).await;

    // 60s of cooldown at 5s each allows twelve retries after the first call
    assert_eq!(result, Err(TranslationError::ServiceUnavailable { attempts: 13 }));
    assert_eq!(provider.request_count(), 13);
    assert_eq!(queue.depth(), 0);
}
