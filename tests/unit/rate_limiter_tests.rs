/*!
 * Tests for the sliding-window rate limiter
 */

use std::time::Duration;

use tokio::time::Instant;

use livetl::translation::SlidingWindowLimiter;

#[tokio::test(start_paused = true)]
async fn test_admit_sixRequestsInOneWindow_shouldDelayTheSixth() {
    let limiter = SlidingWindowLimiter::new(Duration::from_millis(1000), 5);
    let start = Instant::now();

    let mut admitted = Vec::new();
    for _ in 0..6 {
        admitted.push(limiter.admit().await - start);
    }

    for at in &admitted[..5] {
        assert_eq!(*at, Duration::ZERO);
    }
    assert!(admitted[5] >= Duration::from_millis(1000));
    assert!(admitted[5] < Duration::from_millis(1100));
}

#[tokio::test(start_paused = true)]
async fn test_admit_anyWindow_shouldNeverExceedLimit() {
    let limiter = SlidingWindowLimiter::new(Duration::from_millis(500), 3);
    let start = Instant::now();

    let mut admitted = Vec::new();
    for _ in 0..12 {
        admitted.push(limiter.admit().await - start);
    }

    for (i, at) in admitted.iter().enumerate() {
        let in_window = admitted[i..]
            .iter()
            .filter(|later| **later - *at < Duration::from_millis(500))
            .count();
        assert!(in_window <= 3, "{} admissions within 500ms of {:?}", in_window, at);
    }
}

#[tokio::test(start_paused = true)]
async fn test_admit_afterIdlePeriod_shouldAdmitImmediately() {
    let limiter = SlidingWindowLimiter::new(Duration::from_millis(1000), 1);
    limiter.admit().await;

    tokio::time::advance(Duration::from_secs(5)).await;
    let before = Instant::now();
    let at = limiter.admit().await;
    assert_eq!(at, before);
    assert_eq!(limiter.max_per_window(), 1);
    assert_eq!(limiter.window(), Duration::from_millis(1000));
}
