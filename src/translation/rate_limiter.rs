/*!
 * Sliding-window admission control.
 *
 * The limiter keeps the timestamps of recent admissions. A caller is admitted
 * immediately while fewer than `max_per_window` admissions happened within the
 * last `window`; otherwise it sleeps until the oldest one leaves the window and
 * checks again.
 */

use std::collections::VecDeque;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    max_per_window: usize,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_per_window: usize) -> Self {
        Self {
            window,
            max_per_window: max_per_window.max(1),
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit now, or return how long to wait before checking again
    fn try_admit_at(&self, now: Instant) -> Result<(), Duration> {
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, now);

        if timestamps.len() < self.max_per_window {
            timestamps.push_back(now);
            return Ok(());
        }

        let oldest = timestamps.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Admit without waiting, if there is room in the window
    pub fn try_admit(&self) -> bool {
        self.try_admit_at(Instant::now()).is_ok()
    }

    /// Wait until the window has room, then record the admission.
    ///
    /// Returns the instant of admission.
    pub async fn admit(&self) -> Instant {
        loop {
            let now = Instant::now();
            match self.try_admit_at(now) {
                Ok(()) => return now,
                Err(wait) => {
                    debug!("Rate limit reached, waiting {}ms for a slot", wait.as_millis());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Admissions currently inside the window
    pub fn recorded(&self) -> usize {
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, Instant::now());
        timestamps.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_per_window(&self) -> usize {
        self.max_per_window
    }
}
