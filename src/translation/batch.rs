/*!
 * Batch translation of content already on screen.
 *
 * Used for the "translate all" action: every content node in the region that
 * has not been processed yet is pushed through the pipeline, a few at a time,
 * with a pause between batches so a large backlog does not flood the queue.
 * A run is refused while auto-translate is off or while another run is going.
 */

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use log::{info, warn};

use crate::app_config::PipelineConfig;
use crate::detector::{ChangeDetector, RegionHandle};
use super::core::{EventOutcome, TranslationPipeline};

/// Totals of one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub submitted: usize,
    pub translated: usize,
    pub cached: usize,
    pub failed: usize,
    pub skipped: usize,
    pub batches: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Translated(_) => self.translated += 1,
            EventOutcome::Cached(_) => self.cached += 1,
            EventOutcome::Failed(_) => self.failed += 1,
            EventOutcome::Disabled | EventOutcome::Skipped | EventOutcome::SameLanguage => self.skipped += 1,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} submitted in {} batches: {} translated, {} cached, {} failed, {} skipped",
            self.submitted, self.batches, self.translated, self.cached, self.failed, self.skipped
        )
    }
}

/// Batch translator for content that is already present
#[derive(Debug, Clone)]
pub struct BatchTranslator {
    pipeline: TranslationPipeline,
    detector: ChangeDetector,
    batch_size: usize,
    delay: Duration,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when a run ends or is cancelled
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BatchTranslator {
    pub fn new(pipeline: TranslationPipeline, detector: ChangeDetector, batch_size: usize, delay: Duration) -> Self {
        Self {
            pipeline,
            detector,
            batch_size: batch_size.max(1),
            delay,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(pipeline: TranslationPipeline, detector: ChangeDetector, config: &PipelineConfig) -> Self {
        Self::new(pipeline, detector, config.batch_size, config.batch_delay())
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Translate every unprocessed content node under `region`.
    ///
    /// Returns an empty summary when auto-translate is off or another run is
    /// still going.
    pub async fn translate_existing(&self, region: RegionHandle) -> BatchSummary {
        if !self.pipeline.settings().snapshot().auto_translate_enabled {
            warn!("Auto-translate is disabled; enable it before translating existing content");
            return BatchSummary::default();
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("A batch translation is already running");
            return BatchSummary::default();
        }
        let _guard = RunGuard(self.running.clone());

        let pending: Vec<_> = self
            .detector
            .scan(region.node)
            .into_iter()
            .filter(|event| !self.pipeline.dedup().is_processed(event.content_ref))
            .collect();

        let mut summary = BatchSummary {
            submitted: pending.len(),
            ..Default::default()
        };
        info!("Translating {} existing items in batches of {}", pending.len(), self.batch_size);

        for (index, batch) in pending.chunks(self.batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.delay).await;
            }

            let outcomes = join_all(
                batch
                    .iter()
                    .cloned()
                    .map(|event| self.pipeline.handle_event_forced(event)),
            )
            .await;

            for outcome in &outcomes {
                summary.record(outcome);
            }
            summary.batches += 1;
        }

        info!("Batch translation finished: {}", summary);
        summary
    }
}
