/*!
 * Change detection over the live document.
 *
 * The detector finds the content region, watches it for added nodes and turns
 * every content-bearing node it sees into a `ChangeEvent`. The host document is
 * free to tear the region down and build a new one at any time, so detection
 * runs under a supervisor:
 *
 * ```text
 * Searching --found--> Watching --region detached--> Detached --> Searching
 *     |
 *     +--attempts exhausted--> Failed
 * ```
 *
 * The supervisor listens to the whole document, the inner watcher only to the
 * region. Events are delivered at least once; repeats are left to the
 * deduplicator.
 */

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::app_config::{DetectorConfig, PipelineConfig};
use crate::document::{NodeId, Selector, SharedDocument};
use crate::errors::DetectionError;
use crate::sink::DERIVED_ATTRIBUTE;

pub mod strategy;

static ANY_ELEMENT: Lazy<Selector> = Lazy::new(Selector::universal);
static DERIVED_NODE: Lazy<Selector> = Lazy::new(|| Selector::attribute_exists(DERIVED_ATTRIBUTE));

pub use self::strategy::{default_strategies, AriaLabelStrategy, RegionStrategy, SelectorStrategy};

/// Newly discovered content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub content_ref: NodeId,
    pub raw_text: String,
    pub discovered_at: DateTime<Utc>,
}

/// The region currently tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHandle {
    pub node: NodeId,
    /// Increases by one every time a region is acquired
    pub generation: u64,
}

impl fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region {} (generation {})", self.node, self.generation)
    }
}

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Not started yet
    Idle,
    /// Looking for the region; `attempt` counts from 1
    Searching { attempt: u32 },
    Watching(RegionHandle),
    /// The tracked region left the document
    Detached,
    /// Discovery gave up
    Failed,
}

/// Stops the inner watcher when dropped
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn stop(self) {}

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Finds the content region and reports new content inside it
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    document: SharedDocument,
    strategies: Arc<Vec<Box<dyn RegionStrategy>>>,
    content_selectors: Arc<Vec<Selector>>,
    max_attempts: u32,
    backoff: Duration,
    state: Arc<watch::Sender<DetectorState>>,
    locate_calls: Arc<AtomicU32>,
    generation: Arc<AtomicU32>,
}

impl ChangeDetector {
    pub fn new(
        document: SharedDocument,
        strategies: Vec<Box<dyn RegionStrategy>>,
        content_selectors: Vec<Selector>,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        let (state, _) = watch::channel(DetectorState::Idle);
        Self {
            document,
            strategies: Arc::new(strategies),
            content_selectors: Arc::new(content_selectors),
            max_attempts: max_attempts.max(1),
            backoff,
            state: Arc::new(state),
            locate_calls: Arc::new(AtomicU32::new(0)),
            generation: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Build a detector from configuration
    pub fn from_config(document: SharedDocument, detector: &DetectorConfig, pipeline: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(
            document,
            default_strategies(detector)?,
            DetectorConfig::parse_selectors(&detector.content_selectors)?,
            pipeline.detector_max_attempts,
            pipeline.detector_backoff(),
        ))
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    /// Current supervisor state
    pub fn state(&self) -> DetectorState {
        *self.state.borrow()
    }

    /// Receiver that wakes on every state change
    pub fn subscribe_state(&self) -> watch::Receiver<DetectorState> {
        self.state.subscribe()
    }

    /// Number of lookups the supervisor performed so far
    pub fn locate_calls(&self) -> u32 {
        self.locate_calls.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: DetectorState) {
        self.state.send_replace(state);
    }

    /// Try every strategy in order; the first match wins.
    ///
    /// A plain lookup: it changes no detector state.
    pub fn locate_region(&self) -> Option<NodeId> {
        self.strategies.iter().find_map(|strategy| {
            let found = strategy.locate(&self.document)?;
            debug!("Strategy '{}' located {}", strategy.name(), found);
            Some(found)
        })
    }

    /// Look the region up on behalf of the supervisor, giving a hit the next generation
    fn acquire_region(&self) -> Option<RegionHandle> {
        self.locate_calls.fetch_add(1, Ordering::SeqCst);
        let node = self.locate_region()?;
        let generation = u64::from(self.generation.fetch_add(1, Ordering::SeqCst)) + 1;
        Some(RegionHandle { node, generation })
    }

    fn is_content(&self, node: NodeId) -> bool {
        self.content_selectors.iter().any(|selector| self.document.matches(node, selector))
    }

    fn is_derived(&self, node: NodeId) -> bool {
        self.document.closest(node, &DERIVED_NODE).is_some()
    }

    /// Content nodes at or under `root`, in document order
    pub fn scan(&self, root: NodeId) -> Vec<ChangeEvent> {
        if self.is_derived(root) {
            return Vec::new();
        }

        let mut found = Vec::new();
        if self.is_content(root) {
            found.push(root);
        }
        found.extend(
            self.document
                .query_selector_all(root, &ANY_ELEMENT)
                .into_iter()
                .filter(|node| self.is_content(*node) && !self.is_derived(*node)),
        );

        found
            .into_iter()
            .map(|node| ChangeEvent {
                content_ref: node,
                raw_text: self.document.text_content(node).trim().to_string(),
                discovered_at: Utc::now(),
            })
            .collect()
    }

    /// Watch `region` and send an event for every content node added under it.
    ///
    /// The feed is subscribed before this returns, so nothing added afterwards
    /// is missed. If the watcher falls behind the feed, it rescans the region.
    pub fn start_watching(&self, region: RegionHandle, events: mpsc::UnboundedSender<ChangeEvent>) -> Subscription {
        let mut feed = self.document.observe();
        let detector = self.clone();

        let handle = tokio::spawn(async move {
            debug!("Watching {}", region);
            loop {
                match feed.recv().await {
                    Ok(record) => {
                        if record.added.is_empty() || !detector.document.contains(region.node, record.target) {
                            continue;
                        }
                        for added in record.added {
                            for event in detector.scan(added) {
                                if events.send(event).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Watcher for {} missed {} mutations, rescanning", region, skipped);
                        for event in detector.scan(region.node) {
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });

        Subscription { handle }
    }

    /// Run detection until the event receiver goes away or discovery gives up
    pub async fn run(&self, events: mpsc::UnboundedSender<ChangeEvent>) -> Result<(), DetectionError> {
        // Subscribed before the first lookup so a detach is never missed
        let mut outer = self.document.observe();
        let mut failed_attempts: u32 = 0;

        loop {
            self.set_state(DetectorState::Searching {
                attempt: failed_attempts + 1,
            });

            let region = match self.acquire_region() {
                Some(region) => region,
                None => {
                    failed_attempts += 1;
                    if failed_attempts >= self.max_attempts {
                        error!("Content region not found after {} attempts, giving up", failed_attempts);
                        self.set_state(DetectorState::Failed);
                        return Err(DetectionError::RegionNotFound {
                            attempts: failed_attempts,
                        });
                    }

                    info!(
                        "Content region not found (attempt {}/{}), retrying in {}ms",
                        failed_attempts,
                        self.max_attempts,
                        self.backoff.as_millis()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.backoff) => {}
                        _ = events.closed() => return Ok(()),
                    }
                    continue;
                }
            };

            failed_attempts = 0;
            info!("Tracking {}", region);
            self.set_state(DetectorState::Watching(region));
            let subscription = self.start_watching(region, events.clone());

            // Content that was already there when the region was acquired
            for event in self.scan(region.node) {
                if events.send(event).is_err() {
                    return Ok(());
                }
            }

            loop {
                tokio::select! {
                    received = outer.recv() => match received {
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            if !self.document.is_attached(region.node) {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => return Ok(()),
                    },
                    _ = events.closed() => return Ok(()),
                }
            }

            subscription.stop();
            warn!("{} left the document, searching again", region);
            self.set_state(DetectorState::Detached);
        }
    }

    /// Run detection on a background task
    pub fn spawn(&self, events: mpsc::UnboundedSender<ChangeEvent>) -> JoinHandle<Result<(), DetectionError>> {
        let detector = self.clone();
        tokio::spawn(async move { detector.run(events).await })
    }
}
