/*!
 * Scripted document sessions.
 *
 * A replay script describes a host page over time: the content present before
 * the session starts, then a list of steps (append a node, remove a node,
 * wait, change settings, run "translate all", toggle a result). The controller
 * runs the detector and pipeline against the script and reports what ended up
 * rendered next to each content node.
 */

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app_controller::LiveSession;
use crate::detector::DetectorState;
use crate::document::{NodeId, NodeSpec, Selector, SharedDocument};
use crate::settings::Settings;
use crate::sink::RenderKind;
use crate::translation::{BatchSummary, CacheStats};

/// Upper bound on a single settle step
const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 120_000;

/// One scripted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayStep {
    /// Insert a subtree under the first match of `parent` (the body when absent)
    Append {
        #[serde(default)]
        parent: Option<String>,
        node: NodeSpec,
    },
    /// Delete the first node matching `selector` from the document
    Remove { selector: String },
    /// Let time pass
    Wait { ms: u64 },
    /// Wait until every pending translation has been rendered
    Settle,
    /// Push a settings change
    Settings {
        #[serde(default)]
        target_language: Option<String>,
        #[serde(default)]
        auto_translate_enabled: Option<bool>,
    },
    /// Translate all unprocessed content in the tracked region
    TranslateAll,
    /// Flip the result of the first content node matching `selector`
    Toggle { selector: String },
}

/// A scripted session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayScript {
    /// Subtrees present under the body before detection starts
    #[serde(default)]
    pub document: Vec<NodeSpec>,

    #[serde(default)]
    pub steps: Vec<ReplayStep>,

    /// Milliseconds a settle step may take before giving up
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
}

fn default_settle_timeout_ms() -> u64 {
    DEFAULT_SETTLE_TIMEOUT_MS
}

impl Default for ReplayScript {
    fn default() -> Self {
        Self {
            document: Vec::new(),
            steps: Vec::new(),
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
        }
    }
}

impl ReplayScript {
    /// Load a script from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open replay script: {}", path.display()))?;
        let reader = BufReader::new(file);
        let script = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse replay script: {}", path.display()))?;
        Ok(script)
    }

    fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

/// What is rendered next to one content node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayEntry {
    pub content: NodeId,
    pub original: String,
    pub kind: RenderKind,
    pub rendered: String,
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub entries: Vec<ReplayEntry>,
    pub detector_state: DetectorState,
    pub cache: CacheStats,
    pub provider_calls: usize,
    pub batches: Vec<BatchSummary>,
}

impl ReplayReport {
    /// Entry for `content`, if anything was rendered for it
    pub fn entry(&self, content: NodeId) -> Option<&ReplayEntry> {
        self.entries.iter().find(|entry| entry.content == content)
    }

    /// Entries of the given kind
    pub fn of_kind(&self, kind: RenderKind) -> impl Iterator<Item = &ReplayEntry> {
        self.entries.iter().filter(move |entry| entry.kind == kind)
    }
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Detector: {:?}", self.detector_state)?;
        for entry in &self.entries {
            writeln!(f, "{} [{}] {} => {}", entry.content, entry.kind, entry.original, entry.rendered)?;
        }
        for batch in &self.batches {
            writeln!(f, "Batch: {}", batch)?;
        }
        writeln!(f, "Provider calls: {}", self.provider_calls)?;
        write!(f, "Cache: {}", self.cache)
    }
}

/// Build the script's initial content into `document`
pub fn seed(document: &SharedDocument, script: &ReplayScript) -> Result<()> {
    let body = document.body();
    for spec in &script.document {
        document.append_spec(body, spec)?;
    }
    Ok(())
}

fn resolve(document: &SharedDocument, selector: &str) -> Result<NodeId> {
    let parsed = Selector::parse(selector)?;
    document
        .query_selector(document.body(), &parsed)
        .ok_or_else(|| anyhow!("No node matches '{}'", selector))
}

/// Wait until the pipeline has nothing left to do
pub async fn settle(session: &LiveSession, timeout: Duration) -> Result<()> {
    let pipeline = &session.pipeline;
    let poll = pipeline.sink().frame_interval().max(Duration::from_millis(1));
    let deadline = tokio::time::Instant::now() + timeout;

    // Idle must hold on two consecutive polls so events still in the channel get picked up
    let mut idle_polls = 0;
    while idle_polls < 2 {
        tokio::time::sleep(poll).await;
        let idle = pipeline.pending_events() == 0
            && pipeline.queue().depth() == 0
            && !pipeline.queue().is_executing()
            && pipeline.sink().pending() == 0;
        idle_polls = if idle { idle_polls + 1 } else { 0 };

        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!("Pipeline did not settle within {:?}", timeout));
        }
    }
    pipeline.sink().flush_now();
    Ok(())
}

/// Run the script's steps against a started session
pub async fn execute(session: &LiveSession, script: &ReplayScript) -> Result<ReplayReport> {
    let document = &session.document;
    let mut batches = Vec::new();

    for (index, step) in script.steps.iter().enumerate() {
        debug!("Step {}: {:?}", index + 1, step);
        match step {
            ReplayStep::Append { parent, node } => {
                let parent = match parent {
                    Some(selector) => resolve(document, selector)?,
                    None => document.body(),
                };
                document.append_spec(parent, node)?;
            }
            ReplayStep::Remove { selector } => {
                let node = resolve(document, selector)?;
                document.discard(node)?;
            }
            ReplayStep::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
            ReplayStep::Settle => settle(session, script.settle_timeout()).await?,
            ReplayStep::Settings {
                target_language,
                auto_translate_enabled,
            } => {
                let current = session.settings().snapshot();
                session.settings().update(Settings {
                    target_language: target_language.clone().unwrap_or(current.target_language),
                    auto_translate_enabled: auto_translate_enabled.unwrap_or(current.auto_translate_enabled),
                });
            }
            ReplayStep::TranslateAll => match session.detector.state() {
                DetectorState::Watching(region) => batches.push(session.batch.translate_existing(region).await),
                state => warn!("Translate all skipped: no region is tracked ({:?})", state),
            },
            ReplayStep::Toggle { selector } => {
                let content = resolve(document, selector)?;
                session.pipeline.sink().flush_now();
                match session.pipeline.sink().toggle(content) {
                    Some(kind) => info!("{} now shows {}", content, kind),
                    None => warn!("Nothing to toggle for {}", content),
                }
            }
        }
    }

    settle(session, script.settle_timeout()).await?;

    let sink = session.pipeline.sink();
    let entries = sink
        .rendered_contents()
        .into_iter()
        .filter_map(|content| {
            sink.rendered(content).map(|view| ReplayEntry {
                content,
                original: document.text_content(content).trim().to_string(),
                kind: view.kind,
                rendered: view.text,
            })
        })
        .collect();

    Ok(ReplayReport {
        entries,
        detector_state: session.detector.state(),
        cache: session.pipeline.cache().stats(),
        provider_calls: session.pipeline.queue().completed(),
        batches,
    })
}
