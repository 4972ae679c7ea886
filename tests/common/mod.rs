/*!
 * Common test utilities for the livetl test suite
 */

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use livetl::app_config::{Config, ProviderKind, StorageBackend};
use livetl::dedup::Deduplicator;
use livetl::detector::ChangeEvent;
use livetl::document::{Document, NodeId, NodeSpec, Selector, SharedDocument};
use livetl::language_utils::ScriptHeuristicDetector;
use livetl::providers::mock::MockProvider;
use livetl::settings::{Settings, SettingsHandle};
use livetl::sink::ResultSink;
use livetl::storage::MemoryStore;
use livetl::translation::cache::ManualClock;
use livetl::translation::{PipelineParts, QueuePolicy, SlidingWindowLimiter, TranslationCache, TranslationPipeline, TranslationQueue};

/// Start of the manual clock used by cache tests (2024-01-01T00:00:00Z)
pub const T0: i64 = 1_704_067_200_000;

pub const DAY: Duration = Duration::from_millis(24 * 60 * 60 * 1000);

/// Class carried by chat message content nodes in test documents
pub const MESSAGE_CLASS: &str = "markup_a1b2 messageContent_c3d4";

/// Route library logs to the test output, once per process
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A chat region found by its accessible label
pub fn chat_region() -> NodeSpec {
    NodeSpec::element("ol").attr("aria-label", "Messages").attr("id", "chat")
}

/// A message row wrapping one content node
pub fn chat_message(id: &str, text: &str) -> NodeSpec {
    NodeSpec::element("li")
        .attr("id", id)
        .child(NodeSpec::element("div").attr("class", MESSAGE_CLASS).text(text))
}

/// A system notice that must never be translated
pub fn system_message(id: &str, text: &str) -> NodeSpec {
    NodeSpec::element("li").attr("id", id).attr("class", "systemMessage-x1").child(
        NodeSpec::element("div").attr("class", MESSAGE_CLASS).text(text),
    )
}

/// The content node inside the message row `#row_id`
pub fn content_of(document: &Document, row_id: &str) -> NodeId {
    let selector = Selector::parse(&format!("#{} [class*=\"markup_\"]", row_id)).unwrap();
    document.query_selector(document.body(), &selector).unwrap()
}

/// A change event for `node` carrying its current text
pub fn event_for(document: &Document, node: NodeId) -> ChangeEvent {
    ChangeEvent {
        content_ref: node,
        raw_text: document.text_content(node).trim().to_string(),
        discovered_at: Utc::now(),
    }
}

/// Configuration for offline tests: mock provider, in-memory storage, short detector backoff
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.provider.kind = ProviderKind::Mock;
    config.storage.backend = StorageBackend::Memory;
    config.target_language = "zh".to_string();
    config
}

/// A pipeline over its own document, driven by a mock provider and a manual clock
pub struct PipelineHarness {
    pub document: SharedDocument,
    pub pipeline: TranslationPipeline,
    pub provider: MockProvider,
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
}

impl PipelineHarness {
    /// Harness with default pipeline settings
    pub fn new(provider: MockProvider) -> Self {
        Self::with_policy(provider, QueuePolicy::default())
    }

    pub fn with_policy(provider: MockProvider, policy: QueuePolicy) -> Self {
        let document = Document::shared();
        let clock = Arc::new(ManualClock::new(T0));
        let store = MemoryStore::new();

        let cache = TranslationCache::new(DAY, 1000)
            .with_clock(clock.clone())
            .with_store(Arc::new(store.clone()), "translationCache");
        let limiter = Arc::new(SlidingWindowLimiter::new(Duration::from_millis(1000), 5));
        let queue = Arc::new(TranslationQueue::start(limiter, policy));
        let ignore = vec![Selector::parse("[class*=\"systemMessage-\"]").unwrap()];

        let pipeline = TranslationPipeline::new(PipelineParts {
            document: document.clone(),
            cache,
            queue,
            provider: Arc::new(provider.clone()),
            language_detector: Arc::new(ScriptHeuristicDetector),
            dedup: Deduplicator::new(ignore),
            sink: ResultSink::new(document.clone(), Duration::from_millis(16)),
            settings: SettingsHandle::new(Settings::default()),
        });

        Self {
            document,
            pipeline,
            provider,
            clock,
            store,
        }
    }

    /// Append a chat region with the given messages and return the region node
    pub fn with_region(&self, messages: &[(&str, &str)]) -> NodeId {
        let mut region = chat_region();
        for (id, text) in messages {
            region = region.child(chat_message(id, text));
        }
        self.document.append_spec(self.document.body(), &region).unwrap()
    }

    pub fn content(&self, row_id: &str) -> NodeId {
        content_of(&self.document, row_id)
    }

    pub fn event(&self, row_id: &str) -> ChangeEvent {
        event_for(&self.document, self.content(row_id))
    }
}

/// Receive every event currently buffered in `events`
pub fn drain(events: &mut mpsc::UnboundedReceiver<ChangeEvent>) -> Vec<ChangeEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}
