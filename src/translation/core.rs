/*!
 * Translation request pipeline.
 *
 * This module turns change events into rendered translations:
 *
 * 1. drop the event while auto-translate is off (the node stays unmarked)
 * 2. let the deduplicator refuse repeats, blank text and ignored containers
 * 3. detect the source language and skip text already in the target language
 * 4. serve cache hits directly to the sink
 * 5. send misses through the rate-limited queue, cache the result and render it
 *
 * Failures are rendered as error payloads; nothing here aborts the event loop.
 * A translation identical to its source text is cached but not rendered.
 */

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use log::{debug, info, warn};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dedup::Deduplicator;
use crate::detector::ChangeEvent;
use crate::document::{NodeId, SharedDocument};
use crate::errors::TranslationError;
use crate::language_utils::{self, LanguageDetector};
use crate::providers::TranslationProvider;
use crate::settings::SettingsHandle;
use crate::sink::{RenderPayload, ResultSink};
use super::cache::{truncate_text, CacheKey, TranslationCache};
use super::queue::{QueuedTask, TranslationQueue};

/// What happened to a change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Auto-translate is switched off
    Disabled,
    /// Already processed, blank, or inside an ignored container
    Skipped,
    /// Source and target language are the same
    SameLanguage,
    /// Served from the cache
    Cached(String),
    /// Translated by the provider
    Translated(String),
    /// Translation failed; an error payload was rendered
    Failed(TranslationError),
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventOutcome::Disabled => write!(f, "disabled"),
            EventOutcome::Skipped => write!(f, "skipped"),
            EventOutcome::SameLanguage => write!(f, "same language"),
            EventOutcome::Cached(t) => write!(f, "cached: {}", t),
            EventOutcome::Translated(t) => write!(f, "translated: {}", t),
            EventOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// The components the pipeline drives
pub struct PipelineParts {
    pub document: SharedDocument,
    pub cache: TranslationCache,
    pub queue: Arc<TranslationQueue>,
    pub provider: Arc<dyn TranslationProvider>,
    pub language_detector: Arc<dyn LanguageDetector>,
    pub dedup: Deduplicator,
    pub sink: ResultSink,
    pub settings: SettingsHandle,
}

/// Event-driven translation pipeline
#[derive(Clone)]
pub struct TranslationPipeline {
    document: SharedDocument,
    cache: TranslationCache,
    queue: Arc<TranslationQueue>,
    provider: Arc<dyn TranslationProvider>,
    language_detector: Arc<dyn LanguageDetector>,
    dedup: Deduplicator,
    sink: ResultSink,
    settings: SettingsHandle,
    pending_events: Arc<AtomicUsize>,
}

impl fmt::Debug for TranslationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationPipeline")
            .field("provider", &self.provider.name())
            .field("cache", &self.cache)
            .field("queue_depth", &self.queue.depth())
            .field("pending_events", &self.pending_events())
            .finish()
    }
}

impl TranslationPipeline {
    pub fn new(parts: PipelineParts) -> Self {
        Self {
            document: parts.document,
            cache: parts.cache,
            queue: parts.queue,
            provider: parts.provider,
            language_detector: parts.language_detector,
            dedup: parts.dedup,
            sink: parts.sink,
            settings: parts.settings,
            pending_events: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<TranslationQueue> {
        &self.queue
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    /// Events received by `run` whose handling has not finished
    pub fn pending_events(&self) -> usize {
        self.pending_events.load(Ordering::SeqCst)
    }

    /// Handle one change event, honoring the auto-translate switch
    pub async fn handle_event(&self, event: ChangeEvent) -> EventOutcome {
        self.process(event, true).await
    }

    /// Handle one change event on explicit user request
    pub async fn handle_event_forced(&self, event: ChangeEvent) -> EventOutcome {
        self.process(event, false).await
    }

    async fn process(&self, event: ChangeEvent, respect_switch: bool) -> EventOutcome {
        let settings = self.settings.snapshot();
        if respect_switch && !settings.auto_translate_enabled {
            debug!("Auto-translate disabled, ignoring {}", event.content_ref);
            return EventOutcome::Disabled;
        }

        if !self.dedup.should_process(&self.document, event.content_ref, &event.raw_text) {
            return EventOutcome::Skipped;
        }

        let outcome = self
            .translate_content(event.content_ref, &event.raw_text, &settings.target_language)
            .await;

        debug!("{} -> {}", event.content_ref, outcome);
        outcome
    }

    async fn translate_content(&self, content: NodeId, text: &str, target_lang: &str) -> EventOutcome {
        let source_lang = self.language_detector.detect(text);
        if language_utils::language_codes_match(&source_lang, target_lang) || source_lang == target_lang {
            debug!("'{}' is already in {}", truncate_text(text, 30), target_lang);
            return EventOutcome::SameLanguage;
        }

        let key = CacheKey::new(&source_lang, target_lang, text);
        if let Some(translation) = self.cache.get(&key) {
            self.render_translation(content, text, &translation);
            return EventOutcome::Cached(translation);
        }

        match self.request(key.clone(), Some(content)).await {
            Ok(translation) => {
                self.cache.set(key, &translation);
                self.render_translation(content, text, &translation);
                EventOutcome::Translated(translation)
            }
            Err(e) => {
                warn!("Translation of {} failed: {}", content, e);
                self.sink.apply(content, RenderPayload::Failed { message: e.to_string() });
                EventOutcome::Failed(e)
            }
        }
    }

    fn render_translation(&self, content: NodeId, original: &str, translation: &str) {
        if translation == original {
            debug!("Translation of {} is unchanged, nothing to render", content);
            return;
        }
        self.sink.apply(
            content,
            RenderPayload::Translated {
                original: original.to_string(),
                translation: translation.to_string(),
            },
        );
    }

    /// Send one provider call through the queue
    async fn request(&self, key: CacheKey, content: Option<NodeId>) -> Result<String, TranslationError> {
        let provider = self.provider.clone();
        let call_key = key.clone();
        let mut task = QueuedTask::new(key, move || {
            let provider = provider.clone();
            let key = call_key.clone();
            async move { provider.translate(&key.text, &key.source_lang, &key.target_lang).await }.boxed()
        });

        if let Some(content) = content {
            let sink = self.sink.clone();
            task = task.on_quota_wait(move |attempt| {
                debug!("{} waiting on provider quota (attempt {})", content, attempt);
                sink.apply(content, RenderPayload::Waiting);
            });
        }

        self.queue.enqueue(task).await
    }

    /// Translate a piece of text outside the document, through cache and queue
    pub async fn translate_text(&self, text: &str) -> Result<String, TranslationError> {
        let target_lang = self.settings.snapshot().target_language;
        let source_lang = self.language_detector.detect(text);
        if language_utils::language_codes_match(&source_lang, &target_lang) || source_lang == target_lang {
            return Ok(text.to_string());
        }

        let key = CacheKey::new(&source_lang, &target_lang, text);
        if let Some(translation) = self.cache.get(&key) {
            return Ok(translation);
        }

        let translation = self.request(key.clone(), None).await?;
        self.cache.set(key, &translation);
        Ok(translation)
    }

    /// Handle every event from `events` concurrently until the channel closes
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<ChangeEvent>) {
        info!("Translation pipeline started with provider {}", self.provider.name());
        while let Some(event) = events.recv().await {
            let pipeline = self.clone();
            self.pending_events.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                pipeline.handle_event(event).await;
                pipeline.pending_events.fetch_sub(1, Ordering::SeqCst);
            });
        }
        info!("Translation pipeline stopped");
    }

    /// Run the event loop on a background task
    pub fn spawn(&self, events: mpsc::UnboundedReceiver<ChangeEvent>) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.run(events).await })
    }

    /// Drop dedup marks and rendered state of content that left the document
    pub fn forget_detached(&self) -> usize {
        let forgotten = self.dedup.forget_detached(&self.document) + self.sink.forget_detached();
        if forgotten > 0 {
            debug!("Forgot {} entries for removed content", forgotten);
        }
        forgotten
    }

    /// Sweep with `forget_detached` whenever nodes are removed from the document.
    ///
    /// A burst of removal records is collapsed into a single sweep.
    pub fn spawn_reclaimer(&self) -> JoinHandle<()> {
        let pipeline = self.clone();
        let mut feed = self.document.observe();
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(record) if record.removed.is_empty() => continue,
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        loop {
                            match feed.try_recv() {
                                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                            }
                        }
                        pipeline.forget_detached();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
