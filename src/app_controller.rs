use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app_config::{Config, DetectorConfig};
use crate::dedup::Deduplicator;
use crate::detector::{ChangeDetector, DetectorState};
use crate::document::{Document, SharedDocument};
use crate::errors::DetectionError;
use crate::language_utils::{FixedLanguage, LanguageDetector, ScriptHeuristicDetector};
use crate::providers::{self, TranslationProvider, AUTO_LANGUAGE};
use crate::replay::{self, ReplayReport, ReplayScript};
use crate::settings::SettingsHandle;
use crate::sink::ResultSink;
use crate::storage::{self, KeyValueStore};
use crate::translation::{
    BatchTranslator, CacheStats, PipelineParts, QueuePolicy, SlidingWindowLimiter, StoreLoad, TranslationCache,
    TranslationPipeline, TranslationQueue,
};

// @module: Application controller wiring the pipeline together

/// A running pipeline and detector over one document
pub struct LiveSession {
    pub document: SharedDocument,
    pub pipeline: TranslationPipeline,
    pub detector: ChangeDetector,
    pub batch: BatchTranslator,
    detector_task: JoinHandle<Result<(), DetectionError>>,
    pipeline_task: JoinHandle<()>,
    cleanup_task: JoinHandle<()>,
    reclaim_task: JoinHandle<()>,
}

impl LiveSession {
    pub fn settings(&self) -> &SettingsHandle {
        self.pipeline.settings()
    }

    /// Whether the detector task has ended (gave up or was stopped)
    pub fn detector_finished(&self) -> bool {
        self.detector_task.is_finished()
    }

    /// Stop background work and write the cache out
    pub async fn shutdown(self) -> Result<()> {
        self.detector_task.abort();
        self.pipeline_task.abort();
        self.cleanup_task.abort();
        self.reclaim_task.abort();
        self.pipeline
            .cache()
            .flush()
            .await
            .context("Failed to persist translation cache")?;
        debug!("Session stopped");
        Ok(())
    }
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Durable store behind the translation cache
    store: Arc<dyn KeyValueStore>,
    // @field: Provider used instead of the configured one
    provider_override: Option<Arc<dyn TranslationProvider>>,
}

impl Controller {
    /// Create a controller with the store selected by the configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let store = storage::open_store(&config.storage).context("Failed to open cache store")?;
        Ok(Self::with_store(config, store))
    }

    /// Create a controller over an explicit store
    pub fn with_store(config: Config, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            store,
            provider_override: None,
        }
    }

    /// Use `provider` instead of the configured one
    pub fn with_provider(mut self, provider: Arc<dyn TranslationProvider>) -> Self {
        self.provider_override = Some(provider);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn provider(&self) -> Arc<dyn TranslationProvider> {
        match &self.provider_override {
            Some(provider) => provider.clone(),
            None => providers::create_provider(&self.config.provider, self.config.pipeline.request_timeout()),
        }
    }

    fn language_detector(&self) -> Arc<dyn LanguageDetector> {
        if self.config.source_language == AUTO_LANGUAGE {
            Arc::new(ScriptHeuristicDetector)
        } else {
            Arc::new(FixedLanguage(self.config.source_language.clone()))
        }
    }

    /// Open the translation cache and restore it from the store
    pub async fn open_cache(&self) -> TranslationCache {
        self.restore_cache().await.0
    }

    async fn restore_cache(&self) -> (TranslationCache, StoreLoad) {
        let pipeline = &self.config.pipeline;
        let cache = TranslationCache::new(pipeline.cache_ttl(), pipeline.max_cache_entries)
            .with_store(self.store.clone(), &self.config.storage.namespace);

        // The in-memory cache works without the stored entries
        let load = match cache.load_from_store().await {
            Ok(load) => load,
            Err(e) => {
                warn!("Could not restore translation cache: {}", e);
                StoreLoad::default()
            }
        };
        (cache, load)
    }

    /// Build the translation pipeline over `document`
    pub async fn build_pipeline(&self, document: SharedDocument) -> Result<TranslationPipeline> {
        let pipeline_config = &self.config.pipeline;

        let cache = self.open_cache().await;
        let limiter = Arc::new(SlidingWindowLimiter::new(
            pipeline_config.window(),
            pipeline_config.max_per_window,
        ));
        let queue = Arc::new(TranslationQueue::start(limiter, QueuePolicy::from(pipeline_config)));
        let ignore = DetectorConfig::parse_selectors(&self.config.detector.ignore_selectors)
            .context("Invalid ignore selector")?;

        Ok(TranslationPipeline::new(PipelineParts {
            document: document.clone(),
            cache,
            queue,
            provider: self.provider(),
            language_detector: self.language_detector(),
            dedup: Deduplicator::new(ignore),
            sink: ResultSink::new(document, pipeline_config.frame_interval()),
            settings: SettingsHandle::new(self.config.settings()),
        }))
    }

    /// Start detection and translation over `document`
    pub async fn start_session(&self, document: SharedDocument) -> Result<LiveSession> {
        let pipeline = self.build_pipeline(document.clone()).await?;
        let detector = ChangeDetector::from_config(document.clone(), &self.config.detector, &self.config.pipeline)
            .context("Invalid detector configuration")?;
        let batch = BatchTranslator::from_config(pipeline.clone(), detector.clone(), &self.config.pipeline);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pipeline_task = pipeline.spawn(events_rx);
        let detector_task = detector.spawn(events_tx);
        let cleanup_task = pipeline.cache().spawn_cleanup(self.config.pipeline.cleanup_interval());
        let reclaim_task = pipeline.spawn_reclaimer();

        info!(
            "Session started: {} -> {}, auto-translate {}",
            self.config.source_language,
            self.config.target_language,
            if self.config.auto_translate_enabled { "on" } else { "off" }
        );

        Ok(LiveSession {
            document,
            pipeline,
            detector,
            batch,
            detector_task,
            pipeline_task,
            cleanup_task,
            reclaim_task,
        })
    }

    /// Run a replay script against a fresh document
    pub async fn run_replay(&self, script: &ReplayScript) -> Result<ReplayReport> {
        let document = Document::shared();
        replay::seed(&document, script)?;

        let session = self.start_session(document).await?;
        let result = replay::execute(&session, script).await;
        let state = session.detector.state();
        session.shutdown().await?;

        let report = result?;
        if state == DetectorState::Failed {
            warn!("Content region was never found; nothing was translated");
        }
        Ok(report)
    }

    /// Load a replay script from a JSON file and run it
    pub async fn replay_file<P: AsRef<Path>>(&self, path: P) -> Result<ReplayReport> {
        let script = ReplayScript::from_file(path)?;
        self.run_replay(&script).await
    }

    /// Translate a single text through cache and queue
    pub async fn translate_text(&self, text: &str) -> Result<String> {
        let pipeline = self.build_pipeline(Document::shared()).await?;
        let translation = pipeline.translate_text(text).await?;
        pipeline
            .cache()
            .flush()
            .await
            .context("Failed to persist translation cache")?;
        Ok(translation)
    }

    /// Statistics of the stored cache
    pub async fn cache_stats(&self) -> CacheStats {
        self.open_cache().await.stats()
    }

    /// Remove every stored translation
    pub async fn clear_cache(&self) -> Result<()> {
        let cache = self.open_cache().await;
        cache.clear();
        cache.flush().await.context("Failed to persist translation cache")?;
        info!("Translation cache cleared");
        Ok(())
    }

    /// Remove expired translations from the store; returns the number removed
    pub async fn cleanup_cache(&self) -> Result<usize> {
        let (cache, load) = self.restore_cache().await;
        // Entries expired on disk were already left out when loading
        let removed = load.expired + cache.cleanup().await;
        cache.flush().await.context("Failed to persist translation cache")?;
        Ok(removed)
    }
}
