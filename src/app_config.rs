use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use crate::document::Selector;
use crate::language_utils;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code, or "auto" to detect it per text
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Whether newly detected content is translated automatically
    #[serde(default = "default_true")]
    pub auto_translate_enabled: bool,

    /// Pipeline tunables
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Translation provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Region and content discovery settings
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Cache persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    // @provider: MyMemory public API
    #[default]
    MyMemory,
    // @provider: Google translate `gtx` endpoint
    Google,
    // @provider: Offline mock (prefixes the text)
    Mock,
}

impl ProviderKind {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::MyMemory => "MyMemory",
            Self::Google => "Google",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::MyMemory => "mymemory".to_string(),
            Self::Google => "google".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }
}

// Implement Display trait for ProviderKind
impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

// Implement FromStr trait for ProviderKind
impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mymemory" => Ok(Self::MyMemory),
            "google" => Ok(Self::Google),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Provider type
    #[serde(rename = "type", default)]
    pub kind: ProviderKind,

    /// Service endpoint URL; empty means the provider's public endpoint
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// Contact email sent to MyMemory to raise the anonymous daily quota
    #[serde(default)]
    pub email: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            endpoint: String::new(),
            email: None,
        }
    }
}

impl ProviderConfig {
    /// Get the endpoint, falling back to the provider's public one
    pub fn get_endpoint(&self) -> String {
        if !self.endpoint.is_empty() {
            return self.endpoint.clone();
        }

        match self.kind {
            ProviderKind::MyMemory => default_mymemory_endpoint(),
            ProviderKind::Google => default_google_endpoint(),
            ProviderKind::Mock => String::new(),
        }
    }
}

/// Tunables for the cache, rate limiter, queue, detector and sink
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Sliding window length for admission control
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests admitted per window
    #[serde(default = "default_max_per_window")]
    pub max_per_window: usize,

    /// Cache entry time-to-live
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Maximum number of cache entries
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,

    /// Region discovery attempts before detection is abandoned
    #[serde(default = "default_detector_max_attempts")]
    pub detector_max_attempts: u32,

    /// Delay between region discovery attempts
    #[serde(default = "default_detector_backoff_ms")]
    pub detector_backoff_ms: u64,

    /// Wait after a rate-limited provider response before retrying
    #[serde(default = "default_retry_cooldown_ms")]
    pub retry_cooldown_ms: u64,

    /// Total cooldown a single task may accumulate before it is reported unavailable
    #[serde(default = "default_max_quota_wait_ms")]
    pub max_quota_wait_ms: u64,

    /// Upper bound for a single provider call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Interval of the expired-entry sweep
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Length of one presentation frame for batched result application
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Items per batch when translating existing content
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches when translating existing content
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_per_window: default_max_per_window(),
            cache_ttl_ms: default_cache_ttl_ms(),
            max_cache_entries: default_max_cache_entries(),
            detector_max_attempts: default_detector_max_attempts(),
            detector_backoff_ms: default_detector_backoff_ms(),
            retry_cooldown_ms: default_retry_cooldown_ms(),
            max_quota_wait_ms: default_max_quota_wait_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn detector_backoff(&self) -> Duration {
        Duration::from_millis(self.detector_backoff_ms)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_cooldown_ms)
    }

    pub fn max_quota_wait(&self) -> Duration {
        Duration::from_millis(self.max_quota_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Accessible labels the region may carry in one locale
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RegionLabels {
    /// Locale the labels belong to
    pub locale: String,
    /// Label values, tried in order
    pub labels: Vec<String>,
}

impl RegionLabels {
    fn new(locale: &str, labels: &[&str]) -> Self {
        Self {
            locale: locale.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Region and content discovery configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Accessible labels of the region, per locale, tried first
    #[serde(default = "default_region_labels")]
    pub region_labels: Vec<RegionLabels>,

    /// Structural selectors for the region, tried after the labels
    #[serde(default = "default_region_selectors")]
    pub region_selectors: Vec<String>,

    /// Selectors identifying content-bearing nodes
    #[serde(default = "default_content_selectors")]
    pub content_selectors: Vec<String>,

    /// Containers whose content is never translated
    #[serde(default = "default_ignore_selectors")]
    pub ignore_selectors: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            region_labels: default_region_labels(),
            region_selectors: default_region_selectors(),
            content_selectors: default_content_selectors(),
            ignore_selectors: default_ignore_selectors(),
        }
    }
}

impl DetectorConfig {
    /// Parse a list of selector strings
    pub fn parse_selectors(selectors: &[String]) -> Result<Vec<Selector>> {
        selectors
            .iter()
            .map(|s| Selector::parse(s).map_err(|e| anyhow!(e)))
            .collect()
    }
}

/// Cache store backend
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite file under the user data directory (or `path`)
    #[default]
    Sqlite,
    /// Process memory only; nothing survives a restart
    Memory,
}

/// Cache persistence configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Store backend
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database file; the default location is used when absent
    #[serde(default)]
    pub path: Option<String>,

    /// Namespace the cache is saved under
    #[serde(default = "default_cache_namespace")]
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: None,
            namespace: default_cache_namespace(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    "auto".to_string()
}

fn default_target_language() -> String {
    "zh".to_string()
}

fn default_true() -> bool {
    true
}

fn default_window_ms() -> u64 {
    1000
}

fn default_max_per_window() -> usize {
    5
}

fn default_cache_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_max_cache_entries() -> usize {
    1000
}

fn default_detector_max_attempts() -> u32 {
    10
}

fn default_detector_backoff_ms() -> u64 {
    2000
}

fn default_retry_cooldown_ms() -> u64 {
    5000
}

fn default_max_quota_wait_ms() -> u64 {
    60_000 // twelve cooldowns at the default 5s
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_cleanup_interval_ms() -> u64 {
    60 * 60 * 1000
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_mymemory_endpoint() -> String {
    "https://api.mymemory.translated.net/get".to_string()
}

fn default_google_endpoint() -> String {
    "https://translate.googleapis.com/translate_a/single".to_string()
}

fn default_cache_namespace() -> String {
    "translationCache".to_string()
}

fn default_region_labels() -> Vec<RegionLabels> {
    vec![
        RegionLabels::new("en", &["Messages", "Message area", "Chat content"]),
        RegionLabels::new("zh", &["消息", "消息区域", "聊天内容"]),
        RegionLabels::new("ja", &["メッセージ", "メッセージエリア"]),
        RegionLabels::new("ko", &["메시지", "메시지 영역"]),
        RegionLabels::new("es", &["Mensajes", "Área de mensajes"]),
        RegionLabels::new("fr", &["Messages", "Zone de messages"]),
        RegionLabels::new("de", &["Nachrichten", "Nachrichtenbereich"]),
    ]
}

fn default_region_selectors() -> Vec<String> {
    vec![
        "[data-list-id=\"chat-messages\"]".to_string(),
        "[class*=\"messagesWrapper\"]".to_string(),
        "[class*=\"scroller-\"]".to_string(),
        "[class*=\"chat-\"]".to_string(),
        "[class*=\"chatContent-\"]".to_string(),
    ]
}

fn default_content_selectors() -> Vec<String> {
    vec![
        ".messageContent-2t3eCI".to_string(),
        "[class*=\"messageContent\"]".to_string(),
        "[class*=\"markup_\"]".to_string(),
        "[class*=\"contents-\"] > [class*=\"message\"]".to_string(),
    ]
}

fn default_ignore_selectors() -> Vec<String> {
    vec!["[class*=\"systemMessage-\"]".to_string()]
}

impl Config {
    /// Load the configuration from `path`, writing a default one when the file is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save_to_file(path)?;
        Ok(config)
    }

    /// Load the configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).context(format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .context(format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save the configuration as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json)
            .context(format!("Failed to write config to file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.source_language != "auto" {
            language_utils::validate_language_tag(&self.source_language)
                .context("Invalid source language")?;
        }
        language_utils::validate_language_tag(&self.target_language).context("Invalid target language")?;

        let pipeline = &self.pipeline;
        if pipeline.window_ms == 0 {
            return Err(anyhow!("pipeline.window_ms must be greater than zero"));
        }
        if pipeline.max_per_window == 0 {
            return Err(anyhow!("pipeline.max_per_window must be at least 1"));
        }
        if pipeline.max_cache_entries == 0 {
            return Err(anyhow!("pipeline.max_cache_entries must be at least 1"));
        }
        if pipeline.detector_max_attempts == 0 {
            return Err(anyhow!("pipeline.detector_max_attempts must be at least 1"));
        }
        if pipeline.batch_size == 0 {
            return Err(anyhow!("pipeline.batch_size must be at least 1"));
        }
        if pipeline.request_timeout_ms == 0 {
            return Err(anyhow!("pipeline.request_timeout_ms must be greater than zero"));
        }

        let detector = &self.detector;
        if detector.content_selectors.is_empty() {
            return Err(anyhow!("detector.content_selectors must not be empty"));
        }
        DetectorConfig::parse_selectors(&detector.region_selectors).context("Invalid region selector")?;
        DetectorConfig::parse_selectors(&detector.content_selectors).context("Invalid content selector")?;
        DetectorConfig::parse_selectors(&detector.ignore_selectors).context("Invalid ignore selector")?;

        Ok(())
    }

    /// The settings snapshot the pipeline starts with
    pub fn settings(&self) -> crate::settings::Settings {
        crate::settings::Settings {
            target_language: self.target_language.clone(),
            auto_translate_enabled: self.auto_translate_enabled,
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            auto_translate_enabled: true,
            pipeline: PipelineConfig::default(),
            provider: ProviderConfig::default(),
            detector: DetectorConfig::default(),
            storage: StorageConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
