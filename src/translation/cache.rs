/*!
 * Translation caching functionality.
 *
 * Translations are cached by `(source language, target language, text)` with a
 * time-to-live and a bounded size. When the cache is full, the entry that was
 * least recently read is evicted first. The cache is mirrored to a durable
 * `KeyValueStore` in the background; the in-memory map stays authoritative and
 * a failed write is only logged.
 */

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::errors::CacheIoError;
use crate::storage::KeyValueStore;

/// Expired entries removed per critical section during a sweep
const CLEANUP_BATCH_SIZE: usize = 100;

/// Source of wall-clock time in epoch milliseconds
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> i64;
}

/// The real clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Cache key combining source language, target language and the exact text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_lang: String,
    pub target_lang: String,
    pub text: String,
}

impl CacheKey {
    pub fn new(source_lang: &str, target_lang: &str, text: &str) -> Self {
        Self {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            text: text.to_string(),
        }
    }

    /// Flat form used in the persisted map
    fn storage_key(&self) -> String {
        format!("{}:{}:{}", self.source_lang, self.target_lang, self.text)
    }

    fn from_storage_key(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let source_lang = parts.next()?;
        let target_lang = parts.next()?;
        let text = parts.next()?;
        Some(Self::new(source_lang, target_lang, text))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({} -> {})", truncate_text(&self.text, 30), self.source_lang, self.target_lang)
    }
}

/// A cached translation with its timestamps (epoch milliseconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub translation: String,
    pub created_at: i64,
    pub last_accessed_at: i64,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    // Insertion order, breaks ties between equal access times
    seq: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, Slot>,
    next_seq: u64,
    hits: usize,
    misses: usize,
}

impl CacheState {
    fn evict_least_recently_accessed(&mut self) -> Option<CacheKey> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| (slot.entry.last_accessed_at, slot.seq))
            .map(|(key, _)| key.clone())?;
        self.entries.remove(&victim);
        Some(victim)
    }

    fn to_value(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .entries
            .iter()
            .filter_map(|(key, slot)| {
                serde_json::to_value(&slot.entry).ok().map(|v| (key.storage_key(), v))
            })
            .collect();
        Value::Object(map)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entries: {}, Hits: {}, Misses: {}, Hit rate: {:.1}%",
            self.entries,
            self.hits,
            self.misses,
            self.hit_rate * 100.0
        )
    }
}

/// Outcome of restoring the cache from its store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreLoad {
    /// Entries now held in memory
    pub loaded: usize,
    /// Stored entries past their TTL, left out
    pub expired: usize,
}

/// Translation cache for storing and retrieving translations
#[derive(Clone)]
pub struct TranslationCache {
    state: Arc<Mutex<CacheState>>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn KeyValueStore>>,
    namespace: String,
    dirty: Arc<AtomicBool>,
    persist_lock: Arc<tokio::sync::Mutex<()>>,
}

impl fmt::Debug for TranslationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl TranslationCache {
    /// Create an in-memory cache using the system clock
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            ttl,
            max_entries: max_entries.max(1),
            clock: Arc::new(SystemClock),
            store: None,
            namespace: "translationCache".to_string(),
            dirty: Arc::new(AtomicBool::new(false)),
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Use a different clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mirror the cache into `store` under `namespace`
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
        self.store = Some(store);
        self.namespace = namespace.to_string();
        self
    }

    fn ttl_ms(&self) -> i64 {
        self.ttl.as_millis() as i64
    }

    fn is_expired(&self, entry: &CacheEntry, now: i64) -> bool {
        now - entry.created_at > self.ttl_ms()
    }

    /// Get a translation; a hit refreshes the entry's access time
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let ttl_ms = self.ttl_ms();

        let hit = match state.entries.get_mut(key) {
            Some(slot) if now - slot.entry.created_at <= ttl_ms => {
                slot.entry.last_accessed_at = now;
                Some(slot.entry.translation.clone())
            }
            _ => None,
        };

        match hit {
            Some(translation) => {
                state.hits += 1;
                debug!("Cache hit for {}", key);
                Some(translation)
            }
            None => {
                state.misses += 1;
                debug!("Cache miss for {}", key);
                None
            }
        }
    }

    /// Look up several keys at once
    pub fn get_many(&self, keys: &[CacheKey]) -> Vec<Option<String>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Store a translation, evicting the least recently accessed entry when full
    pub fn set(&self, key: CacheKey, translation: &str) {
        self.insert_locked(std::iter::once((key, translation.to_string())));
        self.persist();
    }

    /// Store several translations with a single background write
    pub fn set_many(&self, items: Vec<(CacheKey, String)>) {
        if items.is_empty() {
            return;
        }
        self.insert_locked(items);
        self.persist();
    }

    fn insert_locked(&self, items: impl IntoIterator<Item = (CacheKey, String)>) {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        for (key, translation) in items {
            if let Some(slot) = state.entries.get_mut(&key) {
                slot.entry = CacheEntry {
                    translation,
                    created_at: now,
                    last_accessed_at: now,
                };
                debug!("Updated cached translation for {}", key);
                continue;
            }

            while state.entries.len() >= self.max_entries {
                match state.evict_least_recently_accessed() {
                    Some(evicted) => debug!("Evicted {} from cache", evicted),
                    None => break,
                }
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            debug!("Cached translation for {}", key);
            state.entries.insert(
                key,
                Slot {
                    entry: CacheEntry {
                        translation,
                        created_at: now,
                        last_accessed_at: now,
                    },
                    seq,
                },
            );
        }
    }

    /// Schedule a background write of the current contents.
    ///
    /// Writes are serialized and each one saves the latest state, so a burst of
    /// updates collapses into as few writes as possible.
    fn persist(&self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, skipping cache persistence");
            return;
        };

        self.dirty.store(true, Ordering::SeqCst);
        let cache = self.clone();
        handle.spawn(async move {
            let _guard = cache.persist_lock.lock().await;
            if !cache.dirty.swap(false, Ordering::SeqCst) {
                return;
            }
            let snapshot = cache.state.lock().to_value();
            if let Err(e) = store.save(&cache.namespace, snapshot).await {
                warn!("Failed to persist translation cache: {}", e);
            }
        });
    }

    /// Write the current contents now and wait for the result
    pub async fn flush(&self) -> Result<(), CacheIoError> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;
        self.dirty.store(false, Ordering::SeqCst);
        let snapshot = self.state.lock().to_value();
        store.save(&self.namespace, snapshot).await
    }

    /// Restore entries from the store, skipping expired ones.
    ///
    /// Expired entries stay in the store until the next write.
    pub async fn load_from_store(&self) -> Result<StoreLoad, CacheIoError> {
        let Some(store) = self.store.clone() else {
            return Ok(StoreLoad::default());
        };
        let Some(value) = store.load(&self.namespace).await? else {
            return Ok(StoreLoad::default());
        };

        let raw: HashMap<String, CacheEntry> = serde_json::from_value(value)?;
        let now = self.clock.now_ms();
        let (mut restored, expired): (Vec<(CacheKey, CacheEntry)>, Vec<(CacheKey, CacheEntry)>) = raw
            .into_iter()
            .filter_map(|(k, entry)| CacheKey::from_storage_key(&k).map(|key| (key, entry)))
            .partition(|(_, entry)| !self.is_expired(entry, now));

        // Oldest first, so insertion order approximates the original one
        restored.sort_by(|a, b| {
            (a.1.created_at, &a.0.text).cmp(&(b.1.created_at, &b.0.text))
        });
        // Keep the most recently used when the store holds more than fits
        if restored.len() > self.max_entries {
            restored.sort_by_key(|(_, entry)| std::cmp::Reverse(entry.last_accessed_at));
            restored.truncate(self.max_entries);
            restored.sort_by_key(|(_, entry)| entry.created_at);
        }

        let mut state = self.state.lock();
        let count = restored.len();
        for (key, entry) in restored {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(key, Slot { entry, seq });
        }

        info!("Loaded {} cached translations from store ({} expired)", count, expired.len());
        Ok(StoreLoad {
            loaded: count,
            expired: expired.len(),
        })
    }

    /// Remove expired entries, yielding between batches.
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<CacheKey> = {
            let state = self.state.lock();
            state
                .entries
                .iter()
                .filter(|(_, slot)| self.is_expired(&slot.entry, now))
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut removed = 0;
        for batch in expired.chunks(CLEANUP_BATCH_SIZE) {
            {
                let mut state = self.state.lock();
                for key in batch {
                    // Re-check: the entry may have been rewritten since the scan
                    let still_expired = state
                        .entries
                        .get(key)
                        .is_some_and(|slot| self.is_expired(&slot.entry, now));
                    if still_expired {
                        state.entries.remove(key);
                        removed += 1;
                    }
                }
            }
            tokio::task::yield_now().await;
        }

        if removed > 0 {
            info!("Cache cleanup removed {} expired entries", removed);
            self.persist();
        }
        removed
    }

    /// Run `cleanup` every `interval` until the handle is aborted
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup().await;
            }
        })
    }

    /// Peek at an entry without counting or refreshing it
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let total = state.hits + state.misses;
        let hit_rate = if total > 0 {
            state.hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            hit_rate,
        }
    }

    /// Clear the cache and its counters
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.entries.clear();
            state.hits = 0;
            state.misses = 0;
        }
        debug!("Translation cache cleared");
        self.persist();
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

/// Truncate text to a maximum number of characters with ellipsis
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
