/*!
 * Mock provider implementations for testing.
 *
 * This module provides a mock provider that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds with a tagged translation
 * - `MockProvider::failing()` - Always fails with a service error
 * - `MockProvider::rate_limited(n)` - Reports quota exhaustion `n` times, then works
 * - `MockProvider::slow(ms)` - Succeeds after a delay
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::TranslationProvider;

/// A call the mock received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Always succeeds with `[target] text`
    Working,
    /// Always fails with a service error
    Failing,
    /// Always fails with a network error
    Unreachable,
    /// Reports quota exhaustion for the first `times` calls, then works
    RateLimited { times: usize },
    /// Always reports quota exhaustion
    AlwaysRateLimited,
    /// Succeeds after `delay_ms`
    Slow { delay_ms: u64 },
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    translations: Arc<HashMap<String, String>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            translations: Arc::new(HashMap::new()),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn unreachable() -> Self {
        Self::new(MockBehavior::Unreachable)
    }

    pub fn rate_limited(times: usize) -> Self {
        Self::new(MockBehavior::RateLimited { times })
    }

    pub fn always_rate_limited() -> Self {
        Self::new(MockBehavior::AlwaysRateLimited)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Answer `text` with a fixed translation instead of the tagged default
    pub fn with_translation(mut self, text: &str, translation: &str) -> Self {
        Arc::make_mut(&mut self.translations).insert(text.to_string(), translation.to_string());
        self
    }

    /// Number of calls received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    fn render(&self, text: &str, target_lang: &str) -> String {
        self.translations
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target_lang, text))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::working()
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.lock().push(MockCall {
            text: text.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        });

        match self.behavior {
            MockBehavior::Working => Ok(self.render(text, target_lang)),
            MockBehavior::Failing => Err(ProviderError::ServiceError("Mock provider failure".to_string())),
            MockBehavior::Unreachable => Err(ProviderError::NetworkError("Mock provider unreachable".to_string())),
            MockBehavior::RateLimited { times } if count <= times => {
                Err(ProviderError::RateLimited(format!("Mock quota exhausted (call {})", count)))
            }
            MockBehavior::RateLimited { .. } => Ok(self.render(text, target_lang)),
            MockBehavior::AlwaysRateLimited => Err(ProviderError::RateLimited("Mock quota exhausted".to_string())),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(self.render(text, target_lang))
            }
        }
    }
}
