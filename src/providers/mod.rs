/*!
 * Provider implementations for different translation services.
 *
 * This module contains client implementations for the supported services:
 * - MyMemory: public translation memory API
 * - Google: the keyless `gtx` web endpoint
 * - Mock: offline provider with scripted behavior, for tests and dry runs
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{ProviderConfig, ProviderKind};
use crate::errors::ProviderError;

/// Source language value asking the service to detect the language itself
pub const AUTO_LANGUAGE: &str = "auto";

/// Common trait for all translation services
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably by the pipeline.
#[async_trait]
pub trait TranslationProvider: Send + Sync + Debug {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    /// Translate `text` from `source_lang` (possibly `"auto"`) to `target_lang`
    ///
    /// # Returns
    /// * `Result<String, ProviderError>` - The translated text, or one of
    ///   `RateLimited`, `NetworkError`, `ServiceError`
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError>;
}

/// Map a reqwest transport error
pub(crate) fn network_error(provider: &str, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::NetworkError(format!("{} request timed out: {}", provider, error))
    } else {
        ProviderError::NetworkError(format!("Failed to send request to {}: {}", provider, error))
    }
}

/// Build the provider selected by the configuration
pub fn create_provider(config: &ProviderConfig, request_timeout: Duration) -> Arc<dyn TranslationProvider> {
    match config.kind {
        ProviderKind::MyMemory => Arc::new(mymemory::MyMemory::new(
            config.get_endpoint(),
            config.email.clone(),
            request_timeout,
        )),
        ProviderKind::Google => Arc::new(google::GoogleTranslate::new(config.get_endpoint(), request_timeout)),
        ProviderKind::Mock => Arc::new(mock::MockProvider::working()),
    }
}

pub mod google;
pub mod mock;
pub mod mymemory;
