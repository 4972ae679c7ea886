use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

use super::{network_error, TranslationProvider};
use crate::errors::ProviderError;

/// Client for the Google translate `gtx` endpoint
#[derive(Debug)]
pub struct GoogleTranslate {
    client: Client,
    endpoint: String,
}

impl GoogleTranslate {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }

    pub fn request_url(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ProviderError::ServiceError(format!("Invalid Google endpoint '{}': {}", self.endpoint, e)))?;
        url.query_pairs_mut()
            .append_pair("client", "gtx")
            .append_pair("sl", source_lang)
            .append_pair("tl", target_lang)
            .append_pair("dt", "t")
            .append_pair("q", text);
        Ok(url)
    }

    /// Join the translated segments of a `gtx` response.
    ///
    /// The payload is a nested array whose first element lists
    /// `[translated, original, ...]` segments.
    pub fn extract_text(body: &Value) -> Result<String, ProviderError> {
        let segments = body
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::ServiceError("Unexpected Google response shape".to_string()))?;

        let text: String = segments
            .iter()
            .filter_map(|segment| segment.get(0).and_then(Value::as_str))
            .collect();

        if text.is_empty() {
            return Err(ProviderError::ServiceError("Google returned an empty translation".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl TranslationProvider for GoogleTranslate {
    fn name(&self) -> &str {
        "Google"
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        let url = self.request_url(text, source_lang, target_lang)?;
        debug!("Google request {} -> {} ({} chars)", source_lang, target_lang, text.chars().count());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error("Google", e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(format!("Google HTTP {}", status)));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Google translate error ({}): {}", status, error_text);
            return Err(ProviderError::ServiceError(format!("Google translate error ({})", status)));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::ServiceError(format!("Failed to parse Google response: {}", e)))?;

        Self::extract_text(&body)
    }
}
