use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{network_error, TranslationProvider, AUTO_LANGUAGE};
use crate::errors::ProviderError;

/// Marker MyMemory puts in `responseDetails` once the daily quota is used up
const QUOTA_WARNING: &str = "MYMEMORY WARNING";

/// MyMemory client
#[derive(Debug)]
pub struct MyMemory {
    /// HTTP client for API requests
    client: Client,
    /// API endpoint URL
    endpoint: String,
    /// Contact email, raises the anonymous daily quota
    email: Option<String>,
}

/// MyMemory `get` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyMemoryResponse {
    /// Translation payload
    #[serde(default)]
    pub response_data: Option<MyMemoryData>,

    /// Status code, sent as a number or a string depending on the error path
    #[serde(default)]
    pub response_status: Value,

    /// Free-form details, carries the quota warning
    #[serde(default)]
    pub response_details: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyMemoryData {
    #[serde(default)]
    pub translated_text: Option<String>,
}

impl MyMemoryResponse {
    fn status(&self) -> Option<u64> {
        match &self.response_status {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn is_quota_exhausted(&self) -> bool {
        self.status() == Some(429)
            || self
                .response_details
                .as_deref()
                .is_some_and(|details| details.contains(QUOTA_WARNING))
    }

    /// Classify the payload into a translation or a provider error
    pub fn into_result(self) -> Result<String, ProviderError> {
        if self.is_quota_exhausted() {
            return Err(ProviderError::RateLimited(
                self.response_details.unwrap_or_else(|| "MyMemory quota exhausted".to_string()),
            ));
        }

        let status = self.status();
        let text = self
            .response_data
            .and_then(|data| data.translated_text)
            .filter(|text| !text.is_empty());

        match (status, text) {
            (Some(200), Some(text)) => Ok(text),
            (status, _) => Err(ProviderError::ServiceError(format!(
                "Unexpected MyMemory response (status {:?}): {}",
                status,
                self.response_details.unwrap_or_default()
            ))),
        }
    }
}

impl MyMemory {
    /// Create a new MyMemory client
    pub fn new(endpoint: impl Into<String>, email: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            endpoint: endpoint.into(),
            email,
        }
    }

    /// Build the request URL for one translation
    pub fn request_url(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<Url, ProviderError> {
        let source = if source_lang == AUTO_LANGUAGE {
            "Autodetect"
        } else {
            source_lang
        };

        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ProviderError::ServiceError(format!("Invalid MyMemory endpoint '{}': {}", self.endpoint, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", text);
            query.append_pair("langpair", &format!("{}|{}", source, target_lang));
            if let Some(email) = &self.email {
                query.append_pair("de", email);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl TranslationProvider for MyMemory {
    fn name(&self) -> &str {
        "MyMemory"
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, ProviderError> {
        let url = self.request_url(text, source_lang, target_lang)?;
        debug!("MyMemory request {} -> {} ({} chars)", source_lang, target_lang, text.chars().count());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error("MyMemory", e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(format!("MyMemory HTTP {}", status)));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("MyMemory API error ({}): {}", status, error_text);
            return Err(ProviderError::ServiceError(format!("MyMemory API error ({}): {}", status, error_text)));
        }

        let body = response
            .json::<MyMemoryResponse>()
            .await
            .map_err(|e| ProviderError::ServiceError(format!("Failed to parse MyMemory response: {}", e)))?;

        body.into_result()
    }
}
