/*!
 * Tests for error types
 */

use livetl::errors::{AppError, CacheIoError, DetectionError, DocumentError, ProviderError, SelectorError, TranslationError};
use livetl::document::Selector;

#[test]
fn test_providerError_isRateLimited_shouldOnlyMatchQuotaErrors() {
    assert!(ProviderError::RateLimited("429".to_string()).is_rate_limited());
    assert!(!ProviderError::NetworkError("timeout".to_string()).is_rate_limited());
    assert!(!ProviderError::ServiceError("bad payload".to_string()).is_rate_limited());
}

#[test]
fn test_translationError_fromProviderError_shouldWrap() {
    let error: TranslationError = ProviderError::ServiceError("boom".to_string()).into();
    assert_eq!(error, TranslationError::Provider(ProviderError::ServiceError("boom".to_string())));
    assert_eq!(error.to_string(), "Provider error: Service error: boom");
}

#[test]
fn test_errorMessages_shouldNameTheCounts() {
    assert_eq!(
        TranslationError::ServiceUnavailable { attempts: 13 }.to_string(),
        "Translation service unavailable after 13 rate-limited attempts"
    );
    assert_eq!(
        DetectionError::RegionNotFound { attempts: 10 }.to_string(),
        "Content region not found after 10 attempts"
    );
}

#[test]
fn test_selectorError_shouldCarryTheSelector() {
    let error = Selector::parse("div > ").unwrap_err();
    match &error {
        SelectorError::Invalid { selector, .. } => assert_eq!(selector, "div > "),
    }
    assert!(error.to_string().contains("div > "));
}

#[test]
fn test_cacheIoError_fromSerdeError_shouldConvert() {
    let serde_error = serde_json::from_str::<u32>("not json").unwrap_err();
    let error: CacheIoError = serde_error.into();
    assert!(matches!(error, CacheIoError::Serialization(_)));
}

#[test]
fn test_appError_fromSources_shouldConvert() {
    let from_anyhow: AppError = anyhow::anyhow!("something odd").into();
    assert!(matches!(from_anyhow, AppError::Unknown(_)));

    let from_io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
    assert!(matches!(from_io, AppError::File(_)));

    let from_provider: AppError = ProviderError::NetworkError("down".to_string()).into();
    assert!(matches!(from_provider, AppError::Provider(_)));
}

#[test]
fn test_appError_fromAnyhowChain_shouldRecoverTypedError() {
    let translation = anyhow::Error::new(TranslationError::ServiceUnavailable { attempts: 4 })
        .context("Translating 'hi' failed");
    let error = AppError::from(translation);
    assert!(matches!(error, AppError::Translation(TranslationError::ServiceUnavailable { attempts: 4 })));
    assert_eq!(error.exit_code(), 3);

    let io = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::NotFound, "script.json"));
    let error = AppError::from(io);
    assert!(matches!(error, AppError::File(_)));
    assert_eq!(error.exit_code(), 2);

    let detection: AppError = anyhow::Error::new(DetectionError::RegionNotFound { attempts: 10 }).into();
    assert_eq!(detection.exit_code(), 4);

    let other = AppError::from(anyhow::anyhow!("bad script").context("Failed to load replay"));
    assert_eq!(other.to_string(), "Unknown error: Failed to load replay: bad script");
    assert_eq!(other.exit_code(), 1);
}

#[test]
fn test_documentError_shouldDisplayNode() {
    let document = livetl::document::Document::new();
    let body = document.body();
    let error = document.remove(body).unwrap_err();
    assert_eq!(error, DocumentError::Hierarchy(body));
}
