/*!
 * End-to-end tests driving the controller with replay scripts
 */

use std::sync::Arc;

use serde_json::json;

use livetl::app_controller::Controller;
use livetl::detector::DetectorState;
use livetl::document::NodeSpec;
use livetl::providers::mock::MockProvider;
use livetl::replay::{ReplayScript, ReplayStep};
use livetl::sink::RenderKind;
use livetl::storage::{KeyValueStore, MemoryStore};

use crate::common::{chat_message, chat_region, init_test_logging, test_config, DAY};

fn controller(provider: &MockProvider, store: &MemoryStore) -> Controller {
    init_test_logging();
    Controller::with_store(test_config(), Arc::new(store.clone())).with_provider(Arc::new(provider.clone()))
}

fn append(id: &str, text: &str) -> ReplayStep {
    ReplayStep::Append {
        parent: Some("#chat".to_string()),
        node: chat_message(id, text),
    }
}

#[tokio::test(start_paused = true)]
async fn test_runReplay_liveMessages_shouldRenderTranslations() {
    let provider = MockProvider::working();
    let store = MemoryStore::new();
    let script = ReplayScript {
        document: vec![chat_region().child(chat_message("m1", "hello"))],
        steps: vec![append("m2", "good night"), ReplayStep::Settle],
        ..Default::default()
    };

    let report = controller(&provider, &store).run_replay(&script).await.unwrap();

    assert!(matches!(report.detector_state, DetectorState::Watching(_)));
    assert_eq!(report.entries.len(), 2);
    let rendered: Vec<(&str, &str)> = report
        .entries
        .iter()
        .map(|e| (e.original.as_str(), e.rendered.as_str()))
        .collect();
    assert_eq!(rendered, vec![("hello", "[zh] hello"), ("good night", "[zh] good night")]);
    assert!(report.of_kind(RenderKind::Translation).count() == 2);
    assert_eq!(report.provider_calls, 2);
}

#[tokio::test(start_paused = true)]
async fn test_runReplay_switchedOff_shouldLeaveNewMessagesUntranslated() {
    let provider = MockProvider::working();
    let store = MemoryStore::new();
    let script = ReplayScript {
        document: vec![chat_region().child(chat_message("m1", "hello"))],
        steps: vec![
            ReplayStep::Settle,
            ReplayStep::Settings {
                target_language: None,
                auto_translate_enabled: Some(false),
            },
            append("m2", "not now"),
            ReplayStep::Settle,
        ],
        ..Default::default()
    };

    let report = controller(&provider, &store).run_replay(&script).await.unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].original, "hello");
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_runReplay_translateAllAfterSwitchingBackOn_shouldPickUpSkippedMessages() {
    let provider = MockProvider::working();
    let store = MemoryStore::new();
    let script = ReplayScript {
        document: vec![chat_region().child(chat_message("m1", "hello"))],
        steps: vec![
            ReplayStep::Settle,
            ReplayStep::Settings {
                target_language: None,
                auto_translate_enabled: Some(false),
            },
            append("m2", "missed while off"),
            ReplayStep::Settle,
            ReplayStep::TranslateAll,
            ReplayStep::Settings {
                target_language: None,
                auto_translate_enabled: Some(true),
            },
            ReplayStep::TranslateAll,
            ReplayStep::Settle,
        ],
        ..Default::default()
    };

    let report = controller(&provider, &store).run_replay(&script).await.unwrap();

    assert_eq!(report.batches.len(), 2);
    assert_eq!(report.batches[0].submitted, 0);
    assert_eq!(report.batches[1].submitted, 1);
    assert_eq!(report.batches[1].translated, 1);
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.entries[1].rendered, "[zh] missed while off");
}

#[tokio::test(start_paused = true)]
async fn test_runReplay_toggle_shouldShowOriginal() {
    let provider = MockProvider::working();
    let store = MemoryStore::new();
    let script = ReplayScript {
        document: vec![chat_region().child(chat_message("m1", "hello"))],
        steps: vec![
            ReplayStep::Settle,
            ReplayStep::Toggle {
                selector: "#m1 [class*=\"markup_\"]".to_string(),
            },
        ],
        ..Default::default()
    };

    let report = controller(&provider, &store).run_replay(&script).await.unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].kind, RenderKind::Original);
    assert_eq!(report.entries[0].rendered, "hello");
}

#[tokio::test(start_paused = true)]
async fn test_runReplay_secondSession_shouldReuseStoredCache() {
    let provider = MockProvider::working();
    let store = MemoryStore::new();
    let script = ReplayScript {
        document: vec![chat_region().child(chat_message("m1", "see you"))],
        steps: vec![ReplayStep::Settle],
        ..Default::default()
    };

    let controller = controller(&provider, &store);
    controller.run_replay(&script).await.unwrap();
    assert_eq!(provider.request_count(), 1);
    let saved = store.snapshot("translationCache").unwrap();
    assert!(saved.get("en:zh:see you").is_some());

    let report = controller.run_replay(&script).await.unwrap();
    assert_eq!(provider.request_count(), 1);
    assert_eq!(report.entries[0].rendered, "[zh] see you");
    assert_eq!(report.cache.hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_runReplay_withoutRegion_shouldReportFailedDetection() {
    let provider = MockProvider::working();
    let store = MemoryStore::new();
    let mut config = test_config();
    config.pipeline.detector_max_attempts = 2;
    config.pipeline.detector_backoff_ms = 100;
    let controller = Controller::with_store(config, Arc::new(store)).with_provider(Arc::new(provider.clone()));

    let script = ReplayScript {
        document: vec![NodeSpec::element("main").child(chat_message("m1", "lost"))],
        steps: vec![ReplayStep::Wait { ms: 500 }],
        ..Default::default()
    };

    let report = controller.run_replay(&script).await.unwrap();

    assert_eq!(report.detector_state, DetectorState::Failed);
    assert!(report.entries.is_empty());
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_runReplay_unknownSelector_shouldFail() {
    let provider = MockProvider::working();
    let store = MemoryStore::new();
    let script = ReplayScript {
        steps: vec![ReplayStep::Remove {
            selector: "#missing".to_string(),
        }],
        ..Default::default()
    };

    let result = controller(&provider, &store).run_replay(&script).await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_replayFile_shouldLoadJsonScript() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let script = json!({
        "document": [{"tag": "ol", "attributes": {"aria-label": "Messages", "id": "chat"}}],
        "steps": [
            {"action": "append", "parent": "#chat", "node": {"tag": "li", "children": [
                {"tag": "div", "attributes": {"class": "markup_1"}, "text": "hi from file"}
            ]}},
            {"action": "settle"}
        ]
    });
    std::fs::write(&path, serde_json::to_string_pretty(&script).unwrap()).unwrap();

    let provider = MockProvider::working();
    let report = controller(&provider, &MemoryStore::new()).replay_file(&path).await.unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].rendered, "[zh] hi from file");
    assert!(report.to_string().contains("[translation] hi from file => [zh] hi from file"));
}

#[tokio::test(start_paused = true)]
async fn test_translateText_andCacheCommands_shouldShareStore() {
    let provider = MockProvider::working();
    let store = MemoryStore::new();
    let controller = controller(&provider, &store);

    assert_eq!(controller.translate_text("thank you").await.unwrap(), "[zh] thank you");
    assert_eq!(controller.translate_text("thank you").await.unwrap(), "[zh] thank you");
    assert_eq!(provider.request_count(), 1);
    assert_eq!(controller.cache_stats().await.entries, 1);

    assert_eq!(controller.cleanup_cache().await.unwrap(), 0);
    controller.clear_cache().await.unwrap();
    assert_eq!(controller.cache_stats().await.entries, 0);
}

#[tokio::test]
async fn test_cleanupCache_withStaleStoredEntry_shouldCountAndDropIt() {
    let store = MemoryStore::new();
    let now = chrono::Utc::now().timestamp_millis();
    let stale = now - 3 * DAY.as_millis() as i64;
    store
        .save(
            "translationCache",
            json!({
                "en:zh:stale": {"translation": "旧", "createdAt": stale, "lastAccessedAt": stale},
                "en:zh:fresh": {"translation": "新", "createdAt": now, "lastAccessedAt": now}
            }),
        )
        .await
        .unwrap();
    let controller = controller(&MockProvider::working(), &store);

    assert_eq!(controller.cleanup_cache().await.unwrap(), 1);

    let stored = store.snapshot("translationCache").unwrap();
    let keys: Vec<&String> = stored.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["en:zh:fresh"]);
    assert_eq!(controller.cache_stats().await.entries, 1);
}
