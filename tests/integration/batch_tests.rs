/*!
 * Integration tests for batch translation of existing content
 */

use std::time::Duration;

use tokio::time::Instant;

use livetl::app_config::{DetectorConfig, PipelineConfig};
use livetl::detector::{ChangeDetector, RegionHandle};
use livetl::providers::mock::MockProvider;
use livetl::settings::Settings;
use livetl::translation::{BatchSummary, BatchTranslator, EventOutcome};

use crate::common::PipelineHarness;

fn batch_translator(harness: &PipelineHarness, batch_size: usize) -> BatchTranslator {
    let detector = ChangeDetector::from_config(
        harness.document.clone(),
        &DetectorConfig::default(),
        &PipelineConfig::default(),
    )
    .unwrap();
    BatchTranslator::new(harness.pipeline.clone(), detector, batch_size, Duration::from_millis(1000))
}

#[tokio::test(start_paused = true)]
async fn test_translateExisting_sevenItems_shouldRunTwoBatches() {
    let harness = PipelineHarness::new(MockProvider::working());
    let rows: Vec<(String, String)> = (1..=7).map(|i| (format!("m{}", i), format!("message {}", i))).collect();
    let rows: Vec<(&str, &str)> = rows.iter().map(|(id, text)| (id.as_str(), text.as_str())).collect();
    let region = harness.with_region(&rows);
    let started = Instant::now();

    let summary = batch_translator(&harness, 5)
        .translate_existing(RegionHandle { node: region, generation: 1 })
        .await;

    assert_eq!(
        summary,
        BatchSummary {
            submitted: 7,
            translated: 7,
            cached: 0,
            failed: 0,
            skipped: 0,
            batches: 2,
        }
    );
    assert_eq!(harness.provider.request_count(), 7);
    // One pause between the two batches
    assert!(Instant::now() - started >= Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_translateExisting_shouldSkipAlreadyProcessedContent() {
    let harness = PipelineHarness::new(MockProvider::working());
    let region = harness.with_region(&[("m1", "one"), ("m2", "two"), ("m3", "three")]);

    let outcome = harness.pipeline.handle_event(harness.event("m2")).await;
    assert_eq!(outcome, EventOutcome::Translated("[zh] two".to_string()));

    let summary = batch_translator(&harness, 5)
        .translate_existing(RegionHandle { node: region, generation: 1 })
        .await;

    assert_eq!(summary.submitted, 2);
    assert_eq!(summary.translated, 2);
    assert_eq!(summary.batches, 1);
    assert_eq!(harness.provider.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_translateExisting_withRepeatsAndSameLanguage_shouldCountEachOutcome() {
    let harness = PipelineHarness::new(MockProvider::working());
    let region = harness.with_region(&[("m1", "hello"), ("m2", "hello"), ("m3", "你好")]);

    let summary = batch_translator(&harness, 1)
        .translate_existing(RegionHandle { node: region, generation: 1 })
        .await;

    assert_eq!(summary.submitted, 3);
    assert_eq!(summary.translated, 1);
    assert_eq!(summary.cached, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.batches, 3);
    assert_eq!(harness.provider.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_translateExisting_withAutoTranslateOff_shouldRefuse() {
    let harness = PipelineHarness::new(MockProvider::working());
    let region = harness.with_region(&[("m1", "hello"), ("m2", "good night")]);
    harness.pipeline.settings().update(Settings {
        target_language: "zh".to_string(),
        auto_translate_enabled: false,
    });

    let summary = batch_translator(&harness, 5)
        .translate_existing(RegionHandle { node: region, generation: 1 })
        .await;

    assert_eq!(summary, BatchSummary::default());
    assert_eq!(harness.provider.request_count(), 0);
    assert!(!harness.pipeline.dedup().is_processed(harness.content("m1")));
}

#[tokio::test(start_paused = true)]
async fn test_translateExisting_whileRunning_shouldRejectSecondRun() {
    let harness = PipelineHarness::new(MockProvider::slow(500));
    let region = RegionHandle {
        node: harness.with_region(&[("m1", "one"), ("m2", "two"), ("m3", "three")]),
        generation: 1,
    };
    let translator = batch_translator(&harness, 5);

    let first = {
        let translator = translator.clone();
        tokio::spawn(async move { translator.translate_existing(region).await })
    };
    while !translator.is_running() {
        tokio::task::yield_now().await;
    }

    let second = translator.translate_existing(region).await;
    assert_eq!(second, BatchSummary::default());

    let first = first.await.unwrap();
    assert_eq!(first.submitted, 3);
    assert_eq!(first.translated, 3);
    assert!(!translator.is_running());
    assert_eq!(harness.provider.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_translateExisting_emptyRegion_shouldDoNothing() {
    let harness = PipelineHarness::new(MockProvider::working());
    let region = harness.with_region(&[]);

    let summary = batch_translator(&harness, 5)
        .translate_existing(RegionHandle { node: region, generation: 1 })
        .await;

    assert_eq!(summary, BatchSummary::default());
    assert_eq!(summary.to_string(), "0 submitted in 0 batches: 0 translated, 0 cached, 0 failed, 0 skipped");
}
