/*!
 * Integration tests for region discovery and change detection
 */

use std::time::Duration;

use tokio::sync::mpsc;

use livetl::app_config::{DetectorConfig, PipelineConfig};
use livetl::detector::{ChangeDetector, DetectorState};
use livetl::document::{Document, NodeSpec, SharedDocument};
use livetl::errors::DetectionError;
use livetl::sink::DERIVED_ATTRIBUTE;

use crate::common::{chat_message, chat_region, content_of, drain};

fn detector(document: &SharedDocument) -> ChangeDetector {
    let pipeline = PipelineConfig {
        detector_max_attempts: 10,
        detector_backoff_ms: 2000,
        ..Default::default()
    };
    ChangeDetector::from_config(document.clone(), &DetectorConfig::default(), &pipeline).unwrap()
}

async fn tick() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_run_regionAppearsLate_shouldSucceedOnFourthAttempt() {
    let document = Document::shared();
    let detector = detector(&document);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _task = detector.spawn(tx);

    tokio::time::sleep(Duration::from_millis(5000)).await;
    // Attempts ran at 0s, 2s and 4s; the next one is due at 6s
    assert!(matches!(detector.state(), DetectorState::Searching { attempt: 3 }));
    document
        .append_spec(
            document.body(),
            &chat_region().child(chat_message("m1", "already here")),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(detector.locate_calls(), 4);
    match detector.state() {
        DetectorState::Watching(region) => assert_eq!(region.generation, 1),
        other => panic!("expected Watching, got {:?}", other),
    }

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].content_ref, content_of(&document, "m1"));
    assert_eq!(events[0].raw_text, "already here");
}

#[tokio::test(start_paused = true)]
async fn test_run_regionNeverAppears_shouldGiveUpAfterMaxAttempts() {
    let document = Document::shared();
    let detector = detector(&document);
    let (tx, _rx) = mpsc::unbounded_channel();
    let started = tokio::time::Instant::now();

    let result = detector.run(tx).await;

    assert_eq!(result, Err(DetectionError::RegionNotFound { attempts: 10 }));
    assert_eq!(detector.state(), DetectorState::Failed);
    assert_eq!(detector.locate_calls(), 10);
    assert_eq!(tokio::time::Instant::now() - started, Duration::from_millis(18_000));
}

#[tokio::test(start_paused = true)]
async fn test_run_appendedMessages_shouldEmitOneEventPerContentNode() {
    let document = Document::shared();
    let region = document.append_spec(document.body(), &chat_region()).unwrap();
    let detector = detector(&document);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _task = detector.spawn(tx);
    tick().await;
    assert!(drain(&mut rx).is_empty());

    document.append_spec(region, &chat_message("m1", "first")).unwrap();
    document.append_spec(region, &chat_message("m2", " second ")).unwrap();
    tick().await;

    let events = drain(&mut rx);
    let texts: Vec<&str> = events.iter().map(|e| e.raw_text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(events[0].content_ref, content_of(&document, "m1"));
}

#[tokio::test(start_paused = true)]
async fn test_run_derivedNodes_shouldNotProduceEvents() {
    let document = Document::shared();
    let region = document
        .append_spec(document.body(), &chat_region().child(chat_message("m1", "hello")))
        .unwrap();
    let detector = detector(&document);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _task = detector.spawn(tx);
    tick().await;
    assert_eq!(drain(&mut rx).len(), 1);

    let content = content_of(&document, "m1");
    let derived = NodeSpec::element("div")
        .attr(DERIVED_ATTRIBUTE, content.to_string())
        .child(NodeSpec::element("span").attr("class", "markup_x").text("你好"));
    document.append_spec(region, &derived).unwrap();
    tick().await;

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_mutationOutsideRegion_shouldBeIgnored() {
    let document = Document::shared();
    document.append_spec(document.body(), &chat_region()).unwrap();
    let sidebar = document
        .append_spec(document.body(), &NodeSpec::element("aside").attr("id", "sidebar"))
        .unwrap();
    let detector = detector(&document);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _task = detector.spawn(tx);
    tick().await;

    document.append_spec(sidebar, &chat_message("x1", "not chat")).unwrap();
    tick().await;

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_regionReplaced_shouldRelocateWithNewGeneration() {
    let document = Document::shared();
    let first = document.append_spec(document.body(), &chat_region()).unwrap();
    let detector = detector(&document);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _task = detector.spawn(tx);
    tick().await;
    assert!(matches!(detector.state(), DetectorState::Watching(r) if r.node == first));

    document.remove(first).unwrap();
    tick().await;
    assert!(matches!(detector.state(), DetectorState::Searching { .. }));

    let second = document
        .append_spec(document.body(), &chat_region().child(chat_message("m1", "back again")))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    match detector.state() {
        DetectorState::Watching(region) => {
            assert_eq!(region.node, second);
            assert_eq!(region.generation, 2);
        }
        other => panic!("expected Watching, got {:?}", other),
    }

    document.append_spec(second, &chat_message("m2", "new one")).unwrap();
    tick().await;
    let texts: Vec<String> = drain(&mut rx).into_iter().map(|e| e.raw_text).collect();
    assert_eq!(texts, vec!["back again".to_string(), "new one".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_run_receiverDropped_shouldStopCleanly() {
    let document = Document::shared();
    document.append_spec(document.body(), &chat_region()).unwrap();
    let detector = detector(&document);
    let (tx, rx) = mpsc::unbounded_channel();
    let task = detector.spawn(tx);
    tick().await;

    drop(rx);
    let result = task.await.unwrap();
    assert_eq!(result, Ok(()));
}

#[test]
fn test_scan_shouldReturnContentInDocumentOrder() {
    let document = Document::shared();
    let region = document
        .append_spec(
            document.body(),
            &chat_region()
                .child(chat_message("m1", "one"))
                .child(chat_message("m2", "two"))
                .child(chat_message("m3", "three")),
        )
        .unwrap();

    let events = detector(&document).scan(region);
    let texts: Vec<&str> = events.iter().map(|e| e.raw_text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[test]
fn test_locateRegion_withStructuralSelector_shouldFindRegion() {
    let document = Document::shared();
    let region = document
        .append_spec(
            document.body(),
            &NodeSpec::element("div").attr("data-list-id", "chat-messages"),
        )
        .unwrap();

    let found = detector(&document).locate_region().unwrap();
    assert_eq!(found, region);
}

#[tokio::test(start_paused = true)]
async fn test_locateRegion_calledDirectly_shouldNotAdvanceGeneration() {
    let document = Document::shared();
    document.append_spec(document.body(), &chat_region()).unwrap();
    let detector = detector(&document);

    assert!(detector.locate_region().is_some());
    assert!(detector.locate_region().is_some());
    assert_eq!(detector.locate_calls(), 0);

    let (tx, _rx) = mpsc::unbounded_channel();
    let task = detector.spawn(tx);
    tokio::time::sleep(Duration::from_millis(10)).await;

    match detector.state() {
        DetectorState::Watching(region) => assert_eq!(region.generation, 1),
        other => panic!("expected Watching, got {:?}", other),
    }
    assert_eq!(detector.locate_calls(), 1);
    task.abort();
}
