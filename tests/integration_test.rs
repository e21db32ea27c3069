// Integration tests for Table Watch
// These tests drive the full capture -> detect -> dispatch pipeline with scripted
// sources and detectors.

use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use table_watch::config::Config;
use table_watch::detection::{BlankRecognizer, DetectorKind, DetectorRegistry, Payload};
use table_watch::error::{PipelineError, RecognitionError};
use table_watch::messaging::{DetectionEvent, EventBatch, EventType, JsonLinesSubscriber, Severity};
use table_watch::pipeline::Orchestrator;
use table_watch::state::DegradationMode;
use table_watch::testing::{ScriptedDetector, ScriptedSource, SourceControl};

const TABLE_TITLE: &str = "PokerStars - Hold'em No Limit $0.25/$0.50";

fn fast_config() -> Config {
    let mut config = Config::default();
    config.cycle.interval_ms = 10;
    config.cycle.detector_timeout_ms = 200;
    config.batch.interval_ms = 10;
    config
}

fn pot_detector(total: f64) -> Arc<ScriptedDetector> {
    let detector = Arc::new(ScriptedDetector::new(DetectorKind::Pot));
    detector.push_ok(
        Payload::Pot {
            total,
            side_pots: vec![],
        },
        0.95,
    );
    detector
}

fn build(config: Config, detectors: Vec<Arc<ScriptedDetector>>) -> (Orchestrator, SourceControl) {
    let source = ScriptedSource::new(TABLE_TITLE).with_window("ide", "main.rs - Visual Studio Code");
    let control = source.control();
    let mut registry = DetectorRegistry::new();
    for detector in detectors {
        registry.register(detector);
    }
    let orchestrator =
        Orchestrator::new(config, Box::new(source), registry, Arc::new(BlankRecognizer)).unwrap();
    (orchestrator, control)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn events(rx: &Receiver<EventBatch>) -> Vec<DetectionEvent> {
    rx.try_iter().flat_map(|batch| batch.events).collect()
}

#[test]
fn test_pot_change_delivered_once() {
    let (mut orchestrator, _) = build(fast_config(), vec![pot_detector(12.5)]);
    let (rx, _) = orchestrator.subscribe("test");

    orchestrator.start().unwrap();
    assert!(wait_until(|| orchestrator.cycles() >= 5));
    orchestrator.stop().unwrap();

    let events = events(&rx);
    let pots: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::Pot)
        .collect();
    assert_eq!(pots.len(), 1);
    assert_eq!(pots[0].data["pot"], 12.5);
    assert_eq!(orchestrator.state_view().current().unwrap().pot, 12.5);
}

#[test]
fn test_card_timeouts_degrade_to_partial() {
    let cards = Arc::new(ScriptedDetector::new(DetectorKind::Card));
    cards.push_err(RecognitionError::Timeout {
        kind: DetectorKind::Card,
        budget_ms: 200,
    });
    let (mut orchestrator, _) = build(fast_config(), vec![cards.clone(), pot_detector(3.0)]);
    let (rx, _) = orchestrator.subscribe("test");

    orchestrator.start().unwrap();
    assert!(wait_until(|| orchestrator.mode() == DegradationMode::Partial));
    orchestrator.stop().unwrap();

    let events = events(&rx);
    let degraded = events
        .iter()
        .find(|e| e.event_type == EventType::System && e.severity == Severity::Warning)
        .expect("mode change event");
    assert_eq!(degraded.data["from"], "FULL");
    assert_eq!(degraded.data["to"], "PARTIAL");
    assert!(events.iter().filter(|e| e.event_type == EventType::Error).count() >= 3);

    // The failing kind stays suspended in the degraded mode
    assert_eq!(cards.calls(), 3);
    assert_eq!(orchestrator.mode(), DegradationMode::Partial);
}

#[test]
fn test_events_queue_until_first_subscriber() {
    let (mut orchestrator, _) = build(fast_config(), vec![pot_detector(7.0)]);

    orchestrator.start().unwrap();
    assert!(wait_until(|| orchestrator.cycles() >= 3));
    assert!(orchestrator.queued_events() > 0);

    let (rx, _) = orchestrator.subscribe("late");
    let mut received = Vec::new();
    assert!(wait_until(|| {
        received.extend(events(&rx));
        received.iter().any(|e| e.event_type == EventType::Pot)
    }));
    orchestrator.stop().unwrap();
}

#[test]
fn test_capture_exhaustion_goes_offline() {
    let (mut orchestrator, control) = build(fast_config(), vec![pot_detector(1.0)]);
    let (rx, _) = orchestrator.subscribe("test");
    control.fail_next(usize::MAX);

    orchestrator.start().unwrap();
    assert!(wait_until(|| orchestrator.state_view().is_offline()));
    assert_eq!(orchestrator.mode(), DegradationMode::Offline);
    assert!(matches!(
        orchestrator.state_view().current(),
        Err(PipelineError::Offline)
    ));
    orchestrator.stop().unwrap();

    let events = events(&rx);
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::Error && e.severity == Severity::Error));
    assert!(events.iter().any(|e| e.severity == Severity::Critical));
    assert_eq!(orchestrator.cycles(), 0);
}

#[test]
fn test_stop_abandons_cycle_in_flight() {
    let mut config = fast_config();
    config.cycle.detector_timeout_ms = 2000;
    let pot = pot_detector(50.0);
    pot.set_delay(Duration::from_millis(300));
    let (mut orchestrator, _) = build(config, vec![pot.clone()]);
    let (rx, _) = orchestrator.subscribe("test");

    orchestrator.start().unwrap();
    assert!(wait_until(|| pot.calls() >= 1));
    orchestrator.stop().unwrap();

    assert!(orchestrator.lifecycle().is_stopped());
    assert_eq!(orchestrator.state_view().last_known().pot, 0.0);
    let events = events(&rx);
    assert!(events.iter().all(|e| e.event_type != EventType::Pot));
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::System && e.message.contains("abandoned")));
}

#[test]
fn test_jsonl_subscriber_records_events() {
    let path = std::env::temp_dir().join(format!("table-watch-{}.jsonl", uuid::Uuid::new_v4()));
    let (mut orchestrator, _) = build(fast_config(), vec![pot_detector(2.5)]);
    orchestrator.add_subscriber(Box::new(JsonLinesSubscriber::create(&path).unwrap()));

    orchestrator.start().unwrap();
    assert!(wait_until(|| orchestrator.cycles() >= 3));
    orchestrator.stop().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let decoded: Vec<DetectionEvent> = contents
        .lines()
        .map(|line| DetectionEvent::from_json(line).unwrap())
        .collect();
    assert!(decoded.iter().any(|e| e.event_type == EventType::Pot));
    let _ = std::fs::remove_file(&path);
}
