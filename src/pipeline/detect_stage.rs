/// Detect stage
///
/// Sole owner of the `StateTracker`. Each captured frame becomes one cycle:
///
/// ```text
/// begin_frame ──> detectors (mode subset) ──> EventEmitter ──> commit_frame ──> EventQueue
///                      │ outcomes                                    │ stop requested
///                      ▼                                             ▼
///            AccuracyTracker + DegradationManager              abort_frame
/// ```
///
/// Commands from the orchestrator are served between cycles.
use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::capture_stage::CaptureMessage;
use super::emitter::{Applied, EventEmitter};
use crate::capture::{Frame, SourceHandle};
use crate::confidence::{ConfidenceThresholds, ThresholdStore};
use crate::detection::{
    DetectionContext, DetectorOutcome, DetectorPipeline, DetectorRegistry, Recognizer,
    TableLayout,
};
use crate::messaging::{DetectionEvent, EventQueue, EventType, PipelineCommand, Severity};
use crate::metrics::AccuracyTracker;
use crate::state::{
    CorrelationId, DegradationManager, DegradationMode, ModeChange, PerformanceSnapshot,
    StateTracker, StateView,
};

/// State shared between the stages and the orchestrator's accessors
#[derive(Clone)]
pub struct Shared {
    pub pipeline: Arc<DetectorPipeline>,
    pub degradation: Arc<Mutex<DegradationManager>>,
    pub accuracy: Arc<Mutex<AccuracyTracker>>,
    pub thresholds: ThresholdStore,
    pub queue: EventQueue,
    pub cycles: Arc<AtomicU64>,
}

impl Shared {
    pub fn mode(&self) -> DegradationMode {
        self.degradation.lock().mode()
    }

    /// Accuracy figures plus pipeline counters
    pub fn performance_snapshot(&self) -> PerformanceSnapshot {
        let mode = self.mode();
        let mut snapshot = self.accuracy.lock().snapshot(mode.name());
        let cache = self.pipeline.cache_stats();
        snapshot.cycles = self.cycles.load(Ordering::SeqCst);
        snapshot.cache_hits = cache.hits;
        snapshot.cache_misses = cache.misses;
        snapshot.events_dropped = self.queue.dropped();
        snapshot
    }
}

pub struct DetectStage {
    shared: Shared,
    tracker: StateTracker,
    emitter: EventEmitter,
    registry: DetectorRegistry,
    layout: Arc<TableLayout>,
    recognizer: Arc<dyn Recognizer>,
    performance_every: u64,
}

impl DetectStage {
    pub fn new(
        shared: Shared,
        registry: DetectorRegistry,
        layout: TableLayout,
        recognizer: Arc<dyn Recognizer>,
        numeric_tolerance: f64,
        performance_every: u64,
    ) -> Self {
        let tracker = StateTracker::new(numeric_tolerance, layout.max_seats());
        let emitter = EventEmitter::new(shared.thresholds.current());
        Self {
            shared,
            tracker,
            emitter,
            registry,
            layout: Arc::new(layout),
            recognizer,
            performance_every: performance_every.max(1),
        }
    }

    pub fn view(&self) -> StateView {
        self.tracker.view()
    }

    /// Serve frames and commands until stopped or the capture stage goes away
    pub fn run(
        mut self,
        frames: Receiver<CaptureMessage>,
        commands: Receiver<PipelineCommand>,
        selections: Sender<SourceHandle>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        tracing::info!("Detect stage started with {} detectors", self.registry.len());
        loop {
            select! {
                recv(frames) -> message => match message {
                    Ok(CaptureMessage::Frame(frame)) => self.process_frame(frame, &stop),
                    Ok(CaptureMessage::Exhausted { error, attempts }) => {
                        let correlation = CorrelationId::new();
                        let event = EventEmitter::capture_error_event(&error, attempts, correlation.as_str());
                        let change = self.shared.degradation.lock().record_capture_exhausted(attempts);
                        let mut events = vec![event];
                        self.apply_mode_changes(change.into_iter().collect(), correlation.as_str(), &mut events);
                        self.shared.queue.push_all(events);
                    }
                    Err(_) => break,
                },
                recv(commands) -> command => match command {
                    Ok(PipelineCommand::Stop) | Err(_) => {
                        stop.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(command) => self.handle_command(command, &selections),
                },
            }
            if stop.load(Ordering::SeqCst) {
                break;
            }
        }
        tracing::info!("Detect stage stopped");
        self
    }

    /// Run one detection cycle over a frame
    pub fn process_frame(&mut self, frame: Frame, stop: &AtomicBool) {
        let correlation = self.tracker.begin_frame();
        let correlation_id = correlation.to_string();
        let frame_id = frame.id;
        let mut events = Vec::new();
        let mut changes = Vec::new();

        let kinds = {
            let mut degradation = self.shared.degradation.lock();
            degradation.begin_cycle();
            changes.extend(degradation.record_capture_success());
            degradation.kinds_to_run()
        };
        let detectors = self.registry.select(&kinds);
        let context = DetectionContext::new(
            Arc::new(frame),
            Arc::clone(&self.layout),
            Arc::clone(&self.recognizer),
        );
        let outcomes = self.shared.pipeline.run(&context, &detectors);

        if stop.load(Ordering::SeqCst) {
            self.tracker.abort_frame();
            tracing::warn!("Frame {} abandoned on stop", frame_id);
            self.shared.queue.push(
                DetectionEvent::new(
                    EventType::System,
                    Severity::Warning,
                    format!("Cycle for frame {} abandoned, no updates applied", frame_id),
                    correlation_id,
                )
                .with_data("frame_id", frame_id),
            );
            return;
        }

        for outcome in outcomes {
            self.account(outcome, &correlation_id, &mut events, &mut changes);
        }

        self.apply_mode_changes(changes, &correlation_id, &mut events);
        events.extend(self.shared.accuracy.lock().check_alerts(&correlation_id));

        let cycles = self.shared.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        if cycles % self.performance_every == 0 {
            let purged = self.shared.pipeline.purge_cache();
            if purged > 0 {
                tracing::trace!("Purged {} expired cache entries", purged);
            }
            let snapshot = self.shared.performance_snapshot();
            events.push(performance_event(&snapshot, &correlation_id));
            self.tracker.update_performance(snapshot);
        }

        self.tracker.commit_frame();
        if !events.is_empty() {
            tracing::debug!("Frame {} produced {} events", frame_id, events.len());
        }
        self.shared.queue.push_all(events);
    }

    fn account(
        &mut self,
        outcome: DetectorOutcome,
        correlation_id: &str,
        events: &mut Vec<DetectionEvent>,
        changes: &mut Vec<ModeChange>,
    ) {
        match outcome {
            // Replays are applied but never counted
            DetectorOutcome::Cached(result) => {
                match self.emitter.apply(&mut self.tracker, &result, correlation_id) {
                    Applied::Accepted { events: produced, .. } => events.extend(produced),
                    Applied::Invalid { event, .. } => events.push(event),
                    Applied::Rejected { .. } => {}
                }
            }
            DetectorOutcome::Fresh { result, duration } => {
                let kind = result.kind;
                match self.emitter.apply(&mut self.tracker, &result, correlation_id) {
                    Applied::Rejected { confidence } => {
                        self.shared
                            .accuracy
                            .lock()
                            .record_low_confidence(kind, confidence, duration);
                    }
                    Applied::Accepted { events: produced, .. } => {
                        self.shared
                            .accuracy
                            .lock()
                            .record_success(kind, result.confidence, duration);
                        changes.extend(self.shared.degradation.lock().record_success(kind));
                        events.extend(produced);
                    }
                    Applied::Invalid { error, event } => {
                        tracing::warn!("{} result failed validation: {}", kind, error);
                        self.shared.accuracy.lock().record_failure(kind, duration);
                        changes.extend(self.shared.degradation.lock().record_failure(kind));
                        events.push(event);
                    }
                }
            }
            DetectorOutcome::Failed {
                kind,
                error,
                duration,
            } => {
                tracing::debug!("{} detector failed: {}", kind, error);
                self.shared.accuracy.lock().record_failure(kind, duration);
                changes.extend(self.shared.degradation.lock().record_failure(kind));
                events.push(EventEmitter::recognition_error_event(&error, correlation_id));
            }
        }
    }

    fn apply_mode_changes(
        &self,
        changes: Vec<ModeChange>,
        correlation_id: &str,
        events: &mut Vec<DetectionEvent>,
    ) {
        if changes.is_empty() {
            return;
        }
        for change in &changes {
            if change.is_degradation() {
                tracing::warn!("Mode {} -> {}: {}", change.from, change.to, change.reason);
            } else {
                tracing::info!("Mode {} -> {}: {}", change.from, change.to, change.reason);
            }
            events.push(EventEmitter::mode_change_event(change, correlation_id));
        }
        let mode = self.shared.mode();
        self.tracker.set_offline(!mode.serves_state());
    }

    fn handle_command(&mut self, command: PipelineCommand, selections: &Sender<SourceHandle>) {
        tracing::debug!("Command: {}", command.description());
        match command {
            PipelineCommand::ReloadThresholds(thresholds) => self.reload_thresholds(thresholds),
            PipelineCommand::ResetHand => self.reset_hand(),
            PipelineCommand::SelectSource(handle) => {
                if selections.send(handle).is_err() {
                    tracing::warn!("Capture stage is gone, source selection ignored");
                }
            }
            PipelineCommand::Stop => {}
        }
    }

    fn reload_thresholds(&mut self, thresholds: ConfidenceThresholds) {
        let correlation = CorrelationId::new();
        let event = match self.shared.thresholds.reload(thresholds) {
            Ok(()) => {
                self.emitter.set_thresholds(self.shared.thresholds.current());
                DetectionEvent::new(
                    EventType::System,
                    Severity::Info,
                    "Confidence thresholds reloaded",
                    correlation.as_str(),
                )
            }
            Err(error) => {
                tracing::warn!("Threshold reload refused: {}", error);
                DetectionEvent::new(
                    EventType::System,
                    Severity::Warning,
                    format!("Threshold reload refused: {}", error),
                    correlation.as_str(),
                )
            }
        };
        self.shared.queue.push(event);
    }

    fn reset_hand(&mut self) {
        let correlation = self.tracker.begin_frame();
        let before = self.tracker.pending().clone();
        let mut events = Vec::new();
        if let Some(hand_id) = &before.hand_id {
            events.push(EventEmitter::hand_end_event(hand_id, &before, correlation.as_str()));
        }
        self.tracker.reset_hand();
        self.tracker.commit_frame();
        tracing::info!("Hand state reset");
        self.shared.queue.push_all(events);
    }
}

fn performance_event(snapshot: &PerformanceSnapshot, correlation_id: &str) -> DetectionEvent {
    DetectionEvent::new(
        EventType::Performance,
        Severity::Debug,
        format!(
            "{} cycles in {} mode, cache {}/{} hits",
            snapshot.cycles,
            snapshot.mode,
            snapshot.cache_hits,
            snapshot.cache_hits + snapshot.cache_misses
        ),
        correlation_id,
    )
    .with_data("snapshot", snapshot)
}
