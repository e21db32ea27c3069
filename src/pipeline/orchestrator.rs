/// Orchestrator
///
/// Owns the three stage threads and everything they share. No globals: every
/// handle a caller needs (state view, subscriptions, commands, metrics) comes
/// from this value.
///
/// ```text
/// capture thread ──Frame──> detect thread ──events──> EventQueue ──> dispatch thread ──> subscribers
///        ▲                      ▲
///        └──SelectSource────────┤
///                        PipelineCommand
/// ```
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::capture_stage::{CaptureMessage, CaptureStage};
use super::detect_stage::{DetectStage, Shared};
use super::dispatch_stage::DispatchStage;
use crate::capture::{SourceCapture, SourceHandle};
use crate::classifier::SourceClassifier;
use crate::config::Config;
use crate::confidence::ThresholdStore;
use crate::detection::{DetectorPipeline, DetectorRegistry, Recognizer};
use crate::error::PipelineError;
use crate::messaging::{
    Batcher, BroadcastDispatcher, EventBatch, EventQueue, PipelineCommand, Subscriber,
    SubscriberId,
};
use crate::metrics::AccuracyTracker;
use crate::state::{
    DegradationManager, DegradationMode, Lifecycle, LifecycleMachine, PerformanceSnapshot,
    StateView,
};

/// Frames waiting for the detect stage; newer frames are dropped beyond this
const FRAME_BACKLOG: usize = 2;

/// Why `wait_for_cycles` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    CycleLimit,
    Offline,
    StageExited,
}

impl fmt::Display for RunEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEnd::CycleLimit => f.write_str("cycle limit reached"),
            RunEnd::Offline => f.write_str("capture source went offline"),
            RunEnd::StageExited => f.write_str("a pipeline stage exited"),
        }
    }
}

struct Stages {
    capture: CaptureStage,
    detect: DetectStage,
    dispatch: DispatchStage,
}

struct Running {
    capture: JoinHandle<CaptureStage>,
    detect: JoinHandle<DetectStage>,
    dispatch: JoinHandle<DispatchStage>,
    shutdown: Sender<()>,
    stop: Arc<AtomicBool>,
    dispatch_stop: Arc<AtomicBool>,
}

pub struct Orchestrator {
    config: Config,
    shared: Shared,
    dispatcher: BroadcastDispatcher,
    view: StateView,
    command_tx: Sender<PipelineCommand>,
    command_rx: Receiver<PipelineCommand>,
    lifecycle: LifecycleMachine,
    idle: Option<Stages>,
    running: Option<Running>,
}

fn spawn_stage<T, F>(stage: &'static str, work: F) -> Result<JoinHandle<T>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(format!("table-watch-{}", stage))
        .spawn(work)
        .map_err(|source| PipelineError::ThreadSpawnFailed { stage, source })
}

impl Orchestrator {
    pub fn new(
        config: Config,
        capture: Box<dyn SourceCapture>,
        detectors: DetectorRegistry,
        recognizer: Arc<dyn Recognizer>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let classifier = SourceClassifier::new().with_exclusions(&config.classifier.extra_exclusions)?;

        let pipeline = DetectorPipeline::new(
            detectors.len(),
            config.detector_timeout(),
            config.cache_ttl(),
            config.cache.capacity,
        )?;
        let shared = Shared {
            pipeline: Arc::new(pipeline),
            degradation: Arc::new(Mutex::new(DegradationManager::new(
                config.degradation.failure_threshold,
                config.recovery_timeout(),
            ))),
            accuracy: Arc::new(Mutex::new(AccuracyTracker::new(config.accuracy.limits()))),
            thresholds: ThresholdStore::new(config.thresholds.clone()),
            queue: EventQueue::new(config.queue.capacity),
            cycles: Arc::new(AtomicU64::new(0)),
        };
        let dispatcher = BroadcastDispatcher::new(
            config.subscriber.buffer,
            config.subscriber.max_consecutive_failures,
        )
        .with_backlog_limit(config.queue.capacity);

        let capture = CaptureStage::new(
            capture,
            classifier,
            config.cycle_interval(),
            config.degradation.capture_retry_limit,
        );
        let detect = DetectStage::new(
            shared.clone(),
            detectors,
            config.layout.clone(),
            recognizer,
            config.tracker.numeric_tolerance,
            config.cycle.performance_every_cycles,
        );
        let dispatch = DispatchStage::new(
            shared.queue.clone(),
            dispatcher.clone(),
            Batcher::new(config.batch_interval(), config.batch.max_size),
        );
        let view = detect.view();
        let (command_tx, command_rx) = crossbeam_channel::unbounded();

        Ok(Self {
            config,
            shared,
            dispatcher,
            view,
            command_tx,
            command_rx,
            lifecycle: LifecycleMachine::new(),
            idle: Some(Stages {
                capture,
                detect,
                dispatch,
            }),
            running: None,
        })
    }

    /// Spawn the capture, detect and dispatch threads
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.lifecycle.start()?;
        let Some(stages) = self.idle.take() else {
            self.lifecycle.mark_stopped();
            return Err(PipelineError::StagesLost);
        };

        let stale = self.command_rx.try_iter().count();
        if stale > 0 {
            tracing::debug!("Discarded {} commands sent while stopped", stale);
        }

        match self.spawn(stages) {
            Ok(running) => {
                self.running = Some(running);
                self.lifecycle.mark_running()?;
                tracing::info!("Pipeline started");
                Ok(())
            }
            Err(err) => {
                tracing::error!("Pipeline failed to start: {}", err);
                self.lifecycle.mark_stopped();
                Err(err)
            }
        }
    }

    fn spawn(&self, stages: Stages) -> Result<Running, PipelineError> {
        let Stages {
            capture,
            detect,
            dispatch,
        } = stages;
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<CaptureMessage>(FRAME_BACKLOG);
        let (select_tx, select_rx) = crossbeam_channel::unbounded::<SourceHandle>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let stop = Arc::new(AtomicBool::new(false));
        let dispatch_stop = Arc::new(AtomicBool::new(false));

        let dispatch = {
            let dispatch_stop = Arc::clone(&dispatch_stop);
            spawn_stage("dispatch", move || dispatch.run(dispatch_stop))?
        };
        let detect = {
            let commands = self.command_rx.clone();
            let stop = Arc::clone(&stop);
            let spawned = spawn_stage("detect", move || detect.run(frame_rx, commands, select_tx, stop));
            match spawned {
                Ok(handle) => handle,
                Err(err) => {
                    dispatch_stop.store(true, Ordering::SeqCst);
                    let _ = dispatch.join();
                    return Err(err);
                }
            }
        };
        let capture = spawn_stage("capture", move || capture.run(frame_tx, select_rx, shutdown_rx));
        let capture = match capture {
            Ok(handle) => handle,
            Err(err) => {
                // The detect stage exits once the frame channel disconnects
                let _ = detect.join();
                dispatch_stop.store(true, Ordering::SeqCst);
                let _ = dispatch.join();
                return Err(err);
            }
        };

        Ok(Running {
            capture,
            detect,
            dispatch,
            shutdown: shutdown_tx,
            stop,
            dispatch_stop,
        })
    }

    /// Signal every stage, let in-flight detectors finish, flush queued events
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        self.lifecycle.stop()?;
        let Some(running) = self.running.take() else {
            self.lifecycle.mark_stopped();
            return Ok(());
        };
        tracing::info!("Stopping pipeline...");

        running.stop.store(true, Ordering::SeqCst);
        drop(running.shutdown);
        let capture = running.capture.join();
        let detect = running.detect.join();
        running.dispatch_stop.store(true, Ordering::SeqCst);
        let dispatch = running.dispatch.join();

        match (capture, detect, dispatch) {
            (Ok(capture), Ok(detect), Ok(dispatch)) => {
                self.idle = Some(Stages {
                    capture,
                    detect,
                    dispatch,
                });
            }
            _ => tracing::error!("A pipeline stage panicked, the pipeline cannot be restarted"),
        }

        self.lifecycle.mark_stopped();
        tracing::info!("Pipeline stopped");
        Ok(())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.state().is_running()
    }

    /// All three stage threads are still running
    pub fn stages_alive(&self) -> bool {
        self.running.as_ref().is_some_and(|running| {
            !running.capture.is_finished()
                && !running.detect.is_finished()
                && !running.dispatch.is_finished()
        })
    }

    /// Block until `limit` cycles completed, the source went OFFLINE, or a stage ended
    pub fn wait_for_cycles(&self, limit: u64, poll: Duration) -> RunEnd {
        loop {
            if self.cycles() >= limit {
                return RunEnd::CycleLimit;
            }
            if self.mode() == DegradationMode::Offline {
                return RunEnd::Offline;
            }
            if !self.stages_alive() {
                return RunEnd::StageExited;
            }
            thread::sleep(poll);
        }
    }

    /// Channel for commands served by the detect stage between cycles
    pub fn command_sender(&self) -> Sender<PipelineCommand> {
        self.command_tx.clone()
    }

    /// Attach a channel subscriber; batches queued so far are delivered to it
    pub fn subscribe(&self, name: &str) -> (Receiver<EventBatch>, SubscriberId) {
        self.dispatcher.subscribe(name)
    }

    pub fn add_subscriber(&self, subscriber: Box<dyn Subscriber>) -> SubscriberId {
        self.dispatcher.add_subscriber(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.dispatcher.unsubscribe(id);
    }

    pub fn state_view(&self) -> StateView {
        self.view.clone()
    }

    pub fn mode(&self) -> DegradationMode {
        self.shared.mode()
    }

    /// Completed detection cycles since construction
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> PerformanceSnapshot {
        self.shared.performance_snapshot()
    }

    /// Events waiting for delivery
    pub fn queued_events(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.running.is_some() {
            let _ = self.stop();
        }
    }
}
