/// Capture stage
///
/// Picks a source with the classifier, pulls frames at the configured cadence
/// and hands them to the detect stage over a bounded channel. A frame that does
/// not fit in the channel is dropped rather than stalling capture. Capture errors
/// are retried; when every attempt of a cycle fails the detect stage is told so
/// it can degrade the pipeline.
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::time::{Duration, Instant};

use crate::capture::{Frame, SourceCapture, SourceHandle};
use crate::classifier::SourceClassifier;
use crate::error::CaptureError;

pub enum CaptureMessage {
    Frame(Frame),
    /// Every attempt of one cycle failed; carries the last error
    Exhausted { error: CaptureError, attempts: u32 },
}

pub struct CaptureStage {
    pub(crate) source: Box<dyn SourceCapture>,
    classifier: SourceClassifier,
    interval: Duration,
    retry_limit: u32,
    target: Option<SourceHandle>,
    pinned: bool,
    next_frame_id: u64,
}

impl CaptureStage {
    pub fn new(
        source: Box<dyn SourceCapture>,
        classifier: SourceClassifier,
        interval: Duration,
        retry_limit: u32,
    ) -> Self {
        Self {
            source,
            classifier,
            interval,
            retry_limit: retry_limit.max(1),
            target: None,
            pinned: false,
            next_frame_id: 1,
        }
    }

    pub fn target(&self) -> Option<&SourceHandle> {
        self.target.as_ref()
    }

    /// Use this source until the next explicit selection
    pub fn pin(&mut self, handle: SourceHandle) {
        tracing::info!("Capture source pinned to {}", handle);
        self.target = Some(handle);
        self.pinned = true;
    }

    fn select(&mut self) -> Result<SourceHandle, CaptureError> {
        if let Some(target) = &self.target {
            return Ok(target.clone());
        }
        let sources = self.source.enumerate()?;
        let candidate = self
            .classifier
            .select_target(sources)
            .ok_or(CaptureError::NoSource)?;
        tracing::info!(
            "Capturing '{}' ({}, score {:.2})",
            candidate.title,
            candidate.category,
            candidate.score
        );
        self.target = Some(candidate.handle.clone());
        Ok(candidate.handle)
    }

    /// One capture with bounded retries
    pub fn capture_once(&mut self) -> CaptureMessage {
        let mut last_error = CaptureError::NoSource;
        for attempt in 1..=self.retry_limit {
            let result = self.select().and_then(|handle| {
                let frame_id = self.next_frame_id;
                self.source.capture(&handle, frame_id)
            });
            match result {
                Ok(frame) => {
                    self.next_frame_id += 1;
                    return CaptureMessage::Frame(frame);
                }
                Err(error) => {
                    tracing::debug!("Capture attempt {} failed: {}", attempt, error);
                    // A vanished source is looked up again unless it was pinned
                    if matches!(error, CaptureError::SourceGone(_)) && !self.pinned {
                        self.target = None;
                    }
                    last_error = error;
                }
            }
        }
        tracing::warn!("Capture failed {} times: {}", self.retry_limit, last_error);
        CaptureMessage::Exhausted {
            error: last_error,
            attempts: self.retry_limit,
        }
    }

    /// Run until `shutdown` disconnects; returns the stage so it can be restarted
    pub fn run(
        mut self,
        frames: Sender<CaptureMessage>,
        selections: Receiver<SourceHandle>,
        shutdown: Receiver<()>,
    ) -> Self {
        tracing::info!("Capture stage started ({})", self.source.name());
        loop {
            let started = Instant::now();

            loop {
                match selections.try_recv() {
                    Ok(handle) => self.pin(handle),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }

            let delivered = match self.capture_once() {
                CaptureMessage::Frame(frame) => match frames.try_send(CaptureMessage::Frame(frame)) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!("Detect stage busy, frame dropped");
                        true
                    }
                    Err(TrySendError::Disconnected(_)) => false,
                },
                exhausted => frames.send_timeout(exhausted, self.interval).is_ok(),
            };
            if !delivered && frames.is_empty() {
                // Nobody listens any more
                break;
            }

            let wait = self.interval.saturating_sub(started.elapsed());
            match shutdown.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!("Capture stage stopped");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;

    fn stage(source: ScriptedSource) -> CaptureStage {
        CaptureStage::new(
            Box::new(source),
            SourceClassifier::new(),
            Duration::from_millis(10),
            3,
        )
    }

    #[test]
    fn test_selects_table_over_other_windows() {
        let source = ScriptedSource::new("PokerStars - $0.50/$1 NLHE")
            .with_window("editor", "Visual Studio Code");
        let mut stage = stage(source);

        match stage.capture_once() {
            CaptureMessage::Frame(frame) => {
                assert_eq!(frame.id, 1);
                assert_eq!(frame.source.as_str(), "scripted");
            }
            CaptureMessage::Exhausted { error, .. } => panic!("capture failed: {}", error),
        }
        assert_eq!(stage.target().map(|h| h.as_str()), Some("scripted"));
    }

    #[test]
    fn test_retries_then_succeeds() {
        let source = ScriptedSource::new("PokerStars - Table 1");
        let control = source.control();
        control.fail_next(2);
        let mut stage = stage(source);

        assert!(matches!(stage.capture_once(), CaptureMessage::Frame(_)));
        assert_eq!(control.captures(), 1);
    }

    #[test]
    fn test_exhausted_after_retry_limit() {
        let source = ScriptedSource::new("PokerStars - Table 1");
        let control = source.control();
        control.fail_next(5);
        let mut stage = stage(source);

        match stage.capture_once() {
            CaptureMessage::Exhausted { attempts, error } => {
                assert_eq!(attempts, 3);
                assert!(matches!(error, CaptureError::SourceUnavailable(_)));
            }
            CaptureMessage::Frame(_) => panic!("capture should fail"),
        }
    }

    #[test]
    fn test_no_table_window() {
        let source = ScriptedSource::new("Visual Studio Code");
        let mut stage = stage(source);
        assert!(matches!(
            stage.capture_once(),
            CaptureMessage::Exhausted {
                error: CaptureError::NoSource,
                ..
            }
        ));
    }

    #[test]
    fn test_gone_source_is_looked_up_again() {
        let source = ScriptedSource::new("PokerStars - Table 1");
        let control = source.control();
        let mut stage = stage(source);
        assert!(matches!(stage.capture_once(), CaptureMessage::Frame(_)));

        control.set_gone(true);
        assert!(matches!(stage.capture_once(), CaptureMessage::Exhausted { .. }));
        assert!(stage.target().is_none());

        control.set_gone(false);
        assert!(matches!(stage.capture_once(), CaptureMessage::Frame(_)));
    }
}
