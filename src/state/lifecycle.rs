/// Pipeline lifecycle
///
/// Start/stop transitions of the orchestrator's worker threads.
use std::time::{Duration, Instant};

use crate::error::PipelineError;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Lifecycle {
    /// No stage threads exist
    #[default]
    Stopped,

    /// Stage threads are being spawned
    Starting,

    /// Capture, detect and dispatch stages are running
    Running { since: Instant },

    /// Stop was signalled, stages are draining
    Stopping,
}

impl Lifecycle {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Lifecycle::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Lifecycle::Running { .. })
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self, Lifecycle::Starting | Lifecycle::Stopping)
    }

    pub fn uptime(&self) -> Option<Duration> {
        match self {
            Lifecycle::Running { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Lifecycle::Stopped => "Stopped",
            Lifecycle::Starting => "Starting...",
            Lifecycle::Running { .. } => "Running",
            Lifecycle::Stopping => "Stopping...",
        }
    }
}

#[derive(Debug, Default)]
pub struct LifecycleMachine {
    state: Lifecycle,
}

impl LifecycleMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn start(&mut self) -> Result<(), PipelineError> {
        match self.state {
            Lifecycle::Stopped => {
                self.state = Lifecycle::Starting;
                Ok(())
            }
            _ => Err(PipelineError::AlreadyRunning),
        }
    }

    pub fn mark_running(&mut self) -> Result<(), PipelineError> {
        match self.state {
            Lifecycle::Starting => {
                self.state = Lifecycle::Running {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(PipelineError::NotRunning),
        }
    }

    pub fn stop(&mut self) -> Result<(), PipelineError> {
        match self.state {
            Lifecycle::Running { .. } | Lifecycle::Starting => {
                self.state = Lifecycle::Stopping;
                Ok(())
            }
            _ => Err(PipelineError::NotRunning),
        }
    }

    pub fn mark_stopped(&mut self) {
        self.state = Lifecycle::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_predicates() {
        assert!(Lifecycle::Stopped.is_stopped());
        assert!(Lifecycle::Starting.is_transitioning());
        let running = Lifecycle::Running {
            since: Instant::now(),
        };
        assert!(running.is_running());
        assert!(running.uptime().is_some());
        assert!(Lifecycle::Stopping.uptime().is_none());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut machine = LifecycleMachine::new();
        assert!(matches!(machine.stop(), Err(PipelineError::NotRunning)));

        machine.start().unwrap();
        assert!(matches!(machine.start(), Err(PipelineError::AlreadyRunning)));
        machine.mark_running().unwrap();
        assert!(machine.state().is_running());
        assert!(matches!(machine.start(), Err(PipelineError::AlreadyRunning)));

        machine.stop().unwrap();
        assert_eq!(machine.state(), Lifecycle::Stopping);
        machine.mark_stopped();
        assert!(machine.state().is_stopped());
    }
}
