/// Degradation manager
///
/// Linear mode ladder, one step at a time in either direction:
///
/// ```text
/// FULL ──> PARTIAL ──> MINIMAL ──> FALLBACK ──> OFFLINE
///  all     card+pot+    card+pot     none        none, no state served
///          player
/// ```
///
/// A detector kind failing `failure_threshold` times in a row degrades the mode
/// by one level and suspends that kind until the next promotion. However many
/// kinds hit the threshold in one cycle, the mode drops at most one level per
/// `begin_cycle`, and detector failures never go past FALLBACK: only capture
/// exhaustion takes the system OFFLINE. One success
/// after `recovery_timeout` in the current mode promotes by one level; the mode
/// timer restarts on every transition, so upgrades never compound.
///
/// Once the recovery timeout has elapsed, `kinds_to_run_at` returns the detector
/// set of the next level up so a degraded mode can observe the success that
/// promotes it. OFFLINE recovers through a successful capture.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

use crate::detection::DetectorKind;

const PARTIAL_KINDS: [DetectorKind; 3] =
    [DetectorKind::Card, DetectorKind::Pot, DetectorKind::Player];
const MINIMAL_KINDS: [DetectorKind; 2] = [DetectorKind::Card, DetectorKind::Pot];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DegradationMode {
    Full,
    Partial,
    Minimal,
    Fallback,
    Offline,
}

impl DegradationMode {
    /// One level down; OFFLINE stays OFFLINE
    pub fn degraded(self) -> Self {
        match self {
            DegradationMode::Full => DegradationMode::Partial,
            DegradationMode::Partial => DegradationMode::Minimal,
            DegradationMode::Minimal => DegradationMode::Fallback,
            DegradationMode::Fallback | DegradationMode::Offline => DegradationMode::Offline,
        }
    }

    /// One level up; FULL stays FULL
    pub fn upgraded(self) -> Self {
        match self {
            DegradationMode::Full | DegradationMode::Partial => DegradationMode::Full,
            DegradationMode::Minimal => DegradationMode::Partial,
            DegradationMode::Fallback => DegradationMode::Minimal,
            DegradationMode::Offline => DegradationMode::Fallback,
        }
    }

    /// Detector kinds this mode allows to run
    pub fn allowed_kinds(self) -> &'static [DetectorKind] {
        match self {
            DegradationMode::Full => &DetectorKind::ALL,
            DegradationMode::Partial => &PARTIAL_KINDS,
            DegradationMode::Minimal => &MINIMAL_KINDS,
            DegradationMode::Fallback | DegradationMode::Offline => &[],
        }
    }

    /// Whether any (last-known) table state is served
    pub fn serves_state(self) -> bool {
        self != DegradationMode::Offline
    }

    pub fn name(&self) -> &'static str {
        match self {
            DegradationMode::Full => "FULL",
            DegradationMode::Partial => "PARTIAL",
            DegradationMode::Minimal => "MINIMAL",
            DegradationMode::Fallback => "FALLBACK",
            DegradationMode::Offline => "OFFLINE",
        }
    }
}

impl Default for DegradationMode {
    fn default() -> Self {
        DegradationMode::Full
    }
}

impl fmt::Display for DegradationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single one-step transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub from: DegradationMode,
    pub to: DegradationMode,
    pub reason: String,
}

impl ModeChange {
    pub fn is_degradation(&self) -> bool {
        self.to > self.from
    }
}

pub struct DegradationManager {
    mode: DegradationMode,
    failure_threshold: u32,
    recovery_timeout: Duration,
    failure_counts: BTreeMap<DetectorKind, u32>,
    suspended: BTreeSet<DetectorKind>,
    mode_since: Instant,
    last_failure_time: Option<Instant>,
    degraded_this_cycle: bool,
}

impl DegradationManager {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self::new_at(failure_threshold, recovery_timeout, Instant::now())
    }

    pub fn new_at(failure_threshold: u32, recovery_timeout: Duration, now: Instant) -> Self {
        Self {
            mode: DegradationMode::Full,
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            failure_counts: BTreeMap::new(),
            suspended: BTreeSet::new(),
            mode_since: now,
            last_failure_time: None,
            degraded_this_cycle: false,
        }
    }

    /// Start a detection cycle; re-arms the one-degrade-per-cycle guard
    pub fn begin_cycle(&mut self) {
        self.degraded_this_cycle = false;
    }

    pub fn mode(&self) -> DegradationMode {
        self.mode
    }

    pub fn failure_count(&self, kind: DetectorKind) -> u32 {
        self.failure_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn last_failure_time(&self) -> Option<Instant> {
        self.last_failure_time
    }

    pub fn suspended(&self) -> Vec<DetectorKind> {
        self.suspended.iter().copied().collect()
    }

    /// Kinds allowed by the current mode minus suspended ones
    pub fn active_kinds(&self) -> Vec<DetectorKind> {
        self.mode
            .allowed_kinds()
            .iter()
            .copied()
            .filter(|kind| !self.suspended.contains(kind))
            .collect()
    }

    fn recovery_due(&self, now: Instant) -> bool {
        self.mode != DegradationMode::Full
            && now.saturating_duration_since(self.mode_since) >= self.recovery_timeout
    }

    pub fn kinds_to_run(&self) -> Vec<DetectorKind> {
        self.kinds_to_run_at(Instant::now())
    }

    /// Active kinds, or the next level's kinds once recovery is due
    pub fn kinds_to_run_at(&self, now: Instant) -> Vec<DetectorKind> {
        if self.recovery_due(now) && self.mode != DegradationMode::Offline {
            self.mode.upgraded().allowed_kinds().to_vec()
        } else {
            self.active_kinds()
        }
    }

    pub fn record_failure(&mut self, kind: DetectorKind) -> Option<ModeChange> {
        self.record_failure_at(kind, Instant::now())
    }

    /// Count a failed call; degrades one level when the streak reaches the threshold
    pub fn record_failure_at(&mut self, kind: DetectorKind, now: Instant) -> Option<ModeChange> {
        self.last_failure_time = Some(now);
        let count = self.failure_counts.entry(kind).or_insert(0);
        *count += 1;
        if *count < self.failure_threshold {
            return None;
        }

        let streak = *count;
        self.failure_counts.insert(kind, 0);
        self.suspended.insert(kind);
        if self.degraded_this_cycle || self.mode >= DegradationMode::Fallback {
            tracing::debug!("{} detector suspended after {} failures", kind, streak);
            return None;
        }
        let change = self.step(
            self.mode.degraded(),
            format!("{} detector failed {} times in a row", kind, streak),
            now,
        );
        self.degraded_this_cycle = change.is_some();
        change
    }

    pub fn record_success(&mut self, kind: DetectorKind) -> Option<ModeChange> {
        self.record_success_at(kind, Instant::now())
    }

    /// Reset the kind's streak; promotes one level once recovery is due
    pub fn record_success_at(&mut self, kind: DetectorKind, now: Instant) -> Option<ModeChange> {
        self.failure_counts.insert(kind, 0);
        if !self.recovery_due(now) || self.mode == DegradationMode::Offline {
            return None;
        }
        self.suspended.clear();
        self.step(
            self.mode.upgraded(),
            format!("{} detector recovered", kind),
            now,
        )
    }

    /// Capture retries ran out; one level down
    pub fn record_capture_exhausted_at(&mut self, attempts: u32, now: Instant) -> Option<ModeChange> {
        self.last_failure_time = Some(now);
        self.step(
            self.mode.degraded(),
            format!("capture failed {} times in a row", attempts),
            now,
        )
    }

    pub fn record_capture_exhausted(&mut self, attempts: u32) -> Option<ModeChange> {
        self.record_capture_exhausted_at(attempts, Instant::now())
    }

    /// A frame arrived; lifts OFFLINE back to FALLBACK once recovery is due
    pub fn record_capture_success_at(&mut self, now: Instant) -> Option<ModeChange> {
        if self.mode != DegradationMode::Offline || !self.recovery_due(now) {
            return None;
        }
        self.step(
            DegradationMode::Fallback,
            "capture source recovered".to_string(),
            now,
        )
    }

    pub fn record_capture_success(&mut self) -> Option<ModeChange> {
        self.record_capture_success_at(Instant::now())
    }

    fn step(&mut self, to: DegradationMode, reason: String, now: Instant) -> Option<ModeChange> {
        if to == self.mode {
            return None;
        }
        let change = ModeChange {
            from: self.mode,
            to,
            reason,
        };
        if change.is_degradation() {
            tracing::warn!("Degrading {} -> {}: {}", change.from, change.to, change.reason);
        } else {
            tracing::info!("Recovering {} -> {}: {}", change.from, change.to, change.reason);
        }
        self.mode = to;
        self.mode_since = now;
        Some(change)
    }
}
