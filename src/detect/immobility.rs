use std::time::Duration;

use crate::detect::result::{DetectionDetails, DetectionResult};
use crate::detect::velocity::VelocityMap;
use crate::pose::KeypointFrame;
use crate::Timestamp;

const IMMOBILITY_CONFIDENCE: f32 = 0.8;

/// Phase of the per-subject freeze state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImmobilityPhase {
    /// Timer inactive.
    Moving,
    /// Timer running, duration threshold not yet exceeded.
    Freezing,
    /// Duration threshold exceeded; alerts on every still frame.
    Frozen,
}

/// Running "frozen" timer. Active iff a start instant is recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImmobilityTimer {
    started_at: Option<Timestamp>,
}

impl ImmobilityTimer {
    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    pub fn elapsed(&self, now: Timestamp) -> Option<Duration> {
        self.started_at.map(|start| now.saturating_since(start))
    }

    pub fn phase(&self, now: Timestamp, threshold: Duration) -> ImmobilityPhase {
        match self.elapsed(now) {
            None => ImmobilityPhase::Moving,
            Some(elapsed) if elapsed > threshold => ImmobilityPhase::Frozen,
            Some(_) => ImmobilityPhase::Freezing,
        }
    }

    fn start_if_idle(&mut self, now: Timestamp) -> Timestamp {
        *self.started_at.get_or_insert(now)
    }

    pub fn clear(&mut self) {
        self.started_at = None;
    }
}

/// Detects freezing episodes from average whole-body movement.
#[derive(Clone, Debug)]
pub struct ImmobilityTracker {
    movement_threshold: f32,
    duration_threshold: Duration,
}

impl ImmobilityTracker {
    pub fn new(movement_threshold: f32, duration_threshold: Duration) -> Self {
        Self {
            movement_threshold,
            duration_threshold,
        }
    }

    pub fn duration_threshold(&self) -> Duration {
        self.duration_threshold
    }

    /// Advances `timer` for one frame observed at `now`.
    ///
    /// Without a previous frame, or with no part located in both frames, the
    /// timer is left untouched.
    pub fn analyze(
        &self,
        frame: &KeypointFrame,
        previous: Option<&KeypointFrame>,
        timer: &mut ImmobilityTimer,
        now: Timestamp,
    ) -> DetectionResult {
        if previous.is_none() {
            return DetectionResult::negative("No previous frame");
        }

        // Whole-body average, independent of any tracked-part restriction.
        let Some(avg_movement) = VelocityMap::between(frame, previous).average() else {
            return DetectionResult::negative("No comparable keypoints");
        };

        if avg_movement >= self.movement_threshold {
            timer.clear();
            return DetectionResult::negative("Normal movement detected");
        }

        let started_at = timer.start_if_idle(now);
        let elapsed = now.saturating_since(started_at);
        if elapsed <= self.duration_threshold {
            return DetectionResult::negative(format!(
                "Low movement for {:.1}s",
                elapsed.as_secs_f64()
            ));
        }

        DetectionResult::positive(
            IMMOBILITY_CONFIDENCE,
            format!(
                "Freezing episode detected (duration: {:.1}s)",
                elapsed.as_secs_f64()
            ),
            DetectionDetails::Immobility {
                duration_secs: elapsed.as_secs_f64(),
                avg_movement,
            },
        )
    }
}
