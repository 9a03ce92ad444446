//! Seizure Watch
//!
//! This crate implements a streaming alert detector over body-keypoint frames.
//!
//! # Architecture
//!
//! Every frame flows through one `SeizureDetector` per monitored subject:
//!
//! 1. **Velocity**: per-part pixel displacement against the previous frame.
//! 2. **Analyzers**: fall posture, rapid movement, immobility, seizure patterns.
//! 3. **Arbiter**: cooldown gate, highest-confidence winner, fixed tie-break order.
//!
//! The detector never fails mid-stream. Missing landmarks or a missing history
//! frame produce non-detecting results; sink failures are reported and counted
//! by the session but never change a decision.
//!
//! # Module Structure
//!
//! - `pose`: Keypoint frames (BodyPart, Keypoint, KeypointFrame)
//! - `detect`: Analyzers and their results
//! - `ingest`: JSON-lines frame payloads from the pose collaborator
//! - `alert`: Alert records, sinks and the dispatcher
//! - `session`: Monitoring session (start/stop, counters, dispatch)
//! - `transport`: MQTT alert publishing
//! - Core types: Timestamp, AlertType, AlertDecision, SeizureDetector

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod alert;
pub mod config;
pub mod detect;
pub mod ingest;
pub mod pose;
pub mod session;
pub mod transport;

pub use alert::{AlertDispatcher, AlertRecord, AlertSink, BroadcastSink, EventLogSink};
pub use config::{ClockSource, DetectorConfig, WatchdConfig};
pub use detect::{DetectionDetails, DetectionResult, PatternSpec, VelocityMap};
pub use ingest::{FrameMessage, FrameReader};
pub use pose::{BodyPart, Keypoint, KeypointFrame};
pub use session::{MonitorSession, SessionStatus};

// -------------------- Timestamps --------------------

/// Wall-clock instant, stored as the offset from the UNIX epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(Duration::ZERO);

    /// Samples the wall clock. A clock set before 1970 reads as the epoch.
    pub fn now() -> Self {
        Self(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
        )
    }

    pub fn from_duration(since_epoch: Duration) -> Self {
        Self(since_epoch)
    }

    /// Negative or non-finite inputs clamp to the epoch.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn since_epoch(&self) -> Duration {
        self.0
    }

    /// Time elapsed since `earlier`; zero if `earlier` is in the future.
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    pub fn to_rfc3339(&self) -> String {
        let secs = i64::try_from(self.0.as_secs()).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp(secs, self.0.subsec_nanos())
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

// -------------------- Alert Decisions --------------------

/// Alert categories, in tie-break order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Fall,
    RapidMovements,
    Immobility,
    SeizurePatterns,
    None,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Fall => "fall",
            AlertType::RapidMovements => "rapid_movements",
            AlertType::Immobility => "immobility",
            AlertType::SeizurePatterns => "seizure_patterns",
            AlertType::None => "none",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

pub const NO_ALERT_DESCRIPTION: &str = "No abnormal movements detected";

/// One decision per processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertDecision {
    pub alert: bool,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub confidence: f32,
    pub description: String,
    /// Winning analyzer output; absent when no alert fired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<DetectionResult>,
}

impl AlertDecision {
    pub fn no_alert() -> Self {
        Self {
            alert: false,
            alert_type: AlertType::None,
            confidence: 0.0,
            description: NO_ALERT_DESCRIPTION.to_string(),
            details: None,
        }
    }

    fn from_winner(alert_type: AlertType, result: DetectionResult) -> Self {
        Self {
            alert: true,
            alert_type,
            confidence: result.confidence,
            description: result.reason.clone(),
            details: Some(result),
        }
    }
}

/// The four analyzer outputs for one frame, kept in tie-break order.
#[derive(Clone, Debug)]
pub struct FrameAnalysis {
    pub fall: DetectionResult,
    pub rapid_movements: DetectionResult,
    pub immobility: DetectionResult,
    pub seizure_patterns: DetectionResult,
}

impl FrameAnalysis {
    /// Highest-confidence detected result. Earlier entries keep ties.
    pub fn winner(self) -> Option<(AlertType, DetectionResult)> {
        let mut best: Option<(AlertType, DetectionResult)> = None;
        for (alert_type, result) in [
            (AlertType::Fall, self.fall),
            (AlertType::RapidMovements, self.rapid_movements),
            (AlertType::Immobility, self.immobility),
            (AlertType::SeizurePatterns, self.seizure_patterns),
        ] {
            if !result.detected {
                continue;
            }
            if best
                .as_ref()
                .map_or(true, |(_, current)| result.confidence > current.confidence)
            {
                best = Some((alert_type, result));
            }
        }
        best
    }
}

// -------------------- Detector --------------------

/// Mutable per-subject state. Owned by exactly one detector.
#[derive(Clone, Debug, Default)]
pub struct DetectorState {
    pub previous_frame: Option<KeypointFrame>,
    pub immobility: detect::ImmobilityTimer,
    /// `None` until the first alert fires.
    pub last_alert_time: Option<Timestamp>,
}

/// Stateful per-subject classifier. Feed frames strictly in arrival order.
pub struct SeizureDetector {
    config: DetectorConfig,
    fall: detect::FallAnalyzer,
    rapid: detect::RapidMovementAnalyzer,
    immobility: detect::ImmobilityTracker,
    patterns: detect::SeizurePatternMatcher,
    state: DetectorState,
}

impl SeizureDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let detector = Self {
            fall: detect::FallAnalyzer::new(config.fall_threshold),
            rapid: detect::RapidMovementAnalyzer::new(config.rapid_movement_threshold),
            immobility: detect::ImmobilityTracker::new(
                config.immobility_movement_threshold,
                config.immobility_duration,
            ),
            patterns: detect::SeizurePatternMatcher::new(config.patterns.clone()),
            state: DetectorState::default(),
            config,
        };
        log::info!(
            "seizure detector initialized (patterns: {})",
            detector
                .patterns
                .patterns()
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        detector
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Processes one frame using a single wall-clock sample.
    pub fn analyze_now(&mut self, frame: Option<&KeypointFrame>) -> AlertDecision {
        self.analyze(frame, Timestamp::now())
    }

    /// Processes one frame observed at `now`.
    ///
    /// `None` means the pose collaborator found no body: no analysis runs and
    /// all state is left untouched.
    pub fn analyze(&mut self, frame: Option<&KeypointFrame>, now: Timestamp) -> AlertDecision {
        let Some(frame) = frame else {
            return AlertDecision::no_alert();
        };

        let analysis = self.run_analyzers(frame, now);

        let in_cooldown = self
            .state
            .last_alert_time
            .is_some_and(|last| now.saturating_since(last) < self.config.alert_cooldown);

        let decision = if in_cooldown {
            AlertDecision::no_alert()
        } else {
            match analysis.winner() {
                Some((alert_type, result)) => {
                    self.state.last_alert_time = Some(now);
                    AlertDecision::from_winner(alert_type, result)
                }
                None => AlertDecision::no_alert(),
            }
        };

        self.state.previous_frame = Some(frame.clone());
        decision
    }

    fn run_analyzers(&mut self, frame: &KeypointFrame, now: Timestamp) -> FrameAnalysis {
        let previous = self.state.previous_frame.as_ref();
        let velocities =
            VelocityMap::between_tracked(frame, previous, self.config.tracked_parts.as_deref());
        FrameAnalysis {
            fall: self.fall.analyze(frame),
            rapid_movements: self.rapid.analyze(&velocities),
            immobility: self.immobility.analyze(
                frame,
                previous,
                &mut self.state.immobility,
                now,
            ),
            seizure_patterns: self.patterns.analyze(&velocities),
        }
    }

    /// Forget the subject: equivalent to a freshly constructed detector.
    pub fn reset(&mut self) {
        self.state = DetectorState::default();
        log::info!("seizure detector state reset");
    }
}

// -------------------- Detector Tests --------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: f64) -> Timestamp {
        Timestamp::from_secs_f64(1_700_000_000.0 + secs)
    }

    /// Upright subject, all 17 landmarks.
    fn standing() -> KeypointFrame {
        let layout = [
            (BodyPart::Nose, 200, 100),
            (BodyPart::LeftEye, 195, 95),
            (BodyPart::RightEye, 205, 95),
            (BodyPart::LeftEar, 190, 100),
            (BodyPart::RightEar, 210, 100),
            (BodyPart::LeftShoulder, 180, 150),
            (BodyPart::RightShoulder, 220, 150),
            (BodyPart::LeftElbow, 170, 200),
            (BodyPart::RightElbow, 230, 200),
            (BodyPart::LeftWrist, 165, 250),
            (BodyPart::RightWrist, 235, 250),
            (BodyPart::LeftHip, 185, 260),
            (BodyPart::RightHip, 215, 260),
            (BodyPart::LeftKnee, 185, 340),
            (BodyPart::RightKnee, 215, 340),
            (BodyPart::LeftAnkle, 185, 420),
            (BodyPart::RightAnkle, 215, 420),
        ];
        layout
            .into_iter()
            .map(|(part, x, y)| (part, Keypoint::new(x, y)))
            .collect()
    }

    /// Lying down, head below hips.
    fn fallen() -> KeypointFrame {
        let mut points: Vec<(BodyPart, Keypoint)> =
            standing().iter().map(|(part, kp)| (part, *kp)).collect();
        for (part, kp) in points.iter_mut() {
            match part {
                BodyPart::Nose => kp.y = 310,
                BodyPart::LeftHip | BodyPart::RightHip => kp.y = 300,
                BodyPart::LeftAnkle | BodyPart::RightAnkle => kp.y = 420,
                _ => {}
            }
        }
        points.into_iter().collect()
    }

    /// Only the wrists jump by `step` pixels.
    fn wrists_shifted(base: &KeypointFrame, step: i32) -> KeypointFrame {
        base.iter()
            .map(|(part, kp)| {
                let mut kp = *kp;
                if matches!(part, BodyPart::LeftWrist | BodyPart::RightWrist) {
                    kp.x += step;
                }
                (part, kp)
            })
            .collect()
    }

    #[test]
    fn absent_pose_leaves_state_untouched() {
        let mut detector = SeizureDetector::new(DetectorConfig::default());
        let decision = detector.analyze(None, at(0.0));
        assert_eq!(decision, AlertDecision::no_alert());
        assert!(detector.state().previous_frame.is_none());
        assert!(!detector.state().immobility.is_active());
        assert!(detector.state().last_alert_time.is_none());
    }

    #[test]
    fn first_frame_records_history_without_alerting() {
        let mut detector = SeizureDetector::new(DetectorConfig::default());
        let decision = detector.analyze(Some(&standing()), at(0.0));
        assert!(!decision.alert);
        assert_eq!(decision.alert_type, AlertType::None);
        assert_eq!(decision.description, NO_ALERT_DESCRIPTION);
        assert_eq!(detector.state().previous_frame, Some(standing()));
    }

    #[test]
    fn fallen_posture_raises_fall_alert() {
        let mut detector = SeizureDetector::new(DetectorConfig::default());
        let decision = detector.analyze(Some(&fallen()), at(0.0));
        assert!(decision.alert);
        assert_eq!(decision.alert_type, AlertType::Fall);
        assert!((decision.confidence - 0.8).abs() < 1e-6);
        assert_eq!(
            decision.description,
            "Body in horizontal position with head below hips"
        );
        assert_eq!(detector.state().last_alert_time, Some(at(0.0)));
    }

    #[test]
    fn cooldown_suppresses_until_it_elapses() {
        let mut detector = SeizureDetector::new(DetectorConfig::default());
        assert!(detector.analyze(Some(&fallen()), at(0.0)).alert);
        assert!(!detector.analyze(Some(&fallen()), at(1.0)).alert);
        assert!(!detector.analyze(Some(&fallen()), at(4.999)).alert);
        // still the original alert time
        assert_eq!(detector.state().last_alert_time, Some(at(0.0)));
        let decision = detector.analyze(Some(&fallen()), at(5.0));
        assert!(decision.alert);
        assert_eq!(detector.state().last_alert_time, Some(at(5.0)));
    }

    #[test]
    fn previous_frame_advances_during_cooldown() {
        let mut detector = SeizureDetector::new(DetectorConfig::default());
        detector.analyze(Some(&fallen()), at(0.0));
        let moved = fallen().translated(3, 0);
        let decision = detector.analyze(Some(&moved), at(1.0));
        assert!(!decision.alert);
        assert_eq!(detector.state().previous_frame, Some(moved));
    }

    #[test]
    fn rapid_movement_outranks_weaker_results() {
        let mut detector = SeizureDetector::new(DetectorConfig::default());
        let base = standing();
        detector.analyze(Some(&base), at(0.0));
        // two wrists at 60 px: rapid 0.6; patterns stay below their thresholds
        let decision = detector.analyze(Some(&wrists_shifted(&base, 60)), at(0.1));
        assert!(decision.alert);
        assert_eq!(decision.alert_type, AlertType::RapidMovements);
        assert!((decision.confidence - 0.6).abs() < 1e-6);
        assert_eq!(decision.description, "Detected 2 rapid movements");
    }

    #[test]
    fn winner_ties_follow_declaration_order() {
        let tied = |reason: &str| DetectionResult::positive(0.8, reason, DetectionDetails::None);
        let analysis = FrameAnalysis {
            fall: DetectionResult::negative("upright"),
            rapid_movements: DetectionResult::negative("quiet"),
            immobility: tied("frozen"),
            seizure_patterns: tied("pattern"),
        };
        let (alert_type, result) = analysis.winner().expect("winner");
        assert_eq!(alert_type, AlertType::Immobility);
        assert_eq!(result.reason, "frozen");
    }

    #[test]
    fn winner_prefers_higher_confidence() {
        let analysis = FrameAnalysis {
            fall: DetectionResult::positive(0.8, "fall", DetectionDetails::None),
            rapid_movements: DetectionResult::positive(0.9, "rapid", DetectionDetails::None),
            immobility: DetectionResult::negative("moving"),
            seizure_patterns: DetectionResult::negative("none"),
        };
        let (alert_type, _) = analysis.winner().expect("winner");
        assert_eq!(alert_type, AlertType::RapidMovements);
    }

    #[test]
    fn immobility_alert_fires_after_ten_still_seconds() {
        let mut detector = SeizureDetector::new(DetectorConfig::default());
        let still = standing();
        let mut first_alert = None;
        for second in 0..=12 {
            let decision = detector.analyze(Some(&still), at(second as f64));
            if decision.alert && first_alert.is_none() {
                first_alert = Some((second, decision));
            }
        }
        let (second, decision) = first_alert.expect("immobility alert");
        // timer starts on the second frame (t=1); elapsed exceeds 10s at t=12
        assert_eq!(second, 12);
        assert_eq!(decision.alert_type, AlertType::Immobility);
        assert!((decision.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn reset_matches_fresh_construction() {
        let mut detector = SeizureDetector::new(DetectorConfig::default());
        detector.analyze(Some(&standing()), at(0.0));
        detector.analyze(Some(&standing()), at(1.0));
        detector.analyze(Some(&fallen()), at(2.0));
        assert!(detector.state().last_alert_time.is_some());

        detector.reset();
        assert!(detector.state().previous_frame.is_none());
        assert!(!detector.state().immobility.is_active());
        assert!(detector.state().last_alert_time.is_none());
        assert!(detector.analyze(Some(&fallen()), at(2.5)).alert);
    }

    #[test]
    fn confidences_stay_in_unit_range() {
        let mut detector = SeizureDetector::new(DetectorConfig::default());
        let base = standing();
        let frames = [
            base.clone(),
            wrists_shifted(&base, 500),
            base.translated(400, 400),
            fallen(),
            base.clone(),
        ];
        for (i, frame) in frames.iter().enumerate() {
            let decision = detector.analyze(Some(frame), at(i as f64 * 10.0));
            assert!((0.0..=1.0).contains(&decision.confidence));
            if !decision.alert {
                assert_eq!(decision.confidence, 0.0);
            }
        }
    }

    #[test]
    fn timestamp_renders_rfc3339_utc() {
        let ts = Timestamp::from_secs_f64(1_700_000_000.5);
        assert_eq!(ts.to_rfc3339(), "2023-11-14T22:13:20.500000Z");
        assert_eq!(Timestamp::from_secs_f64(-3.0), Timestamp::EPOCH);
    }
}
