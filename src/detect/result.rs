use serde::{Deserialize, Serialize};

use crate::pose::BodyPart;

/// Output of a single analyzer for one frame.
///
/// `confidence` is always within 0..=1 and is exactly 0 whenever `detected` is false.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detected: bool,
    pub confidence: f32,
    pub reason: String,
    pub details: DetectionDetails,
}

impl DetectionResult {
    /// Non-detecting result carrying only a diagnostic reason.
    pub fn negative(reason: impl Into<String>) -> Self {
        Self::negative_with(reason, DetectionDetails::None)
    }

    pub fn negative_with(reason: impl Into<String>, details: DetectionDetails) -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            reason: reason.into(),
            details,
        }
    }

    pub fn positive(confidence: f32, reason: impl Into<String>, details: DetectionDetails) -> Self {
        Self {
            detected: true,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            details,
        }
    }
}

/// Fixed-shape extras per analyzer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionDetails {
    #[default]
    None,
    Fall {
        body_height: f32,
        body_width: f32,
        /// Raw posture score before thresholding.
        posture_score: f32,
    },
    RapidMovements {
        movements: Vec<RapidMovement>,
    },
    Immobility {
        duration_secs: f64,
        avg_movement: f32,
    },
    SeizurePattern {
        pattern: String,
        description: String,
        avg_velocity: f32,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RapidMovement {
    pub part: BodyPart,
    pub velocity: f32,
    pub severity: Severity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}
