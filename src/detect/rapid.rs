use crate::detect::result::{DetectionDetails, DetectionResult, RapidMovement, Severity};
use crate::detect::velocity::VelocityMap;

const CONFIDENCE_PER_PART: f32 = 0.3;
const MAX_CONFIDENCE: f32 = 0.9;

/// Flags parts whose frame-to-frame displacement exceeds a threshold.
#[derive(Clone, Debug)]
pub struct RapidMovementAnalyzer {
    threshold: f32,
}

impl RapidMovementAnalyzer {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn analyze(&self, velocities: &VelocityMap) -> DetectionResult {
        let movements: Vec<RapidMovement> = velocities
            .iter()
            .filter(|(_, velocity)| *velocity > self.threshold)
            .map(|(part, velocity)| RapidMovement {
                part,
                velocity,
                severity: if velocity > self.threshold * 2.0 {
                    Severity::High
                } else {
                    Severity::Medium
                },
            })
            .collect();

        if movements.is_empty() {
            return DetectionResult::negative_with(
                "No rapid movements detected",
                DetectionDetails::RapidMovements { movements },
            );
        }

        let confidence = (CONFIDENCE_PER_PART * movements.len() as f32).min(MAX_CONFIDENCE);
        let reason = format!("Detected {} rapid movements", movements.len());
        DetectionResult::positive(
            confidence,
            reason,
            DetectionDetails::RapidMovements { movements },
        )
    }
}
