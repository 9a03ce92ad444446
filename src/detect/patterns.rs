use serde::{Deserialize, Serialize};

use crate::detect::result::{DetectionDetails, DetectionResult};
use crate::detect::velocity::VelocityMap;

const HIGH_VELOCITY_WEIGHT: f32 = 0.6;
const VELOCITY_RATIO_WEIGHT: f32 = 0.4;

/// Named motion signature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub description: String,
    /// Per-part displacement (pixels/frame) that counts as "high".
    pub velocity_threshold: f32,
    /// Consistency must exceed this for the pattern to match.
    pub consistency_threshold: f32,
}

impl PatternSpec {
    pub fn new(
        name: &str,
        description: &str,
        velocity_threshold: f32,
        consistency_threshold: f32,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            velocity_threshold,
            consistency_threshold,
        }
    }

    /// Blend of how many parts exceed the threshold and how close the mean comes to it.
    ///
    /// Returns `None` for an empty map.
    pub fn consistency(&self, velocities: &VelocityMap) -> Option<f32> {
        let avg_velocity = velocities.average()?;
        let high = velocities
            .values()
            .filter(|v| *v > self.velocity_threshold)
            .count();
        let high_velocity_ratio = high as f32 / velocities.len() as f32;
        let velocity_ratio = (avg_velocity / self.velocity_threshold).min(1.0);
        let consistency =
            HIGH_VELOCITY_WEIGHT * high_velocity_ratio + VELOCITY_RATIO_WEIGHT * velocity_ratio;
        Some(consistency.min(1.0))
    }
}

/// Default signature table, in tie-break order.
pub fn default_patterns() -> Vec<PatternSpec> {
    vec![
        PatternSpec::new(
            "tonic_clonic",
            "Tonic-clonic seizure with rhythmic movements",
            80.0,
            0.7,
        ),
        PatternSpec::new("myoclonic", "Myoclonic seizure with sudden jerks", 100.0, 0.6),
        PatternSpec::new(
            "atonic",
            "Atonic seizure with sudden loss of muscle tone",
            20.0,
            0.8,
        ),
    ]
}

/// Scores velocity profiles against an ordered pattern table.
#[derive(Clone, Debug)]
pub struct SeizurePatternMatcher {
    patterns: Vec<PatternSpec>,
}

impl SeizurePatternMatcher {
    pub fn new(patterns: Vec<PatternSpec>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[PatternSpec] {
        &self.patterns
    }

    pub fn analyze(&self, velocities: &VelocityMap) -> DetectionResult {
        let Some(avg_velocity) = velocities.average() else {
            return DetectionResult::negative("No seizure patterns detected");
        };

        let mut best: Option<(&PatternSpec, f32)> = None;
        for pattern in &self.patterns {
            let Some(consistency) = pattern.consistency(velocities) else {
                continue;
            };
            if consistency <= pattern.consistency_threshold {
                continue;
            }
            // Strictly greater: earlier-declared patterns keep ties.
            if best.map_or(true, |(_, score)| consistency > score) {
                best = Some((pattern, consistency));
            }
        }

        match best {
            Some((pattern, consistency)) => DetectionResult::positive(
                consistency,
                format!("Detected {} seizure pattern", pattern.description),
                DetectionDetails::SeizurePattern {
                    pattern: pattern.name.clone(),
                    description: pattern.description.clone(),
                    avg_velocity,
                },
            ),
            None => DetectionResult::negative("No seizure patterns detected"),
        }
    }
}
