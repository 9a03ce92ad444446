use crate::detect::result::{DetectionDetails, DetectionResult};
use crate::pose::{BodyPart, KeypointFrame};

/// Horizontal width must exceed this multiple of torso height to count as lying down.
const HORIZONTAL_RATIO: f32 = 1.5;

/// Scores horizontal-collapse posture from torso and leg landmarks.
#[derive(Clone, Debug)]
pub struct FallAnalyzer {
    threshold: f32,
}

impl FallAnalyzer {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Requires nose, both hips and both ankles.
    pub fn analyze(&self, frame: &KeypointFrame) -> DetectionResult {
        let (Some(nose), Some(left_hip), Some(right_hip), Some(left_ankle), Some(right_ankle)) = (
            frame.get(BodyPart::Nose),
            frame.get(BodyPart::LeftHip),
            frame.get(BodyPart::RightHip),
            frame.get(BodyPart::LeftAnkle),
            frame.get(BodyPart::RightAnkle),
        ) else {
            return DetectionResult::negative("Missing keypoints");
        };

        let nose_y = nose.y as f32;
        // Averaged in float: two extreme pixel rows overflow i32.
        let hip_y = (left_hip.y as f32 + right_hip.y as f32) / 2.0;
        let ankle_y = (left_ankle.y as f32 + right_ankle.y as f32) / 2.0;

        let body_height = (hip_y - nose_y).abs();
        let body_width = (ankle_y - hip_y).abs();

        let is_horizontal = body_width > body_height * HORIZONTAL_RATIO;
        let head_below_hips = nose_y > hip_y;

        let (score, reason) = match (is_horizontal, head_below_hips) {
            (true, true) => (0.8, "Body in horizontal position with head below hips"),
            (true, false) => (0.6, "Body in horizontal position"),
            (false, true) => (0.4, "Head position below hips"),
            (false, false) => (0.0, "Upright posture"),
        };

        let details = DetectionDetails::Fall {
            body_height,
            body_width,
            posture_score: score,
        };

        // Strict comparison: a score equal to the threshold does not fire.
        if score > self.threshold {
            DetectionResult::positive(score, reason, details)
        } else {
            DetectionResult::negative_with(reason, details)
        }
    }
}
