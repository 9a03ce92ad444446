//! Keypoint frames handed over by the pose-extraction collaborator.
//!
//! - `BodyPart`: closed vocabulary of the 17 tracked landmarks.
//! - `Keypoint`: pixel position, normalized depth and visibility of one landmark.
//! - `KeypointFrame`: the landmarks located in one processed image.
//!
//! Frames are immutable once built. Parts that were not confidently located are
//! simply absent; absence is never encoded as a zero position.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tracked anatomical landmarks, in canonical iteration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl BodyPart {
    pub const ALL: [BodyPart; 17] = [
        BodyPart::Nose,
        BodyPart::LeftEye,
        BodyPart::RightEye,
        BodyPart::LeftEar,
        BodyPart::RightEar,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
    ];

    /// Extremities that carry most of the signal for convulsive movement.
    pub const MOTION_PARTS: [BodyPart; 7] = [
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
        BodyPart::Nose,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BodyPart::Nose => "nose",
            BodyPart::LeftEye => "left_eye",
            BodyPart::RightEye => "right_eye",
            BodyPart::LeftEar => "left_ear",
            BodyPart::RightEar => "right_ear",
            BodyPart::LeftShoulder => "left_shoulder",
            BodyPart::RightShoulder => "right_shoulder",
            BodyPart::LeftElbow => "left_elbow",
            BodyPart::RightElbow => "right_elbow",
            BodyPart::LeftWrist => "left_wrist",
            BodyPart::RightWrist => "right_wrist",
            BodyPart::LeftHip => "left_hip",
            BodyPart::RightHip => "right_hip",
            BodyPart::LeftKnee => "left_knee",
            BodyPart::RightKnee => "right_knee",
            BodyPart::LeftAnkle => "left_ankle",
            BodyPart::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyPart {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        BodyPart::ALL
            .into_iter()
            .find(|part| part.as_str() == normalized)
            .ok_or_else(|| anyhow!("unknown body part: {}", s))
    }
}

/// One located landmark.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Pixel column.
    pub x: i32,
    /// Pixel row (grows downward).
    pub y: i32,
    /// Normalized depth relative to the hips.
    pub z: f32,
    /// Detection confidence 0..=1.
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility: 1.0,
        }
    }

    /// Euclidean pixel distance to another keypoint.
    pub fn distance_to(&self, other: &Keypoint) -> f32 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        dx.hypot(dy) as f32
    }
}

/// Landmarks located in one processed image.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeypointFrame {
    keypoints: BTreeMap<BodyPart, Keypoint>,
}

impl KeypointFrame {
    pub fn new(keypoints: BTreeMap<BodyPart, Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn get(&self, part: BodyPart) -> Option<&Keypoint> {
        self.keypoints.get(&part)
    }

    pub fn contains(&self, part: BodyPart) -> bool {
        self.keypoints.contains_key(&part)
    }

    /// Located parts in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (BodyPart, &Keypoint)> + '_ {
        self.keypoints.iter().map(|(part, kp)| (*part, kp))
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Copy of this frame with every landmark shifted by (dx, dy), clamped to the i32 range.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        let keypoints = self
            .keypoints
            .iter()
            .map(|(part, kp)| {
                (
                    *part,
                    Keypoint {
                        x: kp.x.saturating_add(dx),
                        y: kp.y.saturating_add(dy),
                        ..*kp
                    },
                )
            })
            .collect();
        Self { keypoints }
    }
}

impl FromIterator<(BodyPart, Keypoint)> for KeypointFrame {
    fn from_iter<I: IntoIterator<Item = (BodyPart, Keypoint)>>(iter: I) -> Self {
        Self {
            keypoints: iter.into_iter().collect(),
        }
    }
}
