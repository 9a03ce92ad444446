use std::collections::BTreeMap;

use crate::pose::{BodyPart, KeypointFrame};

/// Per-part pixel displacement between two consecutive frames.
///
/// A part is present only when it was located in both frames.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VelocityMap {
    velocities: BTreeMap<BodyPart, f32>,
}

impl VelocityMap {
    /// Displacements for every part located in both frames.
    pub fn between(current: &KeypointFrame, previous: Option<&KeypointFrame>) -> Self {
        Self::between_tracked(current, previous, None)
    }

    /// Like `between`, restricted to `tracked` when given.
    pub fn between_tracked(
        current: &KeypointFrame,
        previous: Option<&KeypointFrame>,
        tracked: Option<&[BodyPart]>,
    ) -> Self {
        let Some(previous) = previous else {
            return Self::default();
        };
        let velocities = current
            .iter()
            .filter(|(part, _)| tracked.map_or(true, |parts| parts.contains(part)))
            .filter_map(|(part, kp)| {
                previous
                    .get(part)
                    .map(|prev| (part, kp.distance_to(prev)))
            })
            .collect();
        Self { velocities }
    }

    pub fn get(&self, part: BodyPart) -> Option<f32> {
        self.velocities.get(&part).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyPart, f32)> + '_ {
        self.velocities.iter().map(|(part, v)| (*part, *v))
    }

    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.velocities.values().copied()
    }

    pub fn len(&self) -> usize {
        self.velocities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.velocities.is_empty()
    }

    /// Mean displacement, or `None` when nothing was comparable.
    pub fn average(&self) -> Option<f32> {
        if self.velocities.is_empty() {
            return None;
        }
        Some(self.values().sum::<f32>() / self.velocities.len() as f32)
    }
}

impl FromIterator<(BodyPart, f32)> for VelocityMap {
    fn from_iter<I: IntoIterator<Item = (BodyPart, f32)>>(iter: I) -> Self {
        Self {
            velocities: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    fn frame(points: &[(BodyPart, i32, i32)]) -> KeypointFrame {
        points
            .iter()
            .map(|(part, x, y)| (*part, Keypoint::new(*x, *y)))
            .collect()
    }

    #[test]
    fn no_previous_frame_yields_empty_map() {
        let current = frame(&[(BodyPart::Nose, 10, 10)]);
        let map = VelocityMap::between(&current, None);
        assert!(map.is_empty());
        assert_eq!(map.average(), None);
    }

    #[test]
    fn parts_missing_from_either_frame_are_omitted() {
        let previous = frame(&[(BodyPart::Nose, 0, 0), (BodyPart::LeftWrist, 0, 0)]);
        let current = frame(&[(BodyPart::Nose, 3, 4), (BodyPart::RightWrist, 9, 9)]);
        let map = VelocityMap::between(&current, Some(&previous));
        assert_eq!(map.len(), 1);
        assert!((map.get(BodyPart::Nose).unwrap() - 5.0).abs() < 1e-6);
        assert_eq!(map.get(BodyPart::LeftWrist), None);
        assert_eq!(map.get(BodyPart::RightWrist), None);
    }

    #[test]
    fn stationary_part_reports_zero_not_absence() {
        let previous = frame(&[(BodyPart::LeftHip, 100, 200)]);
        let current = previous.clone();
        let map = VelocityMap::between(&current, Some(&previous));
        assert_eq!(map.get(BodyPart::LeftHip), Some(0.0));
    }

    #[test]
    fn tracked_subset_filters_parts() {
        let previous = frame(&[(BodyPart::Nose, 0, 0), (BodyPart::LeftKnee, 0, 0)]);
        let current = frame(&[(BodyPart::Nose, 0, 10), (BodyPart::LeftKnee, 0, 10)]);
        let map = VelocityMap::between_tracked(
            &current,
            Some(&previous),
            Some(&BodyPart::MOTION_PARTS),
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(BodyPart::Nose), Some(10.0));
    }

    #[test]
    fn opposite_edges_of_the_pixel_range_give_a_finite_velocity() {
        let previous = frame(&[(BodyPart::Nose, -2_000_000_000, 0)]);
        let current = frame(&[(BodyPart::Nose, 2_000_000_000, 0)]);
        let map = VelocityMap::between(&current, Some(&previous));
        let velocity = map.get(BodyPart::Nose).unwrap();
        assert!(velocity.is_finite());
        assert!((velocity - 4.0e9).abs() < 1e3);
        assert_eq!(map.average(), Some(velocity));
    }
}
