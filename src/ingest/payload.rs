use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::pose::{BodyPart, Keypoint, KeypointFrame};
use crate::Timestamp;

const ROOT_FIELDS: [&str; 2] = ["timestamp", "keypoints"];
const KEYPOINT_FIELDS: [&str; 4] = ["x", "y", "z", "visibility"];

/// One frame as delivered by the pose collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameMessage {
    /// Capture instant, when the producer supplied one.
    pub timestamp: Option<Timestamp>,
    /// `None` when no body was found in the image.
    pub pose: Option<KeypointFrame>,
}

fn ensure_allowed_fields(
    context: &str,
    obj: &serde_json::Map<String, Value>,
    allowed: &[&str],
) -> Result<()> {
    let extras: Vec<String> = obj
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .cloned()
        .collect();
    if extras.is_empty() {
        return Ok(());
    }
    Err(anyhow!(
        "{} payload contains extra fields: {}",
        context,
        extras.join(", ")
    ))
}

fn parse_timestamp(value: &Value) -> Result<Option<Timestamp>> {
    if value.is_null() {
        return Ok(None);
    }
    let secs = value
        .as_f64()
        .ok_or_else(|| anyhow!("timestamp must be a number of seconds"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(anyhow!("timestamp must be a non-negative finite number"));
    }
    Ok(Some(Timestamp::from_secs_f64(secs)))
}

fn parse_pixel(part: BodyPart, obj: &serde_json::Map<String, Value>, axis: &str) -> Result<i32> {
    let raw = obj
        .get(axis)
        .ok_or_else(|| anyhow!("{}.{} is required", part, axis))?
        .as_i64()
        .ok_or_else(|| anyhow!("{}.{} must be an integer pixel coordinate", part, axis))?;
    i32::try_from(raw).map_err(|_| anyhow!("{}.{} out of range", part, axis))
}

fn parse_keypoint(part: BodyPart, value: &Value) -> Result<Keypoint> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("{} must be an object", part))?;
    ensure_allowed_fields(part.as_str(), obj, &KEYPOINT_FIELDS)?;

    let x = parse_pixel(part, obj, "x")?;
    let y = parse_pixel(part, obj, "y")?;
    let z = match obj.get("z") {
        None => 0.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| anyhow!("{}.z must be a number", part))? as f32,
    };
    let visibility = match obj.get("visibility") {
        None => 1.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| anyhow!("{}.visibility must be a number", part))? as f32,
    };
    if !(0.0..=1.0).contains(&visibility) {
        return Err(anyhow!("{}.visibility must be within [0, 1]", part));
    }

    Ok(Keypoint {
        x,
        y,
        z,
        visibility,
    })
}

fn parse_keypoints(value: &Value) -> Result<Option<KeypointFrame>> {
    if value.is_null() {
        return Ok(None);
    }
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("keypoints must be an object or null"))?;
    let mut points = Vec::with_capacity(obj.len());
    for (name, raw) in obj {
        let part: BodyPart = name.parse()?;
        points.push((part, parse_keypoint(part, raw)?));
    }
    Ok(Some(points.into_iter().collect()))
}

/// Parse a frame payload while rejecting any extra fields.
pub fn parse_frame_payload(payload: &Value) -> Result<FrameMessage> {
    let obj = payload
        .as_object()
        .ok_or_else(|| anyhow!("frame payload must be a JSON object"))?;
    ensure_allowed_fields("frame", obj, &ROOT_FIELDS)?;

    let timestamp = match obj.get("timestamp") {
        Some(value) => parse_timestamp(value)?,
        None => None,
    };
    let pose = obj
        .get("keypoints")
        .ok_or_else(|| anyhow!("keypoints is required (use null when no body was found)"))
        .and_then(parse_keypoints)?;

    Ok(FrameMessage { timestamp, pose })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_payload() {
        let payload = json!({
            "timestamp": 1_700_000_000.25,
            "keypoints": {
                "nose": {"x": 200, "y": 100, "z": -0.1, "visibility": 0.9},
                "left_hip": {"x": 185, "y": 260}
            }
        });
        let msg = parse_frame_payload(&payload).unwrap();
        assert_eq!(msg.timestamp, Some(Timestamp::from_secs_f64(1_700_000_000.25)));
        let pose = msg.pose.unwrap();
        assert_eq!(pose.len(), 2);
        let nose = pose.get(BodyPart::Nose).unwrap();
        assert_eq!((nose.x, nose.y), (200, 100));
        assert!((nose.visibility - 0.9).abs() < 1e-6);
        assert_eq!(pose.get(BodyPart::LeftHip).unwrap().visibility, 1.0);
    }

    #[test]
    fn null_keypoints_means_no_body() {
        let msg = parse_frame_payload(&json!({"keypoints": null})).unwrap();
        assert!(msg.pose.is_none());
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn missing_keypoints_is_rejected() {
        assert!(parse_frame_payload(&json!({"timestamp": 1.0})).is_err());
    }

    #[test]
    fn rejects_extra_root_fields() {
        let payload = json!({"keypoints": null, "frame_id": 7});
        let err = parse_frame_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("frame_id"));
    }

    #[test]
    fn rejects_extra_keypoint_fields() {
        let payload = json!({"keypoints": {"nose": {"x": 1, "y": 2, "label": "n"}}});
        assert!(parse_frame_payload(&payload).is_err());
    }

    #[test]
    fn rejects_unknown_part() {
        let payload = json!({"keypoints": {"tail": {"x": 1, "y": 2}}});
        let err = parse_frame_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("unknown body part"));
    }

    #[test]
    fn rejects_fractional_pixels() {
        let payload = json!({"keypoints": {"nose": {"x": 1.5, "y": 2}}});
        assert!(parse_frame_payload(&payload).is_err());
    }

    #[test]
    fn rejects_visibility_out_of_range() {
        let payload = json!({"keypoints": {"nose": {"x": 1, "y": 2, "visibility": 1.5}}});
        assert!(parse_frame_payload(&payload).is_err());
    }

    #[test]
    fn rejects_negative_timestamp() {
        assert!(parse_frame_payload(&json!({"timestamp": -1.0, "keypoints": null})).is_err());
    }
}
