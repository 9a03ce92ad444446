//! Per-frame analyzers.
//!
//! Each analyzer turns one keypoint frame (plus the derived velocity map and,
//! for immobility, a timer) into a `DetectionResult`. None of them can fail:
//! missing landmarks or a missing history frame yield a non-detecting result
//! with a diagnostic reason.

mod fall;
mod immobility;
mod patterns;
mod rapid;
mod result;
mod velocity;

pub use fall::FallAnalyzer;
pub use immobility::{ImmobilityPhase, ImmobilityTimer, ImmobilityTracker};
pub use patterns::{default_patterns, PatternSpec, SeizurePatternMatcher};
pub use rapid::RapidMovementAnalyzer;
pub use result::{DetectionDetails, DetectionResult, RapidMovement, Severity};
pub use velocity::VelocityMap;
