//! Telemetry records pushed to the rendering collaborator.

use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;
use crate::landmark::TimestampMs;

/// Coarse pipeline state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Active,
    Paused,
    Calibrating,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Calibrating => "calibrating",
        };
        f.write_str(label)
    }
}

/// One telemetry snapshot, emitted after a frame has been processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryUpdate {
    #[serde(rename = "t")]
    pub timestamp_ms: TimestampMs,

    /// Id of the frame that produced this update, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<u64>,

    /// Current filtered cursor position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Point2D>,

    pub face_detected: bool,

    pub state: PipelineState,

    /// Wall time spent processing the frame (microseconds).
    pub latency_us: u64,

    /// Frames dropped by the input buffer so far.
    pub dropped_frames: u64,

    /// Human-readable reasons for actions rejected on this frame.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<String>,
}
