//! Landmark frames produced by the external face/iris detector.
//!
//! Frames are exchanged as JSONL, one frame per line. Landmark coordinates
//! are normalized to `[0.0, 1.0]` relative to the camera image and follow
//! the 478-point face-mesh layout (468 face points + 2 x 5 iris points).
//! A frame with no landmarks means the detector found no face.

use serde::{Deserialize, Serialize};

/// Monotonic milliseconds since session start.
pub type TimestampMs = u64;

/// A single normalized landmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Planar distance (z ignored).
    pub fn distance_to(&self, other: &Landmark) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn midpoint(a: &Landmark, b: &Landmark) -> Landmark {
        Landmark {
            x: (a.x + b.x) * 0.5,
            y: (a.y + b.y) * 0.5,
            z: (a.z + b.z) * 0.5,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One sampled detector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Detector frame counter.
    #[serde(rename = "id")]
    pub frame_id: u64,

    /// Capture timestamp (session-monotonic ms).
    #[serde(rename = "t")]
    pub timestamp_ms: TimestampMs,

    /// Detection confidence in `[0.0, 1.0]`.
    pub confidence: f64,

    /// Ordered landmark coordinates; empty when no face was found.
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
}

impl LandmarkFrame {
    pub fn new(
        frame_id: u64,
        timestamp_ms: TimestampMs,
        confidence: f64,
        landmarks: Vec<Landmark>,
    ) -> Self {
        Self {
            frame_id,
            timestamp_ms,
            confidence,
            landmarks,
        }
    }

    /// A frame reporting that no face was detected.
    pub fn no_face(frame_id: u64, timestamp_ms: TimestampMs) -> Self {
        Self::new(frame_id, timestamp_ms, 0.0, Vec::new())
    }

    /// Whether the detector reported a face.
    pub fn has_face(&self) -> bool {
        !self.landmarks.is_empty()
    }

    /// Landmark by face-mesh index.
    pub fn point(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }

    /// Check structural validity: a face frame must carry the full mesh
    /// with finite coordinates and a confidence in `[0, 1]`.
    pub fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "frame {} has confidence {} outside [0, 1]",
                self.frame_id, self.confidence
            ));
        }
        if !self.has_face() {
            return Ok(());
        }
        if self.landmarks.len() < face_mesh::LANDMARK_COUNT {
            return Err(format!(
                "frame {} has {} landmarks, expected {}",
                self.frame_id,
                self.landmarks.len(),
                face_mesh::LANDMARK_COUNT
            ));
        }
        if let Some(idx) = self.landmarks.iter().position(|l| !l.is_finite()) {
            return Err(format!(
                "frame {} landmark {idx} is not finite",
                self.frame_id
            ));
        }
        Ok(())
    }
}

/// Face-mesh landmark indices used by the pipeline.
pub mod face_mesh {
    /// Landmarks in a refined mesh (face + iris).
    pub const LANDMARK_COUNT: usize = 478;

    /// EAR points for the left eye: outer corner, two upper lid, inner
    /// corner, two lower lid (p1..p6).
    pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
    /// EAR points for the right eye, same ordering as [`LEFT_EYE`].
    pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

    pub const LEFT_IRIS_CENTER: usize = 468;
    pub const RIGHT_IRIS_CENTER: usize = 473;

    pub const LEFT_EYE_OUTER: usize = 33;
    pub const LEFT_EYE_INNER: usize = 133;
    pub const RIGHT_EYE_INNER: usize = 362;
    pub const RIGHT_EYE_OUTER: usize = 263;

    pub const LEFT_BROW: usize = 105;
    pub const RIGHT_BROW: usize = 334;

    pub const MOUTH_LEFT: usize = 61;
    pub const MOUTH_RIGHT: usize = 291;
    pub const UPPER_LIP: usize = 13;
    pub const LOWER_LIP: usize = 14;
}

/// Parse frames from JSONL content (one JSON object per line).
/// Blank lines and `#` comment lines are skipped.
pub fn parse_frames(jsonl: &str) -> Result<Vec<LandmarkFrame>, serde_json::Error> {
    jsonl
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(serde_json::from_str)
        .collect()
}

/// Serialize frames to JSONL format.
pub fn serialize_frames(frames: &[LandmarkFrame]) -> Result<String, serde_json::Error> {
    let mut output = String::new();
    for frame in frames {
        output.push_str(&serde_json::to_string(frame)?);
        output.push('\n');
    }
    Ok(output)
}
