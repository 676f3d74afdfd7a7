//! Synthetic face-mesh generation for tests and demos.
//!
//! Produces geometrically consistent landmark frames with controllable eye
//! openness, smile, eyebrow height, jaw opening and gaze direction. Only the
//! landmarks the pipeline reads are placed; the rest sit at the image centre.

use crate::geometry::{GazeVector, Point2D, ScreenSize};
use crate::landmark::{face_mesh, Landmark, LandmarkFrame, TimestampMs};

/// Gaze range a synthetic user sweeps when scanning the whole screen.
const GAZE_SPAN_X: f64 = 1.6;
const GAZE_SPAN_Y: f64 = 1.2;

/// Lid half-height of a fully open eye (normalized image units).
const OPEN_LID: f64 = 0.012;
/// Half-width of each eye between its corners.
const EYE_HALF_WIDTH: f64 = 0.04;
const EYE_Y: f64 = 0.45;
const LEFT_EYE_X: f64 = 0.42;
const RIGHT_EYE_X: f64 = 0.58;
/// Outer-corner to outer-corner distance.
const INTER_OCULAR: f64 = 0.24;
const BROW_GAP: f64 = 0.05;
const MOUTH_Y: f64 = 0.65;
const MOUTH_HALF_WIDTH: f64 = 0.06;
const LIP_GAP: f64 = 0.004;

/// Builder for a synthetic face.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticFace {
    /// Left eye openness, 1.0 = neutral open, 0.0 = shut.
    pub left_open: f64,
    /// Right eye openness.
    pub right_open: f64,
    /// Smile amount; widens the mouth by this fraction and lifts the corners.
    pub smile: f64,
    /// Eyebrow raise in inter-ocular units (negative lowers).
    pub brow: f64,
    /// Extra mouth opening in inter-ocular units.
    pub jaw: f64,
    /// Iris offset within the eye, in half-eye-widths.
    pub gaze: GazeVector,
    /// Uniform scale about the image centre.
    pub scale: f64,
    /// Translation applied after scaling.
    pub offset: (f64, f64),
    pub confidence: f64,
}

impl Default for SyntheticFace {
    fn default() -> Self {
        Self {
            left_open: 1.0,
            right_open: 1.0,
            smile: 0.0,
            brow: 0.0,
            jaw: 0.0,
            gaze: GazeVector::new(0.0, 0.0),
            scale: 1.0,
            offset: (0.0, 0.0),
            confidence: 0.95,
        }
    }
}

impl SyntheticFace {
    /// A neutral, fully open face looking straight ahead.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn eyes(mut self, left_open: f64, right_open: f64) -> Self {
        self.left_open = left_open;
        self.right_open = right_open;
        self
    }

    pub fn smile(mut self, amount: f64) -> Self {
        self.smile = amount;
        self
    }

    pub fn brow(mut self, raise: f64) -> Self {
        self.brow = raise;
        self
    }

    pub fn jaw(mut self, open: f64) -> Self {
        self.jaw = open;
        self
    }

    pub fn gaze(mut self, x: f64, y: f64) -> Self {
        self.gaze = GazeVector::new(x, y);
        self
    }

    /// Point the irises at a screen position, using a fixed linear
    /// eye-to-screen relation.
    pub fn looking_at(self, target: Point2D, screen: ScreenSize) -> Self {
        self.gaze(
            (target.x / screen.width as f64 - 0.5) * GAZE_SPAN_X,
            (target.y / screen.height as f64 - 0.5) * GAZE_SPAN_Y,
        )
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn transform(mut self, scale: f64, dx: f64, dy: f64) -> Self {
        self.scale = scale;
        self.offset = (dx, dy);
        self
    }

    /// Build the landmark frame.
    pub fn frame(&self, frame_id: u64, timestamp_ms: TimestampMs) -> LandmarkFrame {
        let mut pts = vec![Landmark::new(0.5, 0.5); face_mesh::LANDMARK_COUNT];
        let mut set = |idx: usize, x: f64, y: f64| {
            pts[idx] = Landmark::new(
                0.5 + (x - 0.5) * self.scale + self.offset.0,
                0.5 + (y - 0.5) * self.scale + self.offset.1,
            );
        };

        let lh = OPEN_LID * self.left_open.max(0.0);
        let rh = OPEN_LID * self.right_open.max(0.0);

        // Left eye: p1 outer, p2/p3 upper, p4 inner, p5/p6 lower.
        let [l1, l2, l3, l4, l5, l6] = face_mesh::LEFT_EYE;
        set(l1, LEFT_EYE_X - EYE_HALF_WIDTH, EYE_Y);
        set(l2, LEFT_EYE_X - EYE_HALF_WIDTH / 2.0, EYE_Y - lh);
        set(l3, LEFT_EYE_X + EYE_HALF_WIDTH / 2.0, EYE_Y - lh);
        set(l4, LEFT_EYE_X + EYE_HALF_WIDTH, EYE_Y);
        set(l5, LEFT_EYE_X + EYE_HALF_WIDTH / 2.0, EYE_Y + lh);
        set(l6, LEFT_EYE_X - EYE_HALF_WIDTH / 2.0, EYE_Y + lh);

        // Right eye: p1 inner, p4 outer.
        let [r1, r2, r3, r4, r5, r6] = face_mesh::RIGHT_EYE;
        set(r1, RIGHT_EYE_X - EYE_HALF_WIDTH, EYE_Y);
        set(r2, RIGHT_EYE_X - EYE_HALF_WIDTH / 2.0, EYE_Y - rh);
        set(r3, RIGHT_EYE_X + EYE_HALF_WIDTH / 2.0, EYE_Y - rh);
        set(r4, RIGHT_EYE_X + EYE_HALF_WIDTH, EYE_Y);
        set(r5, RIGHT_EYE_X + EYE_HALF_WIDTH / 2.0, EYE_Y + rh);
        set(r6, RIGHT_EYE_X - EYE_HALF_WIDTH / 2.0, EYE_Y + rh);

        set(
            face_mesh::LEFT_IRIS_CENTER,
            LEFT_EYE_X + self.gaze.x * EYE_HALF_WIDTH,
            EYE_Y + self.gaze.y * EYE_HALF_WIDTH,
        );
        set(
            face_mesh::RIGHT_IRIS_CENTER,
            RIGHT_EYE_X + self.gaze.x * EYE_HALF_WIDTH,
            EYE_Y + self.gaze.y * EYE_HALF_WIDTH,
        );

        let brow_y = EYE_Y - BROW_GAP - self.brow * INTER_OCULAR;
        set(face_mesh::LEFT_BROW, LEFT_EYE_X, brow_y);
        set(face_mesh::RIGHT_BROW, RIGHT_EYE_X, brow_y);

        let half_width = MOUTH_HALF_WIDTH * (1.0 + self.smile);
        let corner_y = MOUTH_Y - self.smile * 0.02;
        set(face_mesh::MOUTH_LEFT, 0.5 - half_width, corner_y);
        set(face_mesh::MOUTH_RIGHT, 0.5 + half_width, corner_y);

        let gap = (LIP_GAP + self.jaw * INTER_OCULAR) / 2.0;
        set(face_mesh::UPPER_LIP, 0.5, MOUTH_Y - gap);
        set(face_mesh::LOWER_LIP, 0.5, MOUTH_Y + gap);

        LandmarkFrame::new(frame_id, timestamp_ms, self.confidence, pts)
    }
}
