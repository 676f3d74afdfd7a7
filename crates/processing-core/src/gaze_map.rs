//! Gaze estimation and gaze-to-screen mapping.
//!
//! [`estimate_gaze`] turns a landmark frame into a normalized gaze vector;
//! [`GazeMapper`] applies the active calibration profile to it.

use gazectl_common::{EyeDominance, GazeError, GazeResult};
use gazectl_frame_model::{
    face_mesh, CalibrationProfile, GazeVector, Landmark, LandmarkFrame, Point2D, ScreenSize,
    TimestampMs,
};

/// A mapped gaze position in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeSample {
    pub position: Point2D,
    pub timestamp_ms: TimestampMs,
}

impl GazeSample {
    pub fn new(position: Point2D, timestamp_ms: TimestampMs) -> Self {
        Self {
            position,
            timestamp_ms,
        }
    }
}

/// Iris offset from the eye-corner midpoint, in half-eye-widths.
fn eye_gaze(
    frame: &LandmarkFrame,
    corner_a: usize,
    corner_b: usize,
    iris: usize,
) -> Option<GazeVector> {
    let a = frame.point(corner_a)?;
    let b = frame.point(corner_b)?;
    let iris = frame.point(iris)?;
    let half_width = a.distance_to(b) / 2.0;
    if half_width <= f64::EPSILON {
        return None;
    }
    let centre = Landmark::midpoint(a, b);
    let gaze = GazeVector::new(
        (iris.x - centre.x) / half_width,
        (iris.y - centre.y) / half_width,
    );
    gaze.is_finite().then_some(gaze)
}

/// Estimate the normalized gaze vector of a frame.
///
/// Returns `None` when the frame has no face or the eye geometry is
/// degenerate.
pub fn estimate_gaze(frame: &LandmarkFrame, dominance: EyeDominance) -> Option<GazeVector> {
    if !frame.has_face() {
        return None;
    }
    let left = || {
        eye_gaze(
            frame,
            face_mesh::LEFT_EYE_OUTER,
            face_mesh::LEFT_EYE_INNER,
            face_mesh::LEFT_IRIS_CENTER,
        )
    };
    let right = || {
        eye_gaze(
            frame,
            face_mesh::RIGHT_EYE_INNER,
            face_mesh::RIGHT_EYE_OUTER,
            face_mesh::RIGHT_IRIS_CENTER,
        )
    };

    match dominance {
        EyeDominance::Left => left(),
        EyeDominance::Right => right(),
        EyeDominance::Both => match (left(), right()) {
            (Some(l), Some(r)) => Some(GazeVector::midpoint(&l, &r)),
            (l, r) => l.or(r),
        },
    }
}

/// Applies the active calibration to live gaze vectors.
#[derive(Debug, Clone)]
pub struct GazeMapper {
    screen: ScreenSize,
    profile: Option<CalibrationProfile>,
}

impl GazeMapper {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            screen,
            profile: None,
        }
    }

    /// Replace the active profile. The profile must be valid and fitted for
    /// this mapper's screen.
    pub fn install(&mut self, profile: CalibrationProfile) -> GazeResult<()> {
        profile.validate().map_err(GazeError::input)?;
        if profile.screen != self.screen {
            return Err(GazeError::input(format!(
                "profile was fitted for {}x{}, screen is {}x{}",
                profile.screen.width, profile.screen.height, self.screen.width, self.screen.height
            )));
        }
        tracing::info!(
            model = ?profile.model,
            anchors = profile.anchors.len(),
            residual_px = profile.residual_px,
            "Calibration profile installed"
        );
        self.profile = Some(profile);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.profile = None;
    }

    pub fn profile(&self) -> Option<&CalibrationProfile> {
        self.profile.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.profile.is_some()
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    /// Map a gaze vector to a screen position clamped to the screen.
    pub fn map(&self, gaze: &GazeVector, timestamp_ms: TimestampMs) -> GazeResult<GazeSample> {
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| GazeError::input("no calibration profile is active"))?;
        if !gaze.is_finite() {
            return Err(GazeError::input("gaze vector is not finite"));
        }
        let position = self.screen.clamp(profile.apply(gaze));
        Ok(GazeSample::new(position, timestamp_ms))
    }
}
