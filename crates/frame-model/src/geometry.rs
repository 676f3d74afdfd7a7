//! Screen and gaze-space geometry.
//!
//! Screen points are in physical pixels with `(0, 0)` at the top-left.
//! Gaze vectors are normalized to roughly `[-1.0, 1.0]` per axis, where
//! `(0, 0)` means the iris sits centred between the eye corners.

use serde::{Deserialize, Serialize};

/// A point in screen space (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Linear interpolation between two points.
    pub fn lerp(a: &Point2D, b: &Point2D, t: f64) -> Point2D {
        let t = t.clamp(0.0, 1.0);
        Point2D {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Normalized gaze direction derived from iris position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeVector {
    pub x: f64,
    pub y: f64,
}

impl GazeVector {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Component-wise mean of two vectors.
    pub fn midpoint(a: &GazeVector, b: &GazeVector) -> GazeVector {
        GazeVector {
            x: (a.x + b.x) * 0.5,
            y: (a.y + b.y) * 0.5,
        }
    }
}

/// Target screen dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Screen centre.
    pub fn center(&self) -> Point2D {
        Point2D::new(self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    /// Half of the screen diagonal, used to normalize distance from centre.
    pub fn half_diagonal(&self) -> f64 {
        ((self.width as f64).powi(2) + (self.height as f64).powi(2)).sqrt() / 2.0
    }

    /// Largest representable pixel coordinate on each axis.
    ///
    /// Points are clamped to `[0, width - 1] x [0, height - 1]`, which keeps
    /// them strictly inside the half-open screen rectangle.
    pub fn max_point(&self) -> Point2D {
        Point2D::new(
            (self.width.max(1) - 1) as f64,
            (self.height.max(1) - 1) as f64,
        )
    }

    /// Clamp a point into the screen. Non-finite coordinates collapse to 0.
    pub fn clamp(&self, p: Point2D) -> Point2D {
        let max = self.max_point();
        let x = if p.x.is_finite() { p.x } else { 0.0 };
        let y = if p.y.is_finite() { p.y } else { 0.0 };
        Point2D::new(x.clamp(0.0, max.x), y.clamp(0.0, max.y))
    }

    /// Whether the point lies in `[0, width) x [0, height)`.
    pub fn contains(&self, p: &Point2D) -> bool {
        p.x >= 0.0 && p.x < self.width as f64 && p.y >= 0.0 && p.y < self.height as f64
    }
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}
