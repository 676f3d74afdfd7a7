//! Cursor motion smoothing.
//!
//! Turns jittery mapped gaze samples into stable cursor positions. Four
//! stages run in order on every sample:
//!
//! 1. **EMA** low-pass filter
//! 2. **Kalman** constant-velocity filter (optional)
//! 3. **Dead zone** that holds the cursor for small movements
//! 4. **Acceleration** that amplifies displacement toward the screen edges
//!
//! The smoother is deterministic: the same sample sequence always yields
//! the same output sequence.

use gazectl_common::GazeConfig;
use gazectl_frame_model::{Point2D, ScreenSize, TimestampMs};
use nalgebra::{Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4};

use crate::gaze_map::GazeSample;

/// Exponential moving average over screen positions.
#[derive(Debug, Clone)]
pub struct EmaFilter {
    alpha: f64,
    value: Option<Point2D>,
}

impl EmaFilter {
    /// `alpha` is the weight of the newest sample, in (0, 1].
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    /// `f = alpha * raw + (1 - alpha) * f_prev`. The first sample passes
    /// through unchanged.
    pub fn update(&mut self, raw: Point2D) -> Point2D {
        let next = match self.value {
            None => raw,
            Some(prev) => Point2D::new(
                self.alpha * raw.x + (1.0 - self.alpha) * prev.x,
                self.alpha * raw.y + (1.0 - self.alpha) * prev.y,
            ),
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<Point2D> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Constant-velocity Kalman filter over `(x, y, vx, vy)`.
///
/// Time is measured in milliseconds, so velocities are px/ms.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    process_noise: f64,
    measurement_noise: f64,
    state: Vector4<f64>,
    covariance: Matrix4<f64>,
    last_timestamp_ms: Option<TimestampMs>,
}

impl KalmanFilter {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            process_noise,
            measurement_noise,
            state: Vector4::zeros(),
            covariance: Matrix4::identity(),
            last_timestamp_ms: None,
        }
    }

    #[rustfmt::skip]
    fn observation() -> Matrix2x4<f64> {
        Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        )
    }

    /// Predict to `timestamp_ms` and correct with the measured position.
    pub fn update(&mut self, measured: Point2D, timestamp_ms: TimestampMs) -> Point2D {
        let Some(last) = self.last_timestamp_ms else {
            self.state = Vector4::new(measured.x, measured.y, 0.0, 0.0);
            self.covariance = Matrix4::from_diagonal(&Vector4::new(
                self.measurement_noise,
                self.measurement_noise,
                self.process_noise,
                self.process_noise,
            ));
            self.last_timestamp_ms = Some(timestamp_ms);
            return measured;
        };

        let dt = timestamp_ms.saturating_sub(last) as f64;
        self.last_timestamp_ms = Some(timestamp_ms.max(last));

        #[rustfmt::skip]
        let transition = Matrix4::new(
            1.0, 0.0, dt,  0.0,
            0.0, 1.0, 0.0, dt,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        let q = Matrix4::identity() * self.process_noise;
        let r = nalgebra::Matrix2::identity() * self.measurement_noise;
        let h = Self::observation();

        // Predict
        let predicted = transition * self.state;
        let p = transition * self.covariance * transition.transpose() + q;

        // Correct
        let innovation = Vector2::new(measured.x, measured.y) - h * predicted;
        let s = h * p * h.transpose() + r;
        let Some(s_inv) = s.try_inverse() else {
            // Singular innovation covariance; keep the prediction.
            self.state = predicted;
            self.covariance = p;
            return Point2D::new(predicted[0], predicted[1]);
        };
        let gain: Matrix4x2<f64> = p * h.transpose() * s_inv;

        self.state = predicted + gain * innovation;
        self.covariance = (Matrix4::identity() - gain * h) * p;

        Point2D::new(self.state[0], self.state[1])
    }

    /// Current velocity estimate (px/ms).
    pub fn velocity(&self) -> Velocity {
        Velocity::new(self.state[2], self.state[3])
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.process_noise, self.measurement_noise);
    }
}

/// Peripheral acceleration: displacement from the screen centre is scaled
/// by `1 + multiplier * (d / half_diagonal)^exponent`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerationCurve {
    pub exponent: f64,
    pub multiplier: f64,
}

impl AccelerationCurve {
    pub fn new(exponent: f64, multiplier: f64) -> Self {
        Self {
            exponent,
            multiplier,
        }
    }

    /// A curve that leaves positions untouched.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0)
    }

    /// Gain applied at distance `d` from the centre.
    pub fn gain(&self, distance: f64, half_diagonal: f64) -> f64 {
        if half_diagonal <= 0.0 || self.multiplier == 0.0 {
            return 1.0;
        }
        1.0 + self.multiplier * (distance / half_diagonal).powf(self.exponent)
    }

    /// Accelerate and clamp a position to the screen.
    pub fn apply(&self, p: Point2D, screen: &ScreenSize) -> Point2D {
        let centre = screen.center();
        let dx = p.x - centre.x;
        let dy = p.y - centre.y;
        let gain = self.gain(dx.hypot(dy), screen.half_diagonal());
        screen.clamp(Point2D::new(centre.x + dx * gain, centre.y + dy * gain))
    }
}

/// Velocity in px/ms.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

impl Velocity {
    pub fn new(vx: f64, vy: f64) -> Self {
        Self { vx, vy }
    }

    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }
}

/// Output of the smoother for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorState {
    /// Final on-screen cursor position.
    pub position: Point2D,

    pub velocity: Velocity,

    /// Filtered position the dead zone is anchored to (pre-acceleration).
    pub last_stable: Point2D,

    /// Whether the dead zone held the cursor on this sample.
    pub held: bool,

    pub timestamp_ms: TimestampMs,
}

/// Smoother parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SmootherParams {
    pub smoothing_factor: f64,
    pub use_kalman: bool,
    pub kalman_process_noise: f64,
    pub kalman_measurement_noise: f64,
    pub dead_zone_radius: f64,
    pub acceleration: AccelerationCurve,
}

impl SmootherParams {
    pub fn from_config(config: &GazeConfig) -> Self {
        Self {
            smoothing_factor: config.smoothing_factor,
            use_kalman: config.use_kalman,
            kalman_process_noise: config.kalman_process_noise,
            kalman_measurement_noise: config.kalman_measurement_noise,
            dead_zone_radius: config.dead_zone_radius,
            acceleration: AccelerationCurve::new(
                config.acceleration_curve,
                config.acceleration_multiplier,
            ),
        }
    }
}

impl Default for SmootherParams {
    fn default() -> Self {
        Self::from_config(&GazeConfig::default())
    }
}

/// Multi-stage cursor smoother.
#[derive(Debug, Clone)]
pub struct CursorSmoother {
    params: SmootherParams,
    screen: ScreenSize,
    ema: EmaFilter,
    kalman: Option<KalmanFilter>,
    state: Option<CursorState>,
}

impl CursorSmoother {
    pub fn new(params: SmootherParams, screen: ScreenSize) -> Self {
        let kalman = params.use_kalman.then(|| {
            KalmanFilter::new(params.kalman_process_noise, params.kalman_measurement_noise)
        });
        Self {
            ema: EmaFilter::new(params.smoothing_factor),
            kalman,
            params,
            screen,
            state: None,
        }
    }

    pub fn from_config(config: &GazeConfig, screen: ScreenSize) -> Self {
        Self::new(SmootherParams::from_config(config), screen)
    }

    /// Feed one mapped sample through all stages.
    pub fn update(&mut self, sample: GazeSample) -> CursorState {
        let filtered = self.ema.update(sample.position);
        let filtered = match self.kalman.as_mut() {
            Some(kalman) => kalman.update(filtered, sample.timestamp_ms),
            None => filtered,
        };

        let (last_stable, held) = match self.state {
            Some(prev)
                if filtered.distance_to(&prev.last_stable) < self.params.dead_zone_radius =>
            {
                (prev.last_stable, true)
            }
            _ => (filtered, false),
        };

        let position = self.params.acceleration.apply(last_stable, &self.screen);

        let velocity = match (&self.kalman, self.state) {
            (Some(kalman), _) => kalman.velocity(),
            (None, Some(prev)) if sample.timestamp_ms > prev.timestamp_ms => {
                let dt = (sample.timestamp_ms - prev.timestamp_ms) as f64;
                Velocity::new(
                    (position.x - prev.position.x) / dt,
                    (position.y - prev.position.y) / dt,
                )
            }
            _ => Velocity::default(),
        };

        let state = CursorState {
            position,
            velocity,
            last_stable,
            held,
            timestamp_ms: sample.timestamp_ms,
        };
        self.state = Some(state);
        state
    }

    /// Last produced state.
    pub fn state(&self) -> Option<CursorState> {
        self.state
    }

    /// Clear all stages. The next sample re-initializes the filters.
    pub fn reset(&mut self) {
        self.ema.reset();
        if let Some(kalman) = self.kalman.as_mut() {
            kalman.reset();
        }
        self.state = None;
    }

    pub fn params(&self) -> &SmootherParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plain(alpha: f64, dead_zone: f64) -> SmootherParams {
        SmootherParams {
            smoothing_factor: alpha,
            use_kalman: false,
            kalman_process_noise: 0.01,
            kalman_measurement_noise: 0.1,
            dead_zone_radius: dead_zone,
            acceleration: AccelerationCurve::identity(),
        }
    }

    fn sample(x: f64, y: f64, t: TimestampMs) -> GazeSample {
        GazeSample::new(Point2D::new(x, y), t)
    }

    #[test]
    fn test_first_sample_initializes() {
        let mut smoother = CursorSmoother::new(plain(0.3, 0.0), ScreenSize::default());
        let state = smoother.update(sample(100.0, 200.0, 0));
        assert_eq!(state.position, Point2D::new(100.0, 200.0));
        assert_eq!(state.velocity, Velocity::default());
    }

    #[test]
    fn test_ema_step() {
        let mut ema = EmaFilter::new(0.25);
        ema.update(Point2D::new(0.0, 0.0));
        let p = ema.update(Point2D::new(100.0, 40.0));
        assert!((p.x - 25.0).abs() < 1e-12);
        assert!((p.y - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_dead_zone_holds_small_jitter() {
        let mut smoother = CursorSmoother::new(plain(1.0, 15.0), ScreenSize::default());
        let first = smoother.update(sample(500.0, 500.0, 0));
        for (i, (dx, dy)) in [(5.0, 0.0), (-7.0, 3.0), (0.0, -14.9), (10.0, 10.0)]
            .into_iter()
            .enumerate()
        {
            let state = smoother.update(sample(500.0 + dx, 500.0 + dy, (i as u64 + 1) * 33));
            assert_eq!(state.position, first.position);
            assert!(state.held);
        }
    }

    #[test]
    fn test_dead_zone_boundary_moves() {
        let mut smoother = CursorSmoother::new(plain(1.0, 15.0), ScreenSize::default());
        smoother.update(sample(500.0, 500.0, 0));
        let state = smoother.update(sample(515.0, 500.0, 33));
        assert!(!state.held);
        assert_eq!(state.position, Point2D::new(515.0, 500.0));
        assert_eq!(state.last_stable, Point2D::new(515.0, 500.0));
    }

    #[test]
    fn test_finite_difference_velocity() {
        let mut smoother = CursorSmoother::new(plain(1.0, 0.0), ScreenSize::default());
        smoother.update(sample(100.0, 100.0, 0));
        let state = smoother.update(sample(110.0, 90.0, 10));
        assert!((state.velocity.vx - 1.0).abs() < 1e-12);
        assert!((state.velocity.vy + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_acceleration_identity_at_centre() {
        let screen = ScreenSize::new(1920, 1080);
        let curve = AccelerationCurve::new(1.5, 1.0);
        assert_eq!(curve.apply(screen.center(), &screen), screen.center());
    }

    #[test]
    fn test_acceleration_pushes_outward() {
        let screen = ScreenSize::new(1920, 1080);
        let curve = AccelerationCurve::new(1.5, 1.0);
        let p = curve.apply(Point2D::new(1160.0, 540.0), &screen);
        assert!(p.x > 1160.0);
        assert_eq!(p.y, 540.0);

        let edge = curve.apply(Point2D::new(1900.0, 1070.0), &screen);
        assert_eq!(edge, screen.max_point());
    }

    #[test]
    fn test_acceleration_exponent_shapes_gain() {
        let hd = 100.0;
        for exponent in [0.5, 1.0, 2.0, 3.0] {
            let curve = AccelerationCurve::new(exponent, 1.0);
            assert!((curve.gain(0.0, hd) - 1.0).abs() < 1e-12);
            assert!((curve.gain(hd, hd) - 2.0).abs() < 1e-12);
            let half = curve.gain(hd / 2.0, hd);
            assert!((half - (1.0 + 0.5f64.powf(exponent))).abs() < 1e-12);
        }
    }

    #[test]
    fn test_kalman_tracks_constant_velocity() {
        let mut kalman = KalmanFilter::new(0.01, 0.1);
        let mut last = Point2D::new(0.0, 0.0);
        for i in 0..200u64 {
            let t = i * 10;
            last = kalman.update(Point2D::new(t as f64 * 0.5, 300.0), t);
        }
        assert!((last.x - 995.0).abs() < 1.0, "x = {}", last.x);
        assert!((kalman.velocity().vx - 0.5).abs() < 0.01);
        assert!(kalman.velocity().vy.abs() < 0.01);
    }

    #[test]
    fn test_kalman_noise_parameters_trade_lag_for_smoothness() {
        let run = |q: f64, r: f64| {
            let mut kalman = KalmanFilter::new(q, r);
            kalman.update(Point2D::new(0.0, 0.0), 0);
            kalman.update(Point2D::new(100.0, 0.0), 33).x
        };
        let responsive = run(1.0, 0.01);
        let smooth = run(0.001, 10.0);
        assert!(responsive > smooth);
        assert!(responsive <= 100.0 + 1e-9);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut smoother = CursorSmoother::new(plain(0.2, 0.0), ScreenSize::default());
        smoother.update(sample(0.0, 0.0, 0));
        smoother.update(sample(1000.0, 1000.0, 33));
        smoother.reset();
        assert!(smoother.state().is_none());
        let state = smoother.update(sample(800.0, 600.0, 66));
        assert_eq!(state.position, Point2D::new(800.0, 600.0));
    }

    #[test]
    fn test_deterministic() {
        let params = SmootherParams::default();
        let inputs: Vec<GazeSample> = (0..50u64)
            .map(|i| sample((i * 37 % 1900) as f64, (i * 53 % 1000) as f64, i * 33))
            .collect();
        let run = || {
            let mut smoother = CursorSmoother::new(params.clone(), ScreenSize::default());
            inputs.iter().map(|s| smoother.update(*s)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    proptest! {
        #[test]
        fn prop_ema_converges_to_constant_input(
            alpha in 0.05f64..=1.0,
            start_x in 0.0f64..1919.0,
            target_x in 0.0f64..1919.0,
            n in 1usize..60,
        ) {
            let mut smoother = CursorSmoother::new(plain(alpha, 0.0), ScreenSize::default());
            smoother.update(sample(start_x, 540.0, 0));
            let mut state = None;
            for i in 0..n {
                state = Some(smoother.update(sample(target_x, 540.0, (i as u64 + 1) * 33)));
            }
            let x = state.unwrap().position.x;
            let bound = (1.0 - alpha).powi(n as i32) * (start_x - target_x).abs();
            prop_assert!((x - target_x).abs() <= bound + 1e-6);
        }

        #[test]
        fn prop_output_stays_on_screen(
            points in proptest::collection::vec((-5000.0f64..7000.0, -5000.0f64..7000.0), 1..40),
            exponent in 0.5f64..3.0,
            multiplier in 0.0f64..3.0,
            use_kalman in any::<bool>(),
        ) {
            let screen = ScreenSize::new(1920, 1080);
            let params = SmootherParams {
                use_kalman,
                acceleration: AccelerationCurve::new(exponent, multiplier),
                ..SmootherParams::default()
            };
            let mut smoother = CursorSmoother::new(params, screen);
            for (i, (x, y)) in points.into_iter().enumerate() {
                let state = smoother.update(sample(x, y, i as u64 * 33));
                prop_assert!(screen.contains(&state.position));
            }
        }

        #[test]
        fn prop_dead_zone_holds_inside_radius(
            radius in 1.0f64..50.0,
            offsets in proptest::collection::vec((0.0f64..1.0, 0.0f64..std::f64::consts::TAU), 1..20),
        ) {
            let mut smoother = CursorSmoother::new(plain(1.0, radius), ScreenSize::default());
            let anchor = smoother.update(sample(900.0, 500.0, 0));
            for (i, (frac, angle)) in offsets.into_iter().enumerate() {
                let d = frac * radius * 0.999;
                let state = smoother.update(sample(
                    900.0 + d * angle.cos(),
                    500.0 + d * angle.sin(),
                    (i as u64 + 1) * 33,
                ));
                prop_assert_eq!(state.position, anchor.position);
            }
        }
    }
}
