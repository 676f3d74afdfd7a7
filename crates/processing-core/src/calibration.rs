//! Calibration: anchor collection, regression fitting, and the dwell wizard.
//!
//! The engine collects one [`AnchorRecord`] per on-screen target and fits a
//! least-squares gaze → screen transform per axis. A successful fit yields a
//! fresh [`CalibrationProfile`]; the engine never touches the profile that
//! is currently installed in the mapper.

use gazectl_common::{now_rfc3339, CalibrationConfig, CalibrationError};
use gazectl_frame_model::{
    AnchorRecord, CalibrationProfile, GazeVector, Point2D, RegressionModel, ScreenSize,
    TimestampMs, PROFILE_VERSION,
};
use nalgebra::{DMatrix, DVector};

/// Fraction of each screen dimension left as margin around the targets.
const TARGET_MARGIN: f64 = 0.1;

/// Relative singular-value cutoff below which the design matrix is treated
/// as rank deficient.
const RANK_TOLERANCE: f64 = 1e-9;

/// Component-wise median of a non-empty slice.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Population variance of x plus population variance of y.
fn total_variance(samples: &[GazeVector]) -> f64 {
    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|s| s.x).sum::<f64>() / n;
    let mean_y = samples.iter().map(|s| s.y).sum::<f64>() / n;
    samples
        .iter()
        .map(|s| (s.x - mean_x).powi(2) + (s.y - mean_y).powi(2))
        .sum::<f64>()
        / n
}

/// Reduce dwell-window samples to an anchor record.
pub fn reduce_anchor(target: Point2D, samples: &[GazeVector]) -> Option<AnchorRecord> {
    let finite: Vec<GazeVector> = samples.iter().copied().filter(|s| s.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let mut xs: Vec<f64> = finite.iter().map(|s| s.x).collect();
    let mut ys: Vec<f64> = finite.iter().map(|s| s.y).collect();
    Some(AnchorRecord {
        target,
        raw: GazeVector::new(median(&mut xs), median(&mut ys)),
        variance: total_variance(&finite),
        samples: finite.len(),
    })
}

/// On-screen calibration targets for the given layout.
///
/// `5` places the four margin corners plus the centre, `16` a 4×4 grid and
/// anything else a 3×3 grid. Targets are ordered row-major.
pub fn calibration_targets(points: usize, screen: ScreenSize) -> Vec<Point2D> {
    let w = screen.width as f64;
    let h = screen.height as f64;
    let (x0, x1) = (w * TARGET_MARGIN, w * (1.0 - TARGET_MARGIN));
    let (y0, y1) = (h * TARGET_MARGIN, h * (1.0 - TARGET_MARGIN));

    let grid = |n: usize| -> Vec<Point2D> {
        let step = |lo: f64, hi: f64, i: usize| lo + (hi - lo) * i as f64 / (n - 1) as f64;
        (0..n)
            .flat_map(|row| (0..n).map(move |col| (row, col)))
            .map(|(row, col)| Point2D::new(step(x0, x1, col), step(y0, y1, row)))
            .collect()
    };

    match points {
        5 => vec![
            Point2D::new(x0, y0),
            Point2D::new(x1, y0),
            screen.center(),
            Point2D::new(x0, y1),
            Point2D::new(x1, y1),
        ],
        16 => grid(4),
        _ => grid(3),
    }
}

/// Fits a calibration profile from anchor samples.
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    screen: ScreenSize,
    model: RegressionModel,
    min_anchors: usize,
    max_sample_variance: f64,
    max_residual_px: f64,
    anchors: Vec<AnchorRecord>,
}

impl CalibrationEngine {
    pub fn new(config: &CalibrationConfig, screen: ScreenSize) -> Self {
        Self {
            screen,
            model: config.model,
            min_anchors: config.min_anchors,
            max_sample_variance: config.max_sample_variance,
            max_residual_px: config.max_residual_px,
            anchors: Vec::new(),
        }
    }

    /// Reduce the samples for one target and record the anchor.
    pub fn add_anchor(
        &mut self,
        target: Point2D,
        samples: &[GazeVector],
    ) -> Result<&AnchorRecord, CalibrationError> {
        let index = self.anchors.len();
        let record = reduce_anchor(target, samples)
            .ok_or(CalibrationError::NoSamples { anchor: index })?;
        tracing::debug!(
            anchor = index,
            target_x = target.x,
            target_y = target.y,
            samples = record.samples,
            variance = record.variance,
            "Calibration anchor recorded"
        );
        self.anchors.push(record);
        Ok(&self.anchors[index])
    }

    pub fn anchors(&self) -> &[AnchorRecord] {
        &self.anchors
    }

    pub fn clear(&mut self) {
        self.anchors.clear();
    }

    /// Validate the anchors and fit the regression.
    pub fn finalize(&self) -> Result<CalibrationProfile, CalibrationError> {
        if self.anchors.len() < self.min_anchors {
            return Err(CalibrationError::InsufficientAnchors {
                found: self.anchors.len(),
                required: self.min_anchors,
            });
        }

        if let Some((anchor, record)) = self
            .anchors
            .iter()
            .enumerate()
            .find(|(_, a)| a.variance > self.max_sample_variance)
        {
            return Err(CalibrationError::UnstableFixation {
                anchor,
                variance: record.variance,
                limit: self.max_sample_variance,
            });
        }

        let (coefficients_x, coefficients_y) = fit(self.model, &self.anchors)?;
        let residual_px = rms_residual(self.model, &self.anchors, &coefficients_x, &coefficients_y);

        if !residual_px.is_finite() || residual_px > self.max_residual_px {
            return Err(CalibrationError::ResidualTooHigh {
                residual_px,
                limit_px: self.max_residual_px,
            });
        }

        tracing::info!(
            anchors = self.anchors.len(),
            model = ?self.model,
            residual_px,
            "Calibration fit accepted"
        );

        Ok(CalibrationProfile {
            version: PROFILE_VERSION.to_string(),
            screen: self.screen,
            model: self.model,
            anchors: self.anchors.clone(),
            coefficients_x,
            coefficients_y,
            residual_px,
            created_at: now_rfc3339(),
        })
    }
}

/// Least-squares fit of both screen axes via SVD.
fn fit(
    model: RegressionModel,
    anchors: &[AnchorRecord],
) -> Result<(Vec<f64>, Vec<f64>), CalibrationError> {
    let terms = model.terms();
    if anchors.len() < terms {
        return Err(CalibrationError::Degenerate {
            message: format!(
                "{:?} model needs at least {terms} anchors, have {}",
                model,
                anchors.len()
            ),
        });
    }

    let rows: Vec<f64> = anchors.iter().flat_map(|a| model.basis(&a.raw)).collect();
    let design = DMatrix::from_row_slice(anchors.len(), terms, &rows);
    let bx = DVector::from_iterator(anchors.len(), anchors.iter().map(|a| a.target.x));
    let by = DVector::from_iterator(anchors.len(), anchors.iter().map(|a| a.target.y));

    let svd = design.svd(true, true);
    let largest = svd.singular_values.max();
    let tolerance = RANK_TOLERANCE * largest.max(f64::MIN_POSITIVE);
    let rank = svd.rank(tolerance);
    if rank < terms {
        return Err(CalibrationError::Degenerate {
            message: format!("design matrix has rank {rank}, need {terms}"),
        });
    }

    let solve = |b: &DVector<f64>| -> Result<Vec<f64>, CalibrationError> {
        svd.solve(b, tolerance)
            .map(|c| c.iter().copied().collect())
            .map_err(|e| CalibrationError::Degenerate {
                message: e.to_string(),
            })
    };
    Ok((solve(&bx)?, solve(&by)?))
}

fn rms_residual(model: RegressionModel, anchors: &[AnchorRecord], cx: &[f64], cy: &[f64]) -> f64 {
    let dot = |c: &[f64], basis: &[f64]| -> f64 { c.iter().zip(basis).map(|(a, b)| a * b).sum() };
    let sum_sq: f64 = anchors
        .iter()
        .map(|a| {
            let basis = model.basis(&a.raw);
            let dx = dot(cx, &basis) - a.target.x;
            let dy = dot(cy, &basis) - a.target.y;
            dx * dx + dy * dy
        })
        .sum();
    (sum_sq / anchors.len() as f64).sqrt()
}

/// Progress report from the wizard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WizardStatus {
    /// Waiting for the user to settle on the target.
    Settling { index: usize, target: Point2D },
    /// Collecting samples; `progress` runs from 0 to 1 over the dwell window.
    Collecting {
        index: usize,
        target: Point2D,
        progress: f64,
    },
    /// All targets done; call [`CalibrationWizard::finish`].
    ReadyToFit,
}

/// Drives the user through the targets using frame timestamps.
///
/// For each target the first `settle_ms` are ignored, then samples are
/// collected for `dwell_ms` and reduced into an anchor.
#[derive(Debug, Clone)]
pub struct CalibrationWizard {
    engine: CalibrationEngine,
    targets: Vec<Point2D>,
    settle_ms: u64,
    dwell_ms: u64,
    current: usize,
    target_started_ms: Option<TimestampMs>,
    samples: Vec<GazeVector>,
}

impl CalibrationWizard {
    pub fn new(config: &CalibrationConfig, screen: ScreenSize) -> Self {
        Self::with_targets(config, screen, calibration_targets(config.points, screen))
    }

    pub fn with_targets(
        config: &CalibrationConfig,
        screen: ScreenSize,
        targets: Vec<Point2D>,
    ) -> Self {
        Self {
            engine: CalibrationEngine::new(config, screen),
            targets,
            settle_ms: config.settle_ms,
            dwell_ms: config.dwell_ms,
            current: 0,
            target_started_ms: None,
            samples: Vec::new(),
        }
    }

    pub fn targets(&self) -> &[Point2D] {
        &self.targets
    }

    /// The target the user should be looking at, if any remain.
    pub fn current_target(&self) -> Option<Point2D> {
        self.targets.get(self.current).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.targets.len()
    }

    pub fn anchors(&self) -> &[AnchorRecord] {
        self.engine.anchors()
    }

    /// Feed one frame's gaze estimate (or `None` when no face was seen).
    pub fn observe(
        &mut self,
        gaze: Option<GazeVector>,
        timestamp_ms: TimestampMs,
    ) -> Result<WizardStatus, CalibrationError> {
        let Some(target) = self.current_target() else {
            return Ok(WizardStatus::ReadyToFit);
        };
        let started = *self.target_started_ms.get_or_insert(timestamp_ms);
        let elapsed = timestamp_ms.saturating_sub(started);

        if elapsed < self.settle_ms {
            return Ok(WizardStatus::Settling {
                index: self.current,
                target,
            });
        }

        let collect_end = self.settle_ms + self.dwell_ms;
        if elapsed < collect_end {
            if let Some(gaze) = gaze.filter(GazeVector::is_finite) {
                self.samples.push(gaze);
            }
            return Ok(WizardStatus::Collecting {
                index: self.current,
                target,
                progress: (elapsed - self.settle_ms) as f64 / self.dwell_ms as f64,
            });
        }

        let samples = std::mem::take(&mut self.samples);
        self.engine.add_anchor(target, &samples)?;
        self.current += 1;
        self.target_started_ms = Some(timestamp_ms);

        match self.current_target() {
            Some(next) => Ok(WizardStatus::Settling {
                index: self.current,
                target: next,
            }),
            None => Ok(WizardStatus::ReadyToFit),
        }
    }

    /// Fit the profile from the collected anchors.
    pub fn finish(&self) -> Result<CalibrationProfile, CalibrationError> {
        self.engine.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: RegressionModel) -> CalibrationConfig {
        CalibrationConfig {
            model,
            ..CalibrationConfig::default()
        }
    }

    /// Screen position → gaze vector for a synthetic user whose gaze maps
    /// affinely onto the screen.
    fn affine_gaze(p: Point2D, screen: ScreenSize) -> GazeVector {
        GazeVector::new(
            (p.x - screen.width as f64 / 2.0) / 1200.0,
            (p.y - screen.height as f64 / 2.0) / 900.0,
        )
    }

    fn jittered(g: GazeVector, n: usize) -> Vec<GazeVector> {
        (0..n)
            .map(|i| {
                let j = ((i % 5) as f64 - 2.0) * 0.001;
                GazeVector::new(g.x + j, g.y - j)
            })
            .collect()
    }

    #[test]
    fn test_median_reduction_ignores_outlier() {
        let mut samples = jittered(GazeVector::new(0.2, -0.1), 9);
        samples.push(GazeVector::new(5.0, 5.0));
        let record = reduce_anchor(Point2D::new(0.0, 0.0), &samples).unwrap();
        assert!((record.raw.x - 0.2).abs() < 0.002);
        assert!((record.raw.y + 0.1).abs() < 0.002);
        assert_eq!(record.samples, 10);
        assert!(record.variance > 1.0);
    }

    #[test]
    fn test_empty_samples_rejected() {
        let mut engine = CalibrationEngine::new(&CalibrationConfig::default(), ScreenSize::default());
        let err = engine.add_anchor(Point2D::new(10.0, 10.0), &[]).unwrap_err();
        assert_eq!(err, CalibrationError::NoSamples { anchor: 0 });
        assert!(engine.anchors().is_empty());
    }

    #[test]
    fn test_target_layouts() {
        let screen = ScreenSize::new(1000, 500);
        let nine = calibration_targets(9, screen);
        assert_eq!(nine.len(), 9);
        assert_eq!(nine[0], Point2D::new(100.0, 50.0));
        assert_eq!(nine[4], Point2D::new(500.0, 250.0));
        assert_eq!(nine[8], Point2D::new(900.0, 450.0));
        assert_eq!(calibration_targets(16, screen).len(), 16);
        let five = calibration_targets(5, screen);
        assert_eq!(five.len(), 5);
        assert_eq!(five[2], screen.center());
        assert!(five.iter().all(|p| screen.contains(p)));
    }

    #[test]
    fn test_nine_anchor_affine_fit() {
        let screen = ScreenSize::new(1920, 1080);
        let mut engine = CalibrationEngine::new(&config(RegressionModel::Affine), screen);
        for target in calibration_targets(9, screen) {
            let samples = jittered(affine_gaze(target, screen), 20);
            engine.add_anchor(target, &samples).unwrap();
        }

        let profile = engine.finalize().unwrap();
        assert_eq!(profile.anchors.len(), 9);
        assert_eq!(profile.coefficients_x.len(), 3);
        assert!(profile.residual_px < 1.0, "residual {}", profile.residual_px);
        assert!(profile.validate().is_ok());

        let p = profile.apply(&affine_gaze(Point2D::new(700.0, 300.0), screen));
        assert!((p.x - 700.0).abs() < 1.0);
        assert!((p.y - 300.0).abs() < 1.0);
    }

    #[test]
    fn test_eight_anchors_rejected() {
        let screen = ScreenSize::new(1920, 1080);
        let mut engine = CalibrationEngine::new(&config(RegressionModel::Affine), screen);
        for target in calibration_targets(9, screen).into_iter().take(8) {
            engine
                .add_anchor(target, &jittered(affine_gaze(target, screen), 10))
                .unwrap();
        }
        assert_eq!(
            engine.finalize().unwrap_err(),
            CalibrationError::InsufficientAnchors {
                found: 8,
                required: 9
            }
        );
    }

    #[test]
    fn test_quadratic_fit_recovers_curvature() {
        let screen = ScreenSize::new(1920, 1080);
        let mut engine = CalibrationEngine::new(&config(RegressionModel::Quadratic), screen);
        // Gaze saturates toward the edges: screen = a*g + b*g^2 per axis.
        for target in calibration_targets(16, screen) {
            let lin = affine_gaze(target, screen);
            let g = GazeVector::new(lin.x - 0.1 * lin.x * lin.x, lin.y + 0.05 * lin.x * lin.y);
            engine.add_anchor(target, &[g]).unwrap();
        }
        let profile = engine.finalize().unwrap();
        assert_eq!(profile.model, RegressionModel::Quadratic);
        assert!(profile.residual_px < 20.0, "residual {}", profile.residual_px);
    }

    #[test]
    fn test_collinear_anchors_are_degenerate() {
        let screen = ScreenSize::new(1920, 1080);
        let mut engine = CalibrationEngine::new(&config(RegressionModel::Affine), screen);
        for i in 0..9 {
            let g = GazeVector::new(i as f64 * 0.1 - 0.4, 0.0);
            engine
                .add_anchor(Point2D::new(200.0 * i as f64, 540.0), &[g])
                .unwrap();
        }
        assert!(matches!(
            engine.finalize(),
            Err(CalibrationError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_unstable_fixation_rejected() {
        let screen = ScreenSize::new(1920, 1080);
        let mut engine = CalibrationEngine::new(&config(RegressionModel::Affine), screen);
        for (i, target) in calibration_targets(9, screen).into_iter().enumerate() {
            let g = affine_gaze(target, screen);
            let samples = if i == 4 {
                vec![GazeVector::new(g.x - 0.3, g.y), GazeVector::new(g.x + 0.3, g.y)]
            } else {
                jittered(g, 10)
            };
            engine.add_anchor(target, &samples).unwrap();
        }
        match engine.finalize() {
            Err(CalibrationError::UnstableFixation { anchor, .. }) => assert_eq!(anchor, 4),
            other => panic!("expected unstable fixation, got {other:?}"),
        }
    }

    #[test]
    fn test_residual_limit() {
        let screen = ScreenSize::new(1920, 1080);
        let cfg = CalibrationConfig {
            max_residual_px: 5.0,
            ..config(RegressionModel::Affine)
        };
        let mut engine = CalibrationEngine::new(&cfg, screen);
        for (i, target) in calibration_targets(9, screen).into_iter().enumerate() {
            let mut g = affine_gaze(target, screen);
            // Non-affine distortion the affine basis cannot absorb.
            if i % 2 == 0 {
                g.x += 0.05;
            }
            engine.add_anchor(target, &[g]).unwrap();
        }
        assert!(matches!(
            engine.finalize(),
            Err(CalibrationError::ResidualTooHigh { limit_px, .. }) if limit_px == 5.0
        ));
    }

    #[test]
    fn test_wizard_walks_all_targets() {
        let screen = ScreenSize::new(1920, 1080);
        let cfg = CalibrationConfig {
            settle_ms: 100,
            dwell_ms: 300,
            ..CalibrationConfig::default()
        };
        let mut wizard = CalibrationWizard::new(&cfg, screen);
        let mut t = 0;
        let mut status = WizardStatus::ReadyToFit;
        for _ in 0..1000 {
            let gaze = wizard.current_target().map(|p| affine_gaze(p, screen));
            status = wizard.observe(gaze, t).unwrap();
            t += 20;
            if status == WizardStatus::ReadyToFit {
                break;
            }
        }
        assert_eq!(status, WizardStatus::ReadyToFit);
        assert!(wizard.is_complete());
        assert_eq!(wizard.anchors().len(), 9);
        // 300 ms dwell at 20 ms steps: 15 samples per anchor.
        assert!(wizard.anchors().iter().all(|a| a.samples == 15));

        let profile = wizard.finish().unwrap();
        assert!(profile.residual_px < 1e-6);
    }

    #[test]
    fn test_wizard_settle_window_discards_samples() {
        let screen = ScreenSize::new(1920, 1080);
        let cfg = CalibrationConfig {
            settle_ms: 100,
            dwell_ms: 100,
            ..CalibrationConfig::default()
        };
        let mut wizard = CalibrationWizard::new(&cfg, screen);
        let target = wizard.current_target().unwrap();
        let good = affine_gaze(target, screen);
        let glance = GazeVector::new(0.9, 0.9);

        assert!(matches!(
            wizard.observe(Some(glance), 0).unwrap(),
            WizardStatus::Settling { index: 0, .. }
        ));
        wizard.observe(Some(glance), 50).unwrap();
        assert!(matches!(
            wizard.observe(Some(good), 100).unwrap(),
            WizardStatus::Collecting { index: 0, .. }
        ));
        wizard.observe(Some(good), 150).unwrap();
        assert!(matches!(
            wizard.observe(None, 200).unwrap(),
            WizardStatus::Settling { index: 1, .. }
        ));
        let anchor = &wizard.anchors()[0];
        assert_eq!(anchor.samples, 2);
        assert_eq!(anchor.raw, good);
    }

    #[test]
    fn test_wizard_fails_on_anchor_without_samples() {
        let cfg = CalibrationConfig {
            settle_ms: 0,
            dwell_ms: 100,
            ..CalibrationConfig::default()
        };
        let mut wizard = CalibrationWizard::new(&cfg, ScreenSize::default());
        wizard.observe(None, 0).unwrap();
        wizard.observe(None, 50).unwrap();
        assert_eq!(
            wizard.observe(None, 100).unwrap_err(),
            CalibrationError::NoSamples { anchor: 0 }
        );
    }
}
