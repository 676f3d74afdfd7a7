//! Facial expression metrics and gesture classification.
//!
//! Every metric is normalized by the inter-ocular distance so that moving
//! toward or away from the camera does not change the classification. The
//! engine learns a per-session neutral [`BaselineMetrics`] from the first
//! stable frames and classifies gestures relative to it:
//!
//! - **Blinks** are timed episodes, reported once the eyes reopen
//! - **Smile**, **eyebrow** and **jaw** are held states, reported every
//!   frame they stay active
//!
//! All thresholds use hysteresis so a metric hovering at the threshold does
//! not flap.

use gazectl_common::ExpressionConfig;
use gazectl_frame_model::{
    face_mesh, BlinkLength, GestureChannel, GestureEvent, Landmark, LandmarkFrame, TimestampMs,
};

/// Smallest baseline value a ratio is taken against.
const MIN_BASELINE: f64 = 1e-6;

/// Eye aspect ratio from the six eye contour points.
fn eye_aspect_ratio(frame: &LandmarkFrame, eye: [usize; 6]) -> Option<f64> {
    let p = |i: usize| frame.point(eye[i]);
    let horizontal = p(0)?.distance_to(p(3)?);
    if horizontal <= f64::EPSILON {
        return None;
    }
    let vertical = p(1)?.distance_to(p(5)?) + p(2)?.distance_to(p(4)?);
    Some(vertical / (2.0 * horizontal))
}

/// Per-frame facial measurements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMetrics {
    pub left_ear: f64,
    pub right_ear: f64,
    /// Mouth corner distance / inter-ocular distance.
    pub mouth_width: f64,
    /// Lip-centre y minus mean corner y, over inter-ocular distance
    /// (positive when the corners sit higher).
    pub corner_elevation: f64,
    /// Inner lip gap / inter-ocular distance.
    pub mouth_opening: f64,
    /// Mean brow-to-eye distance / inter-ocular distance.
    pub brow_height: f64,
}

impl FaceMetrics {
    pub fn from_frame(frame: &LandmarkFrame) -> Option<Self> {
        let p = |i: usize| frame.point(i);

        let iod = p(face_mesh::LEFT_EYE_OUTER)?.distance_to(p(face_mesh::RIGHT_EYE_OUTER)?);
        if iod <= f64::EPSILON {
            return None;
        }

        let left_ear = eye_aspect_ratio(frame, face_mesh::LEFT_EYE)?;
        let right_ear = eye_aspect_ratio(frame, face_mesh::RIGHT_EYE)?;

        let mouth_l = p(face_mesh::MOUTH_LEFT)?;
        let mouth_r = p(face_mesh::MOUTH_RIGHT)?;
        let upper = p(face_mesh::UPPER_LIP)?;
        let lower = p(face_mesh::LOWER_LIP)?;
        let lip_centre = Landmark::midpoint(upper, lower);
        let corners_y = (mouth_l.y + mouth_r.y) / 2.0;

        let left_eye = Landmark::midpoint(
            p(face_mesh::LEFT_EYE_OUTER)?,
            p(face_mesh::LEFT_EYE_INNER)?,
        );
        let right_eye = Landmark::midpoint(
            p(face_mesh::RIGHT_EYE_INNER)?,
            p(face_mesh::RIGHT_EYE_OUTER)?,
        );
        let brow = (p(face_mesh::LEFT_BROW)?.distance_to(&left_eye)
            + p(face_mesh::RIGHT_BROW)?.distance_to(&right_eye))
            / 2.0;

        let metrics = Self {
            left_ear,
            right_ear,
            mouth_width: mouth_l.distance_to(mouth_r) / iod,
            corner_elevation: (lip_centre.y - corners_y) / iod,
            mouth_opening: upper.distance_to(lower) / iod,
            brow_height: brow / iod,
        };
        metrics.is_finite().then_some(metrics)
    }

    fn is_finite(&self) -> bool {
        [
            self.left_ear,
            self.right_ear,
            self.mouth_width,
            self.corner_elevation,
            self.mouth_opening,
            self.brow_height,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Neutral-face reference learned at the start of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineMetrics {
    pub left_ear: f64,
    pub right_ear: f64,
    pub mouth_width: f64,
    pub corner_elevation: f64,
    pub mouth_opening: f64,
    pub brow_height: f64,
}

impl BaselineMetrics {
    /// Mean of the collected frames.
    pub fn from_samples(samples: &[FaceMetrics]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = |f: fn(&FaceMetrics) -> f64| samples.iter().map(f).sum::<f64>() / n;
        Some(Self {
            left_ear: mean(|m| m.left_ear),
            right_ear: mean(|m| m.right_ear),
            mouth_width: mean(|m| m.mouth_width),
            corner_elevation: mean(|m| m.corner_elevation),
            mouth_opening: mean(|m| m.mouth_opening),
            brow_height: mean(|m| m.brow_height),
        })
    }
}

/// Two-threshold latch.
#[derive(Debug, Clone, Copy, Default)]
struct Hysteresis {
    active: bool,
}

impl Hysteresis {
    /// Activates above `enter`, deactivates below `exit`.
    fn update(&mut self, value: f64, enter: f64, exit: f64) -> bool {
        self.active = if self.active {
            value >= exit
        } else {
            value > enter
        };
        self.active
    }
}

#[derive(Debug, Clone, Copy)]
struct BlinkEpisode {
    started_ms: TimestampMs,
    left_closed: bool,
    right_closed: bool,
    left_min_ratio: f64,
    right_min_ratio: f64,
    closed_frames: u32,
}

impl BlinkEpisode {
    fn new(started_ms: TimestampMs) -> Self {
        Self {
            started_ms,
            left_closed: false,
            right_closed: false,
            left_min_ratio: f64::INFINITY,
            right_min_ratio: f64::INFINITY,
            closed_frames: 0,
        }
    }
}

/// Result of feeding one frame to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionOutcome {
    /// No face, low confidence, or unusable geometry. Nothing changed.
    Suppressed,
    /// Frame went into the neutral baseline; no classification yet.
    Baseline { collected: usize, required: usize },
    /// Raw gesture events for this frame (possibly none).
    Classified(Vec<GestureEvent>),
}

/// Per-session expression classifier.
#[derive(Debug, Clone)]
pub struct ExpressionEngine {
    config: ExpressionConfig,
    baseline: Option<BaselineMetrics>,
    collecting: Vec<FaceMetrics>,
    last_face_ms: Option<TimestampMs>,
    left_closed: bool,
    right_closed: bool,
    episode: Option<BlinkEpisode>,
    smile: Hysteresis,
    brow_raise: Hysteresis,
    brow_lower: Hysteresis,
    jaw: Hysteresis,
}

impl ExpressionEngine {
    pub fn new(config: ExpressionConfig) -> Self {
        Self {
            collecting: Vec::with_capacity(config.baseline_frames),
            config,
            baseline: None,
            last_face_ms: None,
            left_closed: false,
            right_closed: false,
            episode: None,
            smile: Hysteresis::default(),
            brow_raise: Hysteresis::default(),
            brow_lower: Hysteresis::default(),
            jaw: Hysteresis::default(),
        }
    }

    pub fn baseline(&self) -> Option<&BaselineMetrics> {
        self.baseline.as_ref()
    }

    /// Forget the baseline and every in-flight classification.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.collecting.clear();
        self.last_face_ms = None;
        self.reset_classification();
    }

    fn reset_classification(&mut self) {
        self.left_closed = false;
        self.right_closed = false;
        self.episode = None;
        self.smile = Hysteresis::default();
        self.brow_raise = Hysteresis::default();
        self.brow_lower = Hysteresis::default();
        self.jaw = Hysteresis::default();
    }

    /// Whether a frame is good enough to learn from or classify.
    pub fn is_stable(&self, frame: &LandmarkFrame) -> bool {
        frame.has_face() && frame.confidence >= self.config.confidence_min
    }

    pub fn process(&mut self, frame: &LandmarkFrame) -> ExpressionOutcome {
        let metrics = if self.is_stable(frame) {
            FaceMetrics::from_frame(frame)
        } else {
            None
        };
        let Some(metrics) = metrics else {
            if self.baseline.is_none() && !self.collecting.is_empty() {
                // Baseline frames must be consecutive.
                self.collecting.clear();
            }
            return ExpressionOutcome::Suppressed;
        };

        let ts = frame.timestamp_ms;
        if let Some(last) = self.last_face_ms {
            let gap = ts.saturating_sub(last);
            if self.baseline.is_some() && gap > self.config.baseline_reset_after_ms {
                tracing::info!(
                    gap_ms = gap,
                    "Face re-acquired after long gap, relearning baseline"
                );
                self.baseline = None;
                self.collecting.clear();
                self.reset_classification();
            }
        }
        self.last_face_ms = Some(ts);

        let Some(baseline) = self.baseline else {
            self.collecting.push(metrics);
            let collected = self.collecting.len();
            let required = self.config.baseline_frames;
            if collected >= required {
                self.baseline = BaselineMetrics::from_samples(&self.collecting);
                self.collecting.clear();
                tracing::info!(
                    frames = collected,
                    baseline = ?self.baseline,
                    "Expression baseline learned"
                );
            }
            return ExpressionOutcome::Baseline {
                collected,
                required,
            };
        };

        let mut events = Vec::new();
        if let Some(blink) = self.classify_blink(&metrics, &baseline, frame) {
            events.push(blink);
        }
        self.classify_held(&metrics, &baseline, frame, &mut events);
        ExpressionOutcome::Classified(events)
    }

    fn classify_blink(
        &mut self,
        m: &FaceMetrics,
        base: &BaselineMetrics,
        frame: &LandmarkFrame,
    ) -> Option<GestureEvent> {
        let cfg = &self.config;
        let left_ratio = m.left_ear / base.left_ear.max(MIN_BASELINE);
        let right_ratio = m.right_ear / base.right_ear.max(MIN_BASELINE);
        let reopen = cfg.blink_threshold + cfg.blink_hysteresis;

        let eye = |closed: bool, ratio: f64| {
            if closed {
                ratio <= reopen
            } else {
                ratio < cfg.blink_threshold
            }
        };
        self.left_closed = eye(self.left_closed, left_ratio);
        self.right_closed = eye(self.right_closed, right_ratio);

        let ts = frame.timestamp_ms;
        if self.left_closed || self.right_closed {
            let episode = self.episode.get_or_insert_with(|| BlinkEpisode::new(ts));
            episode.left_closed |= self.left_closed;
            episode.right_closed |= self.right_closed;
            episode.left_min_ratio = episode.left_min_ratio.min(left_ratio);
            episode.right_min_ratio = episode.right_min_ratio.min(right_ratio);
            episode.closed_frames += 1;
            return None;
        }

        let episode = self.episode.take()?;
        let duration = ts.saturating_sub(episode.started_ms);
        let length = BlinkLength::classify(duration, cfg.long_blink_ms);

        let (channel, depth) = match (episode.left_closed, episode.right_closed) {
            (true, true) => {
                let channel = match length {
                    BlinkLength::Short => GestureChannel::BlinkBoth,
                    BlinkLength::Long => GestureChannel::BlinkBothLong,
                };
                (channel, episode.left_min_ratio.max(episode.right_min_ratio))
            }
            (true, false) if episode.right_min_ratio >= cfg.wink_open_ratio => {
                (GestureChannel::BlinkLeft, episode.left_min_ratio)
            }
            (false, true) if episode.left_min_ratio >= cfg.wink_open_ratio => {
                (GestureChannel::BlinkRight, episode.right_min_ratio)
            }
            _ => {
                tracing::debug!(
                    duration_ms = duration,
                    left_min = episode.left_min_ratio,
                    right_min = episode.right_min_ratio,
                    "Ambiguous single-eye closure ignored"
                );
                return None;
            }
        };

        tracing::debug!(
            channel = %channel,
            duration_ms = duration,
            frames = episode.closed_frames,
            "Blink episode finished"
        );
        Some(GestureEvent::blink(
            channel,
            (1.0 - depth).clamp(0.0, 1.0),
            ts,
            frame.frame_id,
            duration,
            episode.closed_frames,
        ))
    }

    fn classify_held(
        &mut self,
        m: &FaceMetrics,
        base: &BaselineMetrics,
        frame: &LandmarkFrame,
        events: &mut Vec<GestureEvent>,
    ) {
        let cfg = &self.config;
        let exit = cfg.hysteresis_exit_ratio;

        let smile = (m.mouth_width / base.mouth_width.max(MIN_BASELINE) - 1.0)
            + (m.corner_elevation - base.corner_elevation);
        let brow = (m.brow_height - base.brow_height) / base.brow_height.max(MIN_BASELINE);
        let jaw = m.mouth_opening - base.mouth_opening;

        let checks = [
            (
                GestureChannel::Smile,
                self.smile
                    .update(smile, cfg.smile_threshold, cfg.smile_threshold * exit),
                smile,
            ),
            (
                GestureChannel::EyebrowRaise,
                self.brow_raise
                    .update(brow, cfg.eyebrow_threshold, cfg.eyebrow_threshold * exit),
                brow,
            ),
            (
                GestureChannel::EyebrowLower,
                self.brow_lower
                    .update(-brow, cfg.eyebrow_threshold, cfg.eyebrow_threshold * exit),
                -brow,
            ),
            (
                GestureChannel::JawOpen,
                self.jaw
                    .update(jaw, cfg.jaw_threshold, cfg.jaw_threshold * exit),
                jaw,
            ),
        ];

        events.extend(
            checks
                .into_iter()
                .filter(|(_, active, _)| *active)
                .map(|(channel, _, value)| {
                    GestureEvent::raw(channel, value, frame.timestamp_ms, frame.frame_id)
                }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazectl_frame_model::synthetic::SyntheticFace;

    const FRAME_MS: u64 = 33;

    struct Harness {
        engine: ExpressionEngine,
        frame_id: u64,
        t: TimestampMs,
    }

    impl Harness {
        fn new(config: ExpressionConfig) -> Self {
            let mut h = Self {
                engine: ExpressionEngine::new(config),
                frame_id: 0,
                t: 0,
            };
            for _ in 0..h.engine.config.baseline_frames {
                h.feed(&SyntheticFace::neutral());
            }
            assert!(h.engine.baseline().is_some());
            h
        }

        fn feed_at(&mut self, face: &SyntheticFace, t: TimestampMs) -> ExpressionOutcome {
            self.t = t;
            self.frame_id += 1;
            self.engine.process(&face.frame(self.frame_id, t))
        }

        fn feed(&mut self, face: &SyntheticFace) -> ExpressionOutcome {
            let t = self.t + FRAME_MS;
            self.feed_at(face, t)
        }

        fn events(&mut self, face: &SyntheticFace) -> Vec<GestureEvent> {
            match self.feed(face) {
                ExpressionOutcome::Classified(events) => events,
                other => panic!("expected classification, got {other:?}"),
            }
        }

        fn channels(&mut self, face: &SyntheticFace) -> Vec<GestureChannel> {
            self.events(face).into_iter().map(|e| e.channel).collect()
        }
    }

    /// Close both eyes at `start`, keep them closed, reopen at `start + duration`.
    fn timed_blink(h: &mut Harness, duration: u64) -> Vec<GestureEvent> {
        let start = h.t + FRAME_MS;
        let closed = SyntheticFace::neutral().eyes(0.1, 0.1);
        let mut t = start;
        while t < start + duration {
            h.feed_at(&closed, t);
            t += FRAME_MS;
        }
        match h.feed_at(&SyntheticFace::neutral(), start + duration) {
            ExpressionOutcome::Classified(events) => events,
            other => panic!("expected classification, got {other:?}"),
        }
    }

    #[test]
    fn test_metrics_of_neutral_face() {
        let m = FaceMetrics::from_frame(&SyntheticFace::neutral().frame(0, 0)).unwrap();
        assert!((m.left_ear - 0.3).abs() < 1e-9);
        assert!((m.right_ear - 0.3).abs() < 1e-9);
        assert!((m.mouth_width - 0.5).abs() < 1e-9);
        assert!(m.corner_elevation.abs() < 1e-9);
    }

    #[test]
    fn test_metrics_are_scale_invariant() {
        let a = FaceMetrics::from_frame(&SyntheticFace::neutral().smile(0.3).frame(0, 0)).unwrap();
        let b = FaceMetrics::from_frame(
            &SyntheticFace::neutral()
                .smile(0.3)
                .transform(1.7, -0.1, 0.05)
                .frame(0, 0),
        )
        .unwrap();
        assert!((a.mouth_width - b.mouth_width).abs() < 1e-9);
        assert!((a.brow_height - b.brow_height).abs() < 1e-9);
        assert!((a.left_ear - b.left_ear).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_collection() {
        let mut engine = ExpressionEngine::new(ExpressionConfig {
            baseline_frames: 3,
            ..ExpressionConfig::default()
        });
        let face = SyntheticFace::neutral();
        assert_eq!(
            engine.process(&face.frame(0, 0)),
            ExpressionOutcome::Baseline {
                collected: 1,
                required: 3
            }
        );
        engine.process(&face.frame(1, 33));
        engine.process(&face.frame(2, 66));
        assert!(engine.baseline().is_some());
        assert_eq!(
            engine.process(&face.frame(3, 99)),
            ExpressionOutcome::Classified(vec![])
        );
    }

    #[test]
    fn test_baseline_requires_consecutive_stable_frames() {
        let mut engine = ExpressionEngine::new(ExpressionConfig {
            baseline_frames: 3,
            ..ExpressionConfig::default()
        });
        let face = SyntheticFace::neutral();
        engine.process(&face.frame(0, 0));
        engine.process(&face.frame(1, 33));
        assert_eq!(
            engine.process(&face.clone().confidence(0.1).frame(2, 66)),
            ExpressionOutcome::Suppressed
        );
        assert_eq!(
            engine.process(&face.frame(3, 99)),
            ExpressionOutcome::Baseline {
                collected: 1,
                required: 3
            }
        );
    }

    #[test]
    fn test_neutral_face_produces_no_events() {
        let mut h = Harness::new(ExpressionConfig::default());
        for _ in 0..20 {
            assert!(h.events(&SyntheticFace::neutral()).is_empty());
        }
        // Leaning in does not look like a gesture.
        assert!(h
            .events(&SyntheticFace::neutral().transform(1.3, 0.02, 0.0))
            .is_empty());
    }

    #[test]
    fn test_short_and_long_blink_boundary() {
        let mut h = Harness::new(ExpressionConfig::default());
        let events = timed_blink(&mut h, 499);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel, GestureChannel::BlinkBoth);
        assert_eq!(events[0].duration_ms, Some(499));
        assert_eq!(events[0].span_frames, 16);

        let mut h = Harness::new(ExpressionConfig::default());
        let events = timed_blink(&mut h, 500);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel, GestureChannel::BlinkBothLong);
        assert_eq!(events[0].duration_ms, Some(500));
    }

    #[test]
    fn test_blink_reported_only_on_reopen() {
        let mut h = Harness::new(ExpressionConfig::default());
        let closed = SyntheticFace::neutral().eyes(0.0, 0.0);
        assert!(h.events(&closed).is_empty());
        assert!(h.events(&closed).is_empty());
        let events = h.events(&SyntheticFace::neutral());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].span_frames, 2);
        assert!((events[0].intensity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_blink_hysteresis() {
        let mut h = Harness::new(ExpressionConfig::default());
        // Enter below 0.5, stay closed up to 0.65.
        assert!(h.events(&SyntheticFace::neutral().eyes(0.4, 0.4)).is_empty());
        assert!(h.events(&SyntheticFace::neutral().eyes(0.6, 0.6)).is_empty());
        assert!(h.events(&SyntheticFace::neutral().eyes(0.62, 0.62)).is_empty());
        let events = h.events(&SyntheticFace::neutral().eyes(0.7, 0.7));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].span_frames, 3);
    }

    #[test]
    fn test_wink_requires_other_eye_open() {
        let mut h = Harness::new(ExpressionConfig::default());
        h.events(&SyntheticFace::neutral().eyes(0.0, 1.0));
        h.events(&SyntheticFace::neutral().eyes(0.0, 0.95));
        assert_eq!(
            h.channels(&SyntheticFace::neutral()),
            vec![GestureChannel::BlinkLeft]
        );

        h.events(&SyntheticFace::neutral().eyes(1.0, 0.1));
        h.events(&SyntheticFace::neutral().eyes(1.0, 0.1));
        assert_eq!(
            h.channels(&SyntheticFace::neutral()),
            vec![GestureChannel::BlinkRight]
        );

        // Squint: the other eye dropped below the wink ratio.
        h.events(&SyntheticFace::neutral().eyes(0.0, 0.7));
        h.events(&SyntheticFace::neutral().eyes(0.0, 0.7));
        assert!(h.events(&SyntheticFace::neutral()).is_empty());
    }

    #[test]
    fn test_smile_held_with_hysteresis() {
        let mut h = Harness::new(ExpressionConfig::default());
        assert!(h.events(&SyntheticFace::neutral().smile(0.1)).is_empty());
        assert_eq!(
            h.channels(&SyntheticFace::neutral().smile(0.2)),
            vec![GestureChannel::Smile]
        );
        assert_eq!(
            h.channels(&SyntheticFace::neutral().smile(0.2)),
            vec![GestureChannel::Smile]
        );
        // Below enter but above exit: still held.
        assert_eq!(
            h.channels(&SyntheticFace::neutral().smile(0.12)),
            vec![GestureChannel::Smile]
        );
        assert!(h.events(&SyntheticFace::neutral().smile(0.05)).is_empty());
        // Re-entry needs the full enter threshold again.
        assert!(h.events(&SyntheticFace::neutral().smile(0.12)).is_empty());
    }

    #[test]
    fn test_eyebrow_raise_and_lower() {
        let mut h = Harness::new(ExpressionConfig::default());
        assert_eq!(
            h.channels(&SyntheticFace::neutral().brow(0.05)),
            vec![GestureChannel::EyebrowRaise]
        );
        assert!(h.events(&SyntheticFace::neutral()).is_empty());
        assert_eq!(
            h.channels(&SyntheticFace::neutral().brow(-0.05)),
            vec![GestureChannel::EyebrowLower]
        );
    }

    #[test]
    fn test_jaw_open() {
        let mut h = Harness::new(ExpressionConfig::default());
        assert!(h.events(&SyntheticFace::neutral().jaw(0.05)).is_empty());
        let events = h.events(&SyntheticFace::neutral().jaw(0.1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel, GestureChannel::JawOpen);
        assert!((events[0].intensity - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_frames_are_suppressed() {
        let mut h = Harness::new(ExpressionConfig::default());
        let shut = SyntheticFace::neutral().eyes(0.0, 0.0).confidence(0.2);
        assert_eq!(h.feed(&shut), ExpressionOutcome::Suppressed);
        assert_eq!(h.feed(&shut), ExpressionOutcome::Suppressed);
        assert!(h.events(&SyntheticFace::neutral()).is_empty());
    }

    #[test]
    fn test_baseline_relearned_after_long_gap() {
        let mut h = Harness::new(ExpressionConfig::default());
        let t = h.t + 5_001;
        assert_eq!(
            h.feed_at(&SyntheticFace::neutral(), t),
            ExpressionOutcome::Baseline {
                collected: 1,
                required: 30
            }
        );
        assert!(h.engine.baseline().is_none());

        let mut h = Harness::new(ExpressionConfig::default());
        let t = h.t + 5_000;
        assert_eq!(
            h.feed_at(&SyntheticFace::neutral(), t),
            ExpressionOutcome::Classified(vec![])
        );
    }
}
