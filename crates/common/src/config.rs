//! Application configuration.
//!
//! Every numeric option has a declared range. Out-of-range values are
//! rejected by [`AppConfig::validate`] and never clamped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gazectl_frame_model::{ActionBinding, ActionKind, GestureChannel, RegressionModel, ScreenSize};
use serde::{Deserialize, Serialize};

use crate::error::{GazeError, GazeResult};

/// Global application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target screen.
    pub screen: ScreenSize,

    /// Cursor mapping and smoothing.
    pub gaze: GazeConfig,

    /// Expression thresholds and gesture timing.
    pub expressions: ExpressionConfig,

    /// Rate limits and auto-pause.
    pub safety: SafetyConfig,

    /// Calibration wizard and fit validation.
    pub calibration: CalibrationConfig,

    /// Buffering and telemetry.
    pub pipeline: PipelineConfig,

    /// Gesture channel → action table.
    pub actions: BTreeMap<GestureChannel, ActionBinding>,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Which eye drives the gaze estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeDominance {
    Left,
    Right,
    #[default]
    Both,
}

/// Cursor smoothing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// EMA weight of the newest sample, in (0, 1].
    pub smoothing_factor: f64,

    /// Enable the constant-velocity Kalman stage.
    pub use_kalman: bool,

    /// Kalman process noise (Q diagonal).
    pub kalman_process_noise: f64,

    /// Kalman measurement noise (R diagonal).
    pub kalman_measurement_noise: f64,

    /// Radius (px) inside which movement is held.
    pub dead_zone_radius: f64,

    /// Exponent of the peripheral acceleration curve.
    pub acceleration_curve: f64,

    /// Gain of the acceleration curve; 0 disables acceleration.
    pub acceleration_multiplier: f64,

    pub eye_dominance: EyeDominance,
}

/// Expression detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    /// Eye counts as closed below this fraction of its baseline EAR.
    pub blink_threshold: f64,

    /// Added to `blink_threshold` to get the reopen threshold.
    pub blink_hysteresis: f64,

    /// Cooldown for blink channels.
    pub blink_cooldown_ms: u64,

    /// Cooldown for non-blink channels.
    pub gesture_cooldown_ms: u64,

    /// Blinks at least this long are `long`.
    pub long_blink_ms: u64,

    /// Relative brow-height change that counts as raise/lower.
    pub eyebrow_threshold: f64,

    /// Mouth widening + corner lift that counts as a smile.
    pub smile_threshold: f64,

    /// Mouth-opening increase (inter-ocular units) that counts as jaw open.
    pub jaw_threshold: f64,

    /// Exit threshold = enter threshold × this ratio.
    pub hysteresis_exit_ratio: f64,

    /// For a single-eye blink the other eye must stay above this EAR ratio.
    pub wink_open_ratio: f64,

    /// Frames below this detection confidence are suppressed.
    pub confidence_min: f64,

    /// Stable frames averaged into the neutral baseline.
    pub baseline_frames: usize,

    /// Face loss longer than this invalidates the baseline.
    pub baseline_reset_after_ms: u64,

    /// Consecutive frames required before a gesture is confirmed.
    pub debounce_frames: u32,
}

/// Safety gate parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub max_clicks_per_second: u32,

    /// Pause after this long without a valid frame; 0 disables auto-pause.
    pub auto_pause_no_face_ms: u64,

    /// Consecutive valid frames needed to leave a no-face pause.
    pub resume_stable_frames: u32,

    /// Key that triggers the emergency stop.
    pub emergency_key: String,

    /// Lines per scroll action.
    pub scroll_lines: i32,

    /// Minimum spacing between actions of the same class.
    pub action_cooldowns: ActionCooldowns,

    /// Actions that only go out when repeated within
    /// `confirmation_timeout_ms` of the first attempt.
    pub require_confirmation: Vec<ActionKind>,

    pub confirmation_timeout_ms: u64,
}

/// Per-class action cooldowns in milliseconds; 0 disables a class.
///
/// Clicks are already bounded by `max_clicks_per_second`, so their
/// cooldown is off unless configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionCooldowns {
    pub click_ms: u64,
    pub scroll_ms: u64,
    pub key_ms: u64,
}

impl Default for ActionCooldowns {
    fn default() -> Self {
        Self {
            click_ms: 0,
            scroll_ms: 100,
            key_ms: 300,
        }
    }
}

/// Calibration wizard parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Target layout: 5, 9 or 16 points.
    pub points: usize,

    /// Sample collection window per target.
    pub dwell_ms: u64,

    /// Samples in the first `settle_ms` of each target are ignored.
    pub settle_ms: u64,

    /// Minimum anchors accepted by the fit.
    pub min_anchors: usize,

    /// Upper bound on per-anchor sample variance (gaze units²).
    pub max_sample_variance: f64,

    /// Upper bound on RMS residual (pixels).
    pub max_residual_px: f64,

    pub model: RegressionModel,
}

/// Runtime buffering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame ring buffer capacity.
    pub buffer_capacity: usize,

    /// Telemetry queue capacity.
    pub telemetry_capacity: usize,

    /// Maximum telemetry update rate.
    pub telemetry_hz: u32,

    /// How long the worker waits for a frame before ticking timers.
    pub idle_poll_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "gazectl=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            screen: ScreenSize::default(),
            gaze: GazeConfig::default(),
            expressions: ExpressionConfig::default(),
            safety: SafetyConfig::default(),
            calibration: CalibrationConfig::default(),
            pipeline: PipelineConfig::default(),
            actions: default_actions(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.3,
            use_kalman: true,
            kalman_process_noise: 0.01,
            kalman_measurement_noise: 0.1,
            dead_zone_radius: 15.0,
            acceleration_curve: 1.5,
            acceleration_multiplier: 1.0,
            eye_dominance: EyeDominance::Both,
        }
    }
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            blink_threshold: 0.5,
            blink_hysteresis: 0.15,
            blink_cooldown_ms: 200,
            gesture_cooldown_ms: 600,
            long_blink_ms: 500,
            eyebrow_threshold: 0.15,
            smile_threshold: 0.15,
            jaw_threshold: 0.08,
            hysteresis_exit_ratio: 0.7,
            wink_open_ratio: 0.8,
            confidence_min: 0.5,
            baseline_frames: 30,
            baseline_reset_after_ms: 5000,
            debounce_frames: 2,
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_clicks_per_second: 3,
            auto_pause_no_face_ms: 2000,
            resume_stable_frames: 5,
            emergency_key: "escape".to_string(),
            scroll_lines: 3,
            action_cooldowns: ActionCooldowns::default(),
            require_confirmation: Vec::new(),
            confirmation_timeout_ms: 3000,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            points: 9,
            dwell_ms: 2000,
            settle_ms: 300,
            min_anchors: 9,
            max_sample_variance: 0.01,
            max_residual_px: 80.0,
            model: RegressionModel::Affine,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 8,
            telemetry_capacity: 64,
            telemetry_hz: 30,
            idle_poll_ms: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

/// Out-of-the-box gesture bindings.
pub fn default_actions() -> BTreeMap<GestureChannel, ActionBinding> {
    BTreeMap::from([
        (GestureChannel::BlinkBoth, ActionBinding::LeftClick),
        (GestureChannel::BlinkBothLong, ActionBinding::RightClick),
        (GestureChannel::BlinkLeft, ActionBinding::ScrollUp),
        (GestureChannel::BlinkRight, ActionBinding::ScrollDown),
        (GestureChannel::EyebrowRaise, ActionBinding::DoubleClick),
        (GestureChannel::EyebrowLower, ActionBinding::None),
        (GestureChannel::Smile, ActionBinding::ToggleMode),
        (GestureChannel::JawOpen, ActionBinding::Key("enter".to_string())),
    ])
}

fn check(ok: bool, field: &str, value: impl std::fmt::Display, range: &str) -> GazeResult<()> {
    if ok {
        Ok(())
    } else {
        Err(GazeError::config(format!(
            "{field} = {value} is outside {range}"
        )))
    }
}

fn finite_in(value: f64, lo: f64, hi: f64) -> bool {
    value.is_finite() && value >= lo && value <= hi
}

impl AppConfig {
    /// Reject any option outside its declared range.
    pub fn validate(&self) -> GazeResult<()> {
        check(self.screen.width > 0, "screen.width", self.screen.width, "[1, ∞)")?;
        check(self.screen.height > 0, "screen.height", self.screen.height, "[1, ∞)")?;

        let g = &self.gaze;
        check(
            g.smoothing_factor.is_finite() && g.smoothing_factor > 0.0 && g.smoothing_factor <= 1.0,
            "gaze.smoothing_factor",
            g.smoothing_factor,
            "(0, 1]",
        )?;
        check(
            g.kalman_process_noise.is_finite() && g.kalman_process_noise > 0.0,
            "gaze.kalman_process_noise",
            g.kalman_process_noise,
            "(0, ∞)",
        )?;
        check(
            g.kalman_measurement_noise.is_finite() && g.kalman_measurement_noise > 0.0,
            "gaze.kalman_measurement_noise",
            g.kalman_measurement_noise,
            "(0, ∞)",
        )?;
        check(
            finite_in(g.dead_zone_radius, 0.0, f64::MAX),
            "gaze.dead_zone_radius",
            g.dead_zone_radius,
            "[0, ∞)",
        )?;
        check(
            g.acceleration_curve.is_finite() && g.acceleration_curve > 0.0 && g.acceleration_curve <= 5.0,
            "gaze.acceleration_curve",
            g.acceleration_curve,
            "(0, 5]",
        )?;
        check(
            finite_in(g.acceleration_multiplier, 0.0, 10.0),
            "gaze.acceleration_multiplier",
            g.acceleration_multiplier,
            "[0, 10]",
        )?;

        let e = &self.expressions;
        check(
            e.blink_threshold.is_finite() && e.blink_threshold > 0.0 && e.blink_threshold < 1.0,
            "expressions.blink_threshold",
            e.blink_threshold,
            "(0, 1)",
        )?;
        check(
            finite_in(e.blink_hysteresis, 0.0, 1.0 - e.blink_threshold),
            "expressions.blink_hysteresis",
            e.blink_hysteresis,
            "[0, 1 - blink_threshold]",
        )?;
        check(e.long_blink_ms > 0, "expressions.long_blink_ms", e.long_blink_ms, "[1, ∞)")?;
        for (field, value) in [
            ("expressions.eyebrow_threshold", e.eyebrow_threshold),
            ("expressions.smile_threshold", e.smile_threshold),
            ("expressions.jaw_threshold", e.jaw_threshold),
        ] {
            check(value.is_finite() && value > 0.0, field, value, "(0, ∞)")?;
        }
        check(
            e.hysteresis_exit_ratio.is_finite()
                && e.hysteresis_exit_ratio > 0.0
                && e.hysteresis_exit_ratio <= 1.0,
            "expressions.hysteresis_exit_ratio",
            e.hysteresis_exit_ratio,
            "(0, 1]",
        )?;
        check(
            finite_in(e.wink_open_ratio, e.blink_threshold, 2.0),
            "expressions.wink_open_ratio",
            e.wink_open_ratio,
            "[blink_threshold, 2]",
        )?;
        check(
            finite_in(e.confidence_min, 0.0, 1.0),
            "expressions.confidence_min",
            e.confidence_min,
            "[0, 1]",
        )?;
        check(
            e.baseline_frames > 0,
            "expressions.baseline_frames",
            e.baseline_frames,
            "[1, ∞)",
        )?;
        check(
            e.debounce_frames > 0,
            "expressions.debounce_frames",
            e.debounce_frames,
            "[1, ∞)",
        )?;

        let s = &self.safety;
        check(
            s.max_clicks_per_second > 0,
            "safety.max_clicks_per_second",
            s.max_clicks_per_second,
            "[1, ∞)",
        )?;
        check(
            s.resume_stable_frames > 0,
            "safety.resume_stable_frames",
            s.resume_stable_frames,
            "[1, ∞)",
        )?;
        check(
            !s.emergency_key.trim().is_empty(),
            "safety.emergency_key",
            "\"\"",
            "non-empty key names",
        )?;
        check(s.scroll_lines > 0, "safety.scroll_lines", s.scroll_lines, "[1, ∞)")?;
        let cd = &s.action_cooldowns;
        for (field, value) in [
            ("safety.action_cooldowns.click_ms", cd.click_ms),
            ("safety.action_cooldowns.scroll_ms", cd.scroll_ms),
            ("safety.action_cooldowns.key_ms", cd.key_ms),
        ] {
            check(value <= 10_000, field, value, "[0, 10000]")?;
        }
        check(
            (100..=60_000).contains(&s.confirmation_timeout_ms),
            "safety.confirmation_timeout_ms",
            s.confirmation_timeout_ms,
            "[100, 60000]",
        )?;
        check(
            !s.require_confirmation.contains(&ActionKind::PointerMove),
            "safety.require_confirmation",
            "pointer_move",
            "discrete actions",
        )?;

        let c = &self.calibration;
        check(
            matches!(c.points, 5 | 9 | 16),
            "calibration.points",
            c.points,
            "{5, 9, 16}",
        )?;
        check(c.dwell_ms > 0, "calibration.dwell_ms", c.dwell_ms, "[1, ∞)")?;
        check(
            c.min_anchors >= c.model.terms(),
            "calibration.min_anchors",
            c.min_anchors,
            "[model terms, ∞)",
        )?;
        check(
            c.min_anchors <= c.points,
            "calibration.min_anchors",
            c.min_anchors,
            "[model terms, calibration.points]",
        )?;
        check(
            c.max_sample_variance.is_finite() && c.max_sample_variance > 0.0,
            "calibration.max_sample_variance",
            c.max_sample_variance,
            "(0, ∞)",
        )?;
        check(
            c.max_residual_px.is_finite() && c.max_residual_px > 0.0,
            "calibration.max_residual_px",
            c.max_residual_px,
            "(0, ∞)",
        )?;

        let p = &self.pipeline;
        check(
            p.buffer_capacity > 0,
            "pipeline.buffer_capacity",
            p.buffer_capacity,
            "[1, ∞)",
        )?;
        check(
            p.telemetry_capacity > 0,
            "pipeline.telemetry_capacity",
            p.telemetry_capacity,
            "[1, ∞)",
        )?;
        check(p.telemetry_hz > 0, "pipeline.telemetry_hz", p.telemetry_hz, "[1, ∞)")?;
        check(p.idle_poll_ms > 0, "pipeline.idle_poll_ms", p.idle_poll_ms, "[1, ∞)")?;

        for (channel, binding) in &self.actions {
            if let ActionBinding::Key(code) = binding {
                check(
                    !code.trim().is_empty(),
                    &format!("actions.{channel}"),
                    "{\"key\": \"\"}",
                    "non-empty key codes",
                )?;
            }
        }

        Ok(())
    }

    /// Parse and validate configuration from JSON text.
    pub fn from_json_str(json: &str) -> GazeResult<Self> {
        let config: AppConfig = serde_json::from_str(json)
            .map_err(|e| GazeError::config(format!("invalid configuration JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a file.
    pub fn load_from(path: impl AsRef<Path>) -> GazeResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GazeError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load config from the standard location, falling back to defaults
    /// when no file exists. A present but invalid file is an error.
    pub fn load() -> GazeResult<Self> {
        let config_path = config_file_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save config to the given location.
    pub fn save_to(&self, path: impl AsRef<Path>) -> GazeResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Save config to the standard location.
    pub fn save(&self) -> GazeResult<()> {
        self.save_to(config_file_path())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Standard calibration profile location.
pub fn profile_file_path() -> PathBuf {
    data_dir().join("profile.json")
}

/// Directory holding named calibration profiles.
pub fn profiles_dir() -> PathBuf {
    data_dir().join("profiles")
}

fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("gazectl")
}

fn config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("gazectl")
}
