//! Error types shared across gazectl crates.

use std::path::PathBuf;

/// Top-level error type for gazectl operations.
///
/// Every variant except [`GazeError::StreamLost`] is recoverable: the
/// processing loop logs it and moves on to the next frame.
#[derive(Debug, thiserror::Error)]
pub enum GazeError {
    /// Missing or malformed frame, or no active calibration.
    #[error("Input error: {message}")]
    Input { message: String },

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    /// A configuration parameter was outside its declared range.
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Safety violation: {0}")]
    Safety(#[from] SafetyViolation),

    /// The landmark source terminated. Fatal; the caller decides on shutdown.
    #[error("Landmark stream lost: {message}")]
    StreamLost { message: String },

    #[error("Action sink error: {message}")]
    Sink { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GazeError.
pub type GazeResult<T> = Result<T, GazeError>;

impl GazeError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn stream_lost(msg: impl Into<String>) -> Self {
        Self::StreamLost {
            message: msg.into(),
        }
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink {
            message: msg.into(),
        }
    }

    /// Whether the processing loop must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StreamLost { .. })
    }
}

/// Reasons a calibration run is rejected. No partial profile is installed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("need at least {required} anchors, have {found}")]
    InsufficientAnchors { found: usize, required: usize },

    #[error("anchor {anchor} has no gaze samples")]
    NoSamples { anchor: usize },

    #[error("anchor {anchor} fixation unstable: variance {variance:.5} exceeds {limit:.5}")]
    UnstableFixation {
        anchor: usize,
        variance: f64,
        limit: f64,
    },

    #[error("residual {residual_px:.1}px exceeds {limit_px:.1}px")]
    ResidualTooHigh { residual_px: f64, limit_px: f64 },

    #[error("regression is degenerate: {message}")]
    Degenerate { message: String },

    #[error("no calibration in progress")]
    NotRunning,
}

/// Reasons an individual action is refused by the safety gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafetyViolation {
    #[error("click rate limit of {limit}/s reached")]
    RateExceeded { limit: u32 },

    #[error("pipeline paused ({reason})")]
    Paused { reason: String },

    #[error("{action} cooling down for another {remaining_ms}ms")]
    Cooldown { action: String, remaining_ms: u64 },

    /// First attempt of an action that must be repeated to go out.
    #[error("{action} needs confirmation: repeat within {timeout_ms}ms")]
    ConfirmationRequired { action: String, timeout_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stream_loss_is_fatal() {
        assert!(GazeError::stream_lost("detector exited").is_fatal());
        assert!(!GazeError::input("bad frame").is_fatal());
        assert!(!GazeError::from(CalibrationError::NotRunning).is_fatal());
    }

    #[test]
    fn test_messages() {
        let err = GazeError::from(CalibrationError::InsufficientAnchors {
            found: 8,
            required: 9,
        });
        assert_eq!(
            err.to_string(),
            "Calibration error: need at least 9 anchors, have 8"
        );

        let err = GazeError::from(SafetyViolation::RateExceeded { limit: 3 });
        assert_eq!(
            err.to_string(),
            "Safety violation: click rate limit of 3/s reached"
        );
    }
}
