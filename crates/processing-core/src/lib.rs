//! gazectl Processing Core
//!
//! The per-frame computation behind hands-free control:
//! - **Calibration:** Fit a gaze → screen transform from anchor samples
//! - **Gaze Mapping:** Estimate gaze from landmarks and map it to pixels
//! - **Cursor Smoothing:** EMA, Kalman, dead zone, and acceleration stages
//! - **Expressions:** Baseline-relative blink, smile, eyebrow, and jaw detection
//! - **Debounce / Safety / Dispatch:** Turn raw gestures into rate-limited actions
//!
//! This crate is pure computation over frame timestamps and does no I/O.
//! All inputs are data; all outputs are data.

pub mod calibration;
pub mod cursor_smooth;
pub mod debounce;
pub mod dispatch;
pub mod expression;
pub mod gaze_map;
pub mod safety;

pub use calibration::{CalibrationEngine, CalibrationWizard, WizardStatus};
pub use cursor_smooth::{CursorSmoother, CursorState};
pub use debounce::DebounceGate;
pub use dispatch::{ActionDispatcher, ActionTable};
pub use expression::{BaselineMetrics, ExpressionEngine, ExpressionOutcome, FaceMetrics};
pub use gaze_map::{estimate_gaze, GazeMapper, GazeSample};
pub use safety::{PauseReason, SafetyManager, SafetyState, SafetyStatus};
