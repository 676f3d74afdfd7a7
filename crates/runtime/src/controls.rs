//! Out-of-band control signals for a running worker.
//!
//! Any thread (a hotkey listener, the UI, a signal handler) can raise these
//! flags; the worker consumes them at the top of each iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared control flags. Clone the `Arc` to hand it out.
#[derive(Debug)]
pub struct PipelineControls {
    emergency_key: String,
    stop: AtomicBool,
    emergency: AtomicBool,
    resume: AtomicBool,
    calibrate: AtomicBool,
}

impl PipelineControls {
    pub fn new(emergency_key: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            emergency_key: emergency_key.into(),
            stop: AtomicBool::new(false),
            emergency: AtomicBool::new(false),
            resume: AtomicBool::new(false),
            calibrate: AtomicBool::new(false),
        })
    }

    pub fn emergency_key(&self) -> &str {
        &self.emergency_key
    }

    /// Route a key press from the host. Returns `true` if it was the
    /// emergency key.
    pub fn handle_key(&self, key: &str) -> bool {
        if key.trim().eq_ignore_ascii_case(&self.emergency_key) {
            self.trigger_emergency_stop();
            return true;
        }
        false
    }

    pub fn trigger_emergency_stop(&self) {
        tracing::warn!(key = %self.emergency_key, "Emergency stop requested");
        self.emergency.store(true, Ordering::SeqCst);
    }

    pub fn request_resume(&self) {
        self.resume.store(true, Ordering::SeqCst);
    }

    pub fn request_calibration(&self) {
        self.calibrate.store(true, Ordering::SeqCst);
    }

    /// Ask the worker to finish after the current iteration.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn take_emergency(&self) -> bool {
        self.emergency.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_resume(&self) -> bool {
        self.resume.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_calibration(&self) -> bool {
        self.calibrate.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_key_matching() {
        let controls = PipelineControls::new("escape");
        assert!(!controls.handle_key("space"));
        assert!(!controls.take_emergency());
        assert!(controls.handle_key("Escape"));
        assert!(controls.take_emergency());
        // Consumed once.
        assert!(!controls.take_emergency());
    }

    #[test]
    fn test_flags_are_independent() {
        let controls = PipelineControls::new("f12");
        controls.request_resume();
        controls.request_stop();
        assert!(!controls.take_calibration());
        assert!(controls.take_resume());
        assert!(controls.stop_requested());
        assert!(controls.stop_requested());
    }
}
