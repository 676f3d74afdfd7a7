//! Clock and timing utilities.
//!
//! Frame timestamps come from the landmark source and are the only time
//! base the processing stages see. This module provides:
//! - Wall-clock stamps for profiles and action logs
//! - A stream clock that extrapolates source time between frames
//! - Rate control for telemetry publication
//! - A moving-average latency meter

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use gazectl_frame_model::TimestampMs;

/// Current wall-clock time as RFC 3339.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Extrapolates source timestamps between frames.
///
/// When frames stop arriving, timers such as the no-face timeout still need
/// to advance. The stream clock remembers the newest source timestamp and
/// the instant it was observed, and reports `source + elapsed` from there.
#[derive(Debug, Clone, Default)]
pub struct StreamClock {
    anchor: Option<(TimestampMs, Instant)>,
}

impl StreamClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a source timestamp. Older timestamps are ignored.
    pub fn observe(&mut self, timestamp_ms: TimestampMs) {
        self.observe_at(timestamp_ms, Instant::now());
    }

    fn observe_at(&mut self, timestamp_ms: TimestampMs, at: Instant) {
        match self.anchor {
            Some((last, _)) if timestamp_ms < last => {}
            _ => self.anchor = Some((timestamp_ms, at)),
        }
    }

    /// Estimated current source time, or `None` before the first frame.
    pub fn now_ms(&self) -> Option<TimestampMs> {
        self.now_at(Instant::now())
    }

    fn now_at(&self, at: Instant) -> Option<TimestampMs> {
        self.anchor.map(|(ts, seen)| {
            ts + at.saturating_duration_since(seen).as_millis() as TimestampMs
        })
    }
}

/// Rate controller for throttled publication.
#[derive(Debug)]
pub struct RateController {
    target_interval_ms: u64,
    last_tick_ms: Option<TimestampMs>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ms: 1000 / target_hz.max(1) as u64,
            last_tick_ms: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, now_ms: TimestampMs) -> bool {
        match self.last_tick_ms {
            None => {
                self.last_tick_ms = Some(now_ms);
                true
            }
            Some(last) if now_ms >= last + self.target_interval_ms => {
                self.last_tick_ms = Some(now_ms);
                true
            }
            _ => false,
        }
    }

    /// Target interval in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        self.target_interval_ms
    }
}

/// Moving average over the most recent processing latencies.
#[derive(Debug, Clone)]
pub struct LatencyMeter {
    window: usize,
    samples: VecDeque<u64>,
    sum_us: u64,
}

impl LatencyMeter {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::with_capacity(window.max(1)),
            sum_us: 0,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        let us = latency.as_micros() as u64;
        if self.samples.len() == self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum_us -= old;
            }
        }
        self.samples.push_back(us);
        self.sum_us += us;
    }

    /// Mean latency in microseconds; 0 before any sample.
    pub fn average_us(&self) -> u64 {
        if self.samples.is_empty() {
            0
        } else {
            self.sum_us / self.samples.len() as u64
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for LatencyMeter {
    fn default() -> Self {
        Self::new(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_stamp_is_rfc3339() {
        assert!(chrono::DateTime::parse_from_rfc3339(&now_rfc3339()).is_ok());
    }

    #[test]
    fn test_stream_clock_extrapolates() {
        let mut clock = StreamClock::new();
        assert_eq!(clock.now_ms(), None);

        let t0 = Instant::now();
        clock.observe_at(1_000, t0);
        assert_eq!(clock.now_at(t0), Some(1_000));
        assert_eq!(clock.now_at(t0 + Duration::from_millis(250)), Some(1_250));

        // Stale timestamps do not move the anchor backwards.
        clock.observe_at(900, t0 + Duration::from_millis(300));
        assert_eq!(clock.now_at(t0 + Duration::from_millis(300)), Some(1_300));
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::new(30);
        assert_eq!(ctrl.interval_ms(), 33);
        assert!(ctrl.should_tick(0));
        assert!(!ctrl.should_tick(10));
        assert!(ctrl.should_tick(33));
        assert!(!ctrl.should_tick(40));
    }

    #[test]
    fn test_latency_meter_window() {
        let mut meter = LatencyMeter::new(2);
        assert_eq!(meter.average_us(), 0);
        meter.record(Duration::from_micros(100));
        meter.record(Duration::from_micros(300));
        assert_eq!(meter.average_us(), 200);
        meter.record(Duration::from_micros(500));
        assert_eq!(meter.len(), 2);
        assert_eq!(meter.average_us(), 400);
    }
}
