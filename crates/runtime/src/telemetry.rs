//! Telemetry publication to the rendering collaborator.
//!
//! Updates go through a bounded queue with `try_send`: if the consumer lags,
//! updates are dropped rather than stalling the worker.

use gazectl_common::RateController;
use gazectl_frame_model::{TelemetryUpdate, TimestampMs};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Create a publisher and the receiving end of its queue.
pub fn telemetry_channel(
    capacity: usize,
    max_hz: u32,
) -> (TelemetryPublisher, mpsc::Receiver<TelemetryUpdate>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TelemetryPublisher::new(tx, max_hz), rx)
}

/// Rate-limited, non-blocking telemetry sender.
#[derive(Debug)]
pub struct TelemetryPublisher {
    tx: mpsc::Sender<TelemetryUpdate>,
    rate: RateController,
    sent: u64,
    dropped: u64,
    closed: bool,
}

impl TelemetryPublisher {
    pub fn new(tx: mpsc::Sender<TelemetryUpdate>, max_hz: u32) -> Self {
        Self {
            tx,
            rate: RateController::new(max_hz),
            sent: 0,
            dropped: 0,
            closed: false,
        }
    }

    /// Publish an update if the rate allows it. `force` bypasses the rate
    /// limit for updates that must not be skipped, such as state changes or
    /// rejected actions.
    ///
    /// Returns whether the update was queued.
    pub fn publish(&mut self, update: TelemetryUpdate, now_ms: TimestampMs, force: bool) -> bool {
        if self.closed {
            return false;
        }
        let due = self.rate.should_tick(now_ms);
        if !due && !force {
            return false;
        }

        match self.tx.try_send(update) {
            Ok(()) => {
                self.sent += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::trace!(dropped = self.dropped, "Telemetry queue full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Telemetry receiver closed");
                self.closed = true;
                false
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Updates lost to a full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazectl_frame_model::PipelineState;

    fn update(t: TimestampMs) -> TelemetryUpdate {
        TelemetryUpdate {
            timestamp_ms: t,
            frame_id: Some(t / 33),
            cursor: None,
            face_detected: true,
            state: PipelineState::Active,
            latency_us: 100,
            dropped_frames: 0,
            rejections: vec![],
        }
    }

    #[test]
    fn test_rate_limit_and_force() {
        let (mut publisher, mut rx) = telemetry_channel(16, 10);
        assert!(publisher.publish(update(0), 0, false));
        assert!(!publisher.publish(update(33), 33, false));
        assert!(publisher.publish(update(66), 66, true));
        assert!(publisher.publish(update(100), 100, false));
        assert_eq!(publisher.sent(), 3);

        let mut seen = Vec::new();
        while let Ok(u) = rx.try_recv() {
            seen.push(u.timestamp_ms);
        }
        assert_eq!(seen, vec![0, 66, 100]);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (mut publisher, _rx) = telemetry_channel(1, 1000);
        assert!(publisher.publish(update(0), 0, false));
        assert!(!publisher.publish(update(10), 10, false));
        assert_eq!(publisher.dropped(), 1);
    }

    #[test]
    fn test_closed_receiver_is_tolerated() {
        let (mut publisher, rx) = telemetry_channel(4, 1000);
        drop(rx);
        assert!(!publisher.publish(update(0), 0, true));
        assert!(!publisher.publish(update(10), 10, true));
        assert_eq!(publisher.sent(), 0);
    }
}
