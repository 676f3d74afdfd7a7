//! The processing worker: drains the frame buffer and drives the pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gazectl_common::{GazeError, GazeResult, LatencyMeter, StreamClock};
use gazectl_frame_model::{CalibrationProfile, LandmarkFrame};
use serde::Serialize;

use crate::controls::PipelineControls;
use crate::pipeline::{CalibrationEvent, GazePipeline};
use crate::ring_buffer::{FrameRing, Pop};
use crate::sink::ActionSink;
use crate::telemetry::TelemetryPublisher;

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub frames_processed: u64,
    /// Frames rejected as malformed or out of order.
    pub frames_skipped: u64,
    pub commands_delivered: u64,
    pub actions_rejected: u64,
    pub sink_errors: u64,
    /// Frames the buffer discarded before the worker saw them.
    pub dropped_frames: u64,
    pub profiles_saved: u64,
}

/// Single consumer of the frame ring. Owns the pipeline and the sink.
pub struct ProcessingWorker {
    pipeline: GazePipeline,
    ring: Arc<FrameRing>,
    sink: Box<dyn ActionSink>,
    telemetry: Option<TelemetryPublisher>,
    controls: Arc<PipelineControls>,
    clock: StreamClock,
    latency: LatencyMeter,
    idle_poll: Duration,
    profile_path: Option<PathBuf>,
    stats: WorkerStats,
}

impl ProcessingWorker {
    pub fn new(pipeline: GazePipeline, ring: Arc<FrameRing>, sink: Box<dyn ActionSink>) -> Self {
        let controls = PipelineControls::new(pipeline.config().safety.emergency_key.clone());
        let idle_poll = Duration::from_millis(pipeline.config().pipeline.idle_poll_ms.max(1));
        Self {
            pipeline,
            ring,
            sink,
            telemetry: None,
            controls,
            clock: StreamClock::new(),
            latency: LatencyMeter::default(),
            idle_poll,
            profile_path: None,
            stats: WorkerStats::default(),
        }
    }

    pub fn with_telemetry(mut self, publisher: TelemetryPublisher) -> Self {
        self.telemetry = Some(publisher);
        self
    }

    /// Save profiles produced by calibration runs to `path`.
    pub fn with_profile_path(mut self, path: PathBuf) -> Self {
        self.profile_path = Some(path);
        self
    }

    /// Control flags for this worker.
    pub fn controls(&self) -> Arc<PipelineControls> {
        self.controls.clone()
    }

    pub fn pipeline(&self) -> &GazePipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut GazePipeline {
        &mut self.pipeline
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Run until a stop is requested or the source hangs up.
    ///
    /// A stop request returns `Ok`; a closed and drained buffer returns
    /// [`GazeError::StreamLost`]. Counters remain available through
    /// [`stats`](Self::stats) either way.
    pub async fn run(&mut self) -> GazeResult<WorkerStats> {
        tracing::info!(
            sink = %self.sink.name(),
            buffer = self.ring.capacity(),
            calibrated = self.pipeline.is_calibrated(),
            "Processing worker started"
        );

        let result = loop {
            self.apply_controls();
            if self.controls.stop_requested() {
                break Ok(());
            }

            match self.ring.pop_timeout(self.idle_poll).await {
                Pop::Frame(frame) => self.handle_frame(&frame),
                Pop::Idle => self.handle_idle(),
                Pop::Closed => break Err(GazeError::stream_lost("landmark source closed")),
            }
        };

        if let Err(e) = self.sink.flush() {
            tracing::warn!(error = %e, "Failed to flush action sink");
        }
        self.stats.dropped_frames = self.ring.dropped();
        tracing::info!(
            frames = self.stats.frames_processed,
            commands = self.stats.commands_delivered,
            rejected = self.stats.actions_rejected,
            dropped = self.stats.dropped_frames,
            "Processing worker stopped"
        );

        result.map(|()| self.stats.clone())
    }

    fn apply_controls(&mut self) {
        let mut changed = false;
        if self.controls.take_emergency() {
            changed |= self.pipeline.emergency_stop().is_some();
        }
        if self.controls.take_resume() {
            changed |= self.pipeline.resume().is_some();
        }
        if self.controls.take_calibration() {
            self.pipeline.begin_calibration();
            changed = true;
        }
        if changed {
            self.publish_snapshot();
        }
    }

    fn handle_frame(&mut self, frame: &LandmarkFrame) {
        self.clock.observe(frame.timestamp_ms);
        let started = Instant::now();
        let outcome = self.pipeline.process_frame(frame);

        for command in &outcome.commands {
            match self.sink.deliver(command) {
                Ok(()) => self.stats.commands_delivered += 1,
                Err(e) => {
                    self.stats.sink_errors += 1;
                    tracing::warn!(
                        error = %e,
                        action = command.kind.as_str(),
                        "Action delivery failed"
                    );
                }
            }
        }
        self.latency.record(started.elapsed());

        self.stats.frames_processed += 1;
        self.stats.actions_rejected += outcome.rejections.len() as u64;
        if let Some(e) = &outcome.error {
            self.stats.frames_skipped += 1;
            tracing::debug!(frame_id = frame.frame_id, error = %e, "Frame skipped");
        }
        if let Some(CalibrationEvent::Completed(profile)) = &outcome.calibration {
            self.persist_profile(profile);
        }

        if let Some(telemetry) = self.telemetry.as_mut() {
            let update = outcome.telemetry(self.latency.average_us(), self.ring.dropped());
            telemetry.publish(update, outcome.timestamp_ms, outcome.is_notable());
        }
    }

    fn handle_idle(&mut self) {
        let Some(now) = self.clock.now_ms() else {
            return;
        };
        if self.pipeline.tick(now).is_some() {
            self.publish_snapshot();
        }
    }

    fn publish_snapshot(&mut self) {
        let Some(telemetry) = self.telemetry.as_mut() else {
            return;
        };
        let now = self.clock.now_ms().unwrap_or(0);
        let update = self
            .pipeline
            .snapshot(now, self.latency.average_us(), self.ring.dropped());
        telemetry.publish(update, now, true);
    }

    fn persist_profile(&mut self, profile: &CalibrationProfile) {
        let Some(path) = &self.profile_path else {
            return;
        };
        match profile.save(path) {
            Ok(()) => {
                self.stats.profiles_saved += 1;
                tracing::info!(path = %path.display(), "Calibration profile saved");
            }
            Err(e) => tracing::error!(error = %e, "Failed to save calibration profile"),
        }
    }
}
