//! gazectl Runtime
//!
//! Runs the processing chain against a live or recorded landmark stream:
//!
//! - **Ring buffer:** bounded, drop-oldest hand-off from the detector
//! - **Pipeline:** per-frame orchestration of every processing stage
//! - **Worker:** the single async consumer that owns all pipeline state
//! - **Sinks:** synchronous delivery of action commands
//! - **Telemetry:** throttled, non-blocking snapshots for the UI
//! - **Replay:** JSONL landmark streams as a frame source

pub mod controls;
pub mod pipeline;
pub mod replay;
pub mod ring_buffer;
pub mod sink;
pub mod telemetry;
pub mod worker;

pub use controls::PipelineControls;
pub use pipeline::{CalibrationEvent, FrameOutcome, GazePipeline};
pub use replay::{feed_frames, FrameReplay, Pacing, ReplayStats};
pub use ring_buffer::{FrameRing, Pop};
pub use sink::{
    read_action_log, ActionLogHeader, ActionSink, JsonlActionSink, RecordingSink, TracingSink,
};
pub use telemetry::{telemetry_channel, TelemetryPublisher};
pub use worker::{ProcessingWorker, WorkerStats};
