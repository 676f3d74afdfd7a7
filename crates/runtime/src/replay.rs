//! JSONL landmark replay: the producer side of the frame ring.

use std::path::{Path, PathBuf};

use gazectl_common::GazeResult;
use gazectl_frame_model::LandmarkFrame;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

use crate::ring_buffer::FrameRing;

/// How frames are fed into the ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// As fast as the worker consumes; nothing is dropped.
    Backpressure,
    /// Follow frame timestamps, scaled by `speed`. Behaves like a live
    /// camera: the ring drops the oldest frames if the worker lags.
    Realtime { speed: f64 },
}

impl Pacing {
    /// Replace a zero, negative or non-finite realtime speed with 1.0.
    pub fn sanitized(self) -> Self {
        match self {
            Self::Realtime { speed } if !(speed.is_finite() && speed > 0.0) => {
                tracing::warn!(speed, "Invalid replay speed, using 1.0");
                Self::Realtime { speed: 1.0 }
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub frames: u64,
    /// Lines that failed to parse and were skipped.
    pub malformed: u64,
}

struct Feeder<'a> {
    ring: &'a FrameRing,
    pacing: Pacing,
    origin: Option<(u64, Instant)>,
}

impl<'a> Feeder<'a> {
    fn new(ring: &'a FrameRing, pacing: Pacing) -> Self {
        Self {
            ring,
            pacing: pacing.sanitized(),
            origin: None,
        }
    }

    /// Returns `false` once the ring refuses frames.
    async fn feed(&mut self, frame: LandmarkFrame) -> bool {
        match self.pacing {
            Pacing::Backpressure => self.ring.push_wait(frame).await,
            Pacing::Realtime { speed } => {
                let (first_ts, started) =
                    *self.origin.get_or_insert((frame.timestamp_ms, Instant::now()));
                let offset_ms = frame.timestamp_ms.saturating_sub(first_ts) as f64 / speed;
                let due = started + std::time::Duration::from_secs_f64(offset_ms / 1000.0);
                tokio::time::sleep_until(due).await;
                self.ring.push(frame)
            }
        }
    }
}

/// Feed in-memory frames into the ring, then close it.
pub async fn feed_frames(
    frames: impl IntoIterator<Item = LandmarkFrame>,
    ring: &FrameRing,
    pacing: Pacing,
) -> u64 {
    let mut feeder = Feeder::new(ring, pacing);
    let mut sent = 0;
    for frame in frames {
        if !feeder.feed(frame).await {
            break;
        }
        sent += 1;
    }
    ring.close();
    sent
}

/// Replays a recorded landmark stream from a JSONL file.
///
/// Blank lines and `#` comment lines are ignored. Malformed lines are
/// logged and skipped.
#[derive(Debug, Clone)]
pub struct FrameReplay {
    path: PathBuf,
    pacing: Pacing,
}

impl FrameReplay {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pacing: Pacing::Backpressure,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing.sanitized();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the file into `ring`. The ring is closed when this returns,
    /// whether or not reading succeeded.
    pub async fn run(&self, ring: &FrameRing) -> GazeResult<ReplayStats> {
        let result = self.stream(ring).await;
        ring.close();
        result
    }

    async fn stream(&self, ring: &FrameRing) -> GazeResult<ReplayStats> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut feeder = Feeder::new(ring, self.pacing);
        let mut stats = ReplayStats::default();
        let mut line_no = 0u64;

        tracing::info!(path = %self.path.display(), pacing = ?self.pacing, "Replaying landmarks");
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let frame: LandmarkFrame = match serde_json::from_str(line) {
                Ok(frame) => frame,
                Err(e) => {
                    stats.malformed += 1;
                    tracing::warn!(line = line_no, error = %e, "Skipping malformed frame");
                    continue;
                }
            };
            if !feeder.feed(frame).await {
                tracing::debug!("Frame ring closed, replay stopped early");
                break;
            }
            stats.frames += 1;
        }

        tracing::info!(frames = stats.frames, malformed = stats.malformed, "Replay finished");
        Ok(stats)
    }
}
