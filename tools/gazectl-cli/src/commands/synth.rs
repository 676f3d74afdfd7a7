//! Write a scripted synthetic landmark session.

use std::path::PathBuf;

use gazectl_common::AppConfig;
use gazectl_frame_model::synthetic::SyntheticFace;
use gazectl_frame_model::{serialize_frames, LandmarkFrame, Point2D, ScreenSize};

struct Session {
    frames: Vec<LandmarkFrame>,
    frame_ms: f64,
    screen: ScreenSize,
}

impl Session {
    fn new(fps: u32, screen: ScreenSize) -> Self {
        Self {
            frames: Vec::new(),
            frame_ms: 1000.0 / fps.max(1) as f64,
            screen,
        }
    }

    fn next_timestamp(&self) -> u64 {
        (self.frames.len() as f64 * self.frame_ms).round() as u64
    }

    fn frame_count(&self, ms: u64) -> usize {
        ((ms as f64 / self.frame_ms).round() as usize).max(1)
    }

    fn hold(&mut self, face: &SyntheticFace, ms: u64) -> &mut Self {
        for _ in 0..self.frame_count(ms) {
            let id = self.frames.len() as u64;
            let t = self.next_timestamp();
            self.frames.push(face.frame(id, t));
        }
        self
    }

    fn absent(&mut self, ms: u64) -> &mut Self {
        for _ in 0..self.frame_count(ms) {
            let id = self.frames.len() as u64;
            let t = self.next_timestamp();
            self.frames.push(LandmarkFrame::no_face(id, t));
        }
        self
    }

    /// Move the gaze linearly from `from` to `to` over `ms`.
    fn sweep(&mut self, from: Point2D, to: Point2D, ms: u64) -> &mut Self {
        let n = self.frame_count(ms);
        for i in 0..n {
            let p = Point2D::lerp(&from, &to, (i + 1) as f64 / n as f64);
            let face = SyntheticFace::neutral().looking_at(p, self.screen);
            self.hold(&face, 0);
        }
        self
    }
}

pub fn run(config: &AppConfig, output: PathBuf, fps: u32) -> anyhow::Result<()> {
    let screen = config.screen;
    let w = screen.width as f64;
    let h = screen.height as f64;
    let centre = screen.center();
    let look = |p: Point2D| SyntheticFace::neutral().looking_at(p, screen);
    let corner = Point2D::new(w * 0.25, h * 0.25);

    let mut session = Session::new(fps, screen);
    session
        // Neutral face for the expression baseline.
        .hold(&look(centre), 2000)
        .sweep(centre, Point2D::new(w * 0.9, h * 0.1), 1000)
        .sweep(Point2D::new(w * 0.9, h * 0.1), Point2D::new(w * 0.9, h * 0.9), 1000)
        .sweep(Point2D::new(w * 0.9, h * 0.9), corner, 1000)
        .hold(&look(corner), 1000)
        // Short blink: left click.
        .hold(&look(corner).eyes(0.0, 0.0), 100)
        .hold(&look(corner), 1000)
        // Long blink: right click.
        .hold(&look(corner).eyes(0.0, 0.0), 600)
        .hold(&look(corner), 1000)
        // Left wink: scroll up.
        .hold(&look(corner).eyes(0.0, 1.0), 150)
        .hold(&look(corner), 1000)
        .hold(&look(corner).brow(0.4), 500)
        .hold(&look(corner), 1000)
        .hold(&look(corner).jaw(0.3), 500)
        .hold(&look(corner), 1000)
        // Smile toggles pointer mode; a second smile toggles it back.
        .hold(&look(corner).smile(0.5), 500)
        .hold(&look(centre), 1000)
        .hold(&look(centre).smile(0.5), 500)
        .hold(&look(centre), 1000)
        // User walks away long enough to trigger auto-pause, then returns.
        .absent(3000)
        .hold(&look(centre), 1500);

    let frames = session.frames;
    let jsonl = serialize_frames(&frames)?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output, jsonl + "\n")?;

    let duration_ms = frames.last().map(|f| f.timestamp_ms).unwrap_or(0);
    println!(
        "Wrote {} frames ({:.1}s at {} fps) to {}",
        frames.len(),
        duration_ms as f64 / 1000.0,
        fps,
        output.display()
    );
    println!("Replay with: gazectl replay {}", output.display());
    Ok(())
}
