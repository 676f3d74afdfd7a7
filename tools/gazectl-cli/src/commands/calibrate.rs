//! Fit and save a calibration profile.

use std::path::PathBuf;
use std::sync::Arc;

use gazectl_common::{profile_file_path, AppConfig};
use gazectl_frame_model::synthetic::SyntheticFace;
use gazectl_frame_model::CalibrationProfile;
use gazectl_processing_core::WizardStatus;
use gazectl_runtime::{
    CalibrationEvent, FrameReplay, FrameRing, GazePipeline, ProcessingWorker, TracingSink,
};

const SYNTHETIC_FRAME_MS: u64 = 33;

pub async fn run(
    config: AppConfig,
    frames: Option<PathBuf>,
    synthetic: bool,
    save: Option<PathBuf>,
    name: Option<String>,
) -> anyhow::Result<()> {
    // Reject a bad name before spending a session on it.
    if let Some(name) = &name {
        super::profiles::store().path_for(name)?;
    }
    let save = save.unwrap_or_else(profile_file_path);
    println!(
        "Calibrating {} points on {}x{}",
        config.calibration.points, config.screen.width, config.screen.height
    );

    let profile = match frames {
        Some(path) => from_recording(config, path, save.clone()).await?,
        None if synthetic => {
            let profile = synthetic_session(&config)?;
            profile
                .save(&save)
                .map_err(|e| anyhow::anyhow!("Failed to save profile: {e}"))?;
            profile
        }
        None => anyhow::bail!(
            "pass --frames <FILE> with a recorded calibration session, or --synthetic"
        ),
    };

    println!();
    println!("Calibration complete:");
    println!("  Model: {:?}", profile.model);
    println!("  Anchors: {}", profile.anchors.len());
    println!("  Residual: {:.1}px", profile.residual_px);
    println!("  Saved to: {}", save.display());
    if let Some(name) = name {
        let stored = super::profiles::store().save(&name, &profile)?;
        println!("  Stored as {name:?}: {}", stored.display());
    }
    Ok(())
}

/// Replay a recorded session through the worker with the wizard active.
async fn from_recording(
    config: AppConfig,
    frames: PathBuf,
    save: PathBuf,
) -> anyhow::Result<CalibrationProfile> {
    let pipeline = GazePipeline::new(config.clone())?;
    let ring = Arc::new(FrameRing::new(config.pipeline.buffer_capacity));
    let mut worker = ProcessingWorker::new(pipeline, ring.clone(), Box::new(TracingSink))
        .with_profile_path(save);
    worker.controls().request_calibration();

    let replay = FrameReplay::new(&frames);
    let producer = {
        let ring = ring.clone();
        tokio::spawn(async move { replay.run(&ring).await })
    };
    // The stream ending is expected here.
    let _ = worker.run().await;
    producer.await??;

    if worker.stats().profiles_saved == 0 {
        anyhow::bail!(
            "calibration did not produce a profile from {} (see log for the rejection reason)",
            frames.display()
        );
    }
    worker
        .pipeline()
        .profile()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("calibrated profile missing after save"))
}

/// Drive the wizard with a synthetic face that looks at each target.
fn synthetic_session(config: &AppConfig) -> anyhow::Result<CalibrationProfile> {
    let screen = config.screen;
    let per_target = (config.calibration.settle_ms + config.calibration.dwell_ms)
        / SYNTHETIC_FRAME_MS
        + 2;
    let limit = per_target * config.calibration.points as u64 * 2 + 10;

    let mut pipeline = GazePipeline::new(config.clone())?;
    pipeline.begin_calibration();

    let mut announced = None;
    for id in 0..limit {
        let face = match pipeline.calibration_target() {
            Some(target) => SyntheticFace::neutral().looking_at(target, screen),
            None => SyntheticFace::neutral(),
        };
        let outcome = pipeline.process_frame(&face.frame(id, id * SYNTHETIC_FRAME_MS));
        match outcome.calibration {
            Some(CalibrationEvent::Progress(WizardStatus::Settling { index, target }))
                if announced != Some(index) =>
            {
                announced = Some(index);
                println!(
                    "  Target {}/{} at ({:.0}, {:.0})",
                    index + 1,
                    config.calibration.points,
                    target.x,
                    target.y
                );
            }
            Some(CalibrationEvent::Completed(profile)) => return Ok(profile),
            Some(CalibrationEvent::Failed(e)) => return Err(e.into()),
            Some(CalibrationEvent::Progress(_)) => {}
            None => anyhow::bail!("calibration was interrupted"),
        }
    }
    anyhow::bail!("calibration did not finish within {limit} frames")
}
