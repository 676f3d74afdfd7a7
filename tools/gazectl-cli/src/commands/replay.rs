//! Run the pipeline over a recorded landmark stream.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use gazectl_common::{profile_file_path, AppConfig, GazeError};
use gazectl_frame_model::CalibrationProfile;
use gazectl_runtime::{
    telemetry_channel, ActionLogHeader, ActionSink, FrameReplay, FrameRing, GazePipeline,
    JsonlActionSink, Pacing, PipelineControls, ProcessingWorker, TracingSink,
};
use tokio::io::{AsyncWriteExt, BufWriter};

pub struct ReplayArgs {
    pub frames: PathBuf,
    pub profile: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub telemetry: Option<PathBuf>,
    pub realtime: bool,
    pub speed: f64,
}

/// Load the calibration profile. An explicitly requested profile must load;
/// the default one is optional.
pub fn install_profile(
    pipeline: &mut GazePipeline,
    explicit: Option<PathBuf>,
) -> anyhow::Result<Option<PathBuf>> {
    let required = explicit.is_some();
    let path = explicit.unwrap_or_else(profile_file_path);
    if !required && !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "No calibration profile, pointer control disabled"
        );
        return Ok(None);
    }

    match CalibrationProfile::load_for_screen(&path, pipeline.config().screen) {
        Ok(profile) => {
            pipeline.install_profile(profile)?;
            Ok(Some(path))
        }
        Err(e) if required => Err(anyhow::anyhow!("Failed to load profile: {e}")),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unusable calibration profile");
            Ok(None)
        }
    }
}

/// Route stdin lines to the worker: the emergency key stops all output,
/// `resume` lifts a pause, `calibrate` starts the wizard.
///
/// Runs on a plain thread so a pending read never holds up runtime
/// shutdown.
fn spawn_control_reader(controls: Arc<PipelineControls>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            route_control(&controls, &line);
        }
    });
}

fn route_control(controls: &PipelineControls, line: &str) {
    if controls.handle_key(line) {
        return;
    }
    match line.trim() {
        "resume" => controls.request_resume(),
        "calibrate" => controls.request_calibration(),
        "quit" => controls.request_stop(),
        "" => {}
        other => tracing::info!(input = other, "Unknown control input"),
    }
}

pub async fn run(config: AppConfig, args: ReplayArgs) -> anyhow::Result<()> {
    let mut pipeline = GazePipeline::new(config.clone())?;
    let profile = install_profile(&mut pipeline, args.profile)?;

    println!("Replaying {}", args.frames.display());
    match &profile {
        Some(path) => println!("  Profile: {}", path.display()),
        None => println!("  Profile: none (gestures only)"),
    }

    let sink: Box<dyn ActionSink> = match &args.output {
        Some(path) => {
            println!("  Actions: {}", path.display());
            Box::new(JsonlActionSink::create(
                path.clone(),
                &ActionLogHeader::new(config.screen),
            )?)
        }
        None => Box::new(TracingSink),
    };

    let ring = Arc::new(FrameRing::new(config.pipeline.buffer_capacity));
    let (publisher, mut updates) = telemetry_channel(
        config.pipeline.telemetry_capacity,
        config.pipeline.telemetry_hz,
    );
    let mut worker = ProcessingWorker::new(pipeline, ring.clone(), sink).with_telemetry(publisher);
    let controls = worker.controls();

    let telemetry_path = args.telemetry.clone();
    let telemetry_task = tokio::spawn(async move {
        let mut out = match telemetry_path {
            Some(path) => Some(BufWriter::new(tokio::fs::File::create(path).await?)),
            None => None,
        };
        let mut received = 0u64;
        while let Some(update) = updates.recv().await {
            received += 1;
            if let Some(out) = out.as_mut() {
                let mut line = serde_json::to_vec(&update)?;
                line.push(b'\n');
                out.write_all(&line).await?;
            }
        }
        if let Some(out) = out.as_mut() {
            out.flush().await?;
        }
        anyhow::Ok(received)
    });

    let interrupt = {
        let controls = controls.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                controls.request_stop();
            }
        })
    };

    let pacing = if args.realtime {
        println!(
            "  Pacing: realtime x{} (type '{}' + Enter for emergency stop)",
            args.speed,
            controls.emergency_key()
        );
        Pacing::Realtime { speed: args.speed }
    } else {
        Pacing::Backpressure
    };
    if args.realtime {
        spawn_control_reader(controls.clone());
    }

    let replay = FrameReplay::new(&args.frames).with_pacing(pacing);
    let replay_task = {
        let ring = ring.clone();
        tokio::spawn(async move { replay.run(&ring).await })
    };

    let result = worker.run().await;
    // Stop the producer if the worker ended first.
    ring.close();
    let replay_stats = replay_task.await??;
    let stats = worker.stats().clone();
    drop(worker);

    interrupt.abort();
    let telemetry_updates = telemetry_task.await??;

    match result {
        Ok(_) => println!("\nStopped."),
        Err(GazeError::StreamLost { .. }) => println!("\nEnd of stream."),
        Err(e) => return Err(e.into()),
    }

    println!("Frames read: {}", replay_stats.frames);
    if replay_stats.malformed > 0 {
        println!("Malformed lines skipped: {}", replay_stats.malformed);
    }
    println!("Frames processed: {}", stats.frames_processed);
    println!("Frames skipped: {}", stats.frames_skipped);
    println!("Frames dropped: {}", stats.dropped_frames);
    println!("Actions delivered: {}", stats.commands_delivered);
    println!("Actions rejected: {}", stats.actions_rejected);
    println!("Telemetry updates: {telemetry_updates}");
    if stats.sink_errors > 0 {
        println!("Sink errors: {}", stats.sink_errors);
    }

    Ok(())
}
