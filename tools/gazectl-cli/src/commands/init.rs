//! Write the default configuration file.

use std::path::PathBuf;

use gazectl_common::AppConfig;

pub fn run(path: PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    AppConfig::default()
        .save_to(&path)
        .map_err(|e| anyhow::anyhow!("Failed to write configuration: {e}"))?;

    println!("Configuration written to {}", path.display());
    println!();
    println!("Sections:");
    println!("  screen        target display size in pixels");
    println!("  gaze          smoothing, Kalman filter, dead zone, acceleration");
    println!("  expressions   blink/gesture thresholds, cooldowns, baseline");
    println!("  safety        click rate limit, auto-pause, emergency key");
    println!("  calibration   target layout, dwell timing, acceptance limits");
    println!("  pipeline      buffer and telemetry sizing");
    println!("  actions       gesture -> action bindings");
    println!("  logging       level, JSON output, log file");

    Ok(())
}
