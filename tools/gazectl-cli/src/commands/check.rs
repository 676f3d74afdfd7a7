//! Validate configuration and calibration profile.

use std::path::PathBuf;

use gazectl_common::{config_file_path, profile_file_path, AppConfig};
use gazectl_frame_model::CalibrationProfile;

pub fn run(config_path: Option<PathBuf>, profile_path: Option<PathBuf>) -> anyhow::Result<()> {
    println!("gazectl Check");
    println!("{}", "=".repeat(50));

    let mut failures = 0;

    let config_path = config_path.unwrap_or_else(config_file_path);
    let config = if config_path.exists() {
        match AppConfig::load_from(&config_path) {
            Ok(config) => {
                println!("[OK] Config: {}", config_path.display());
                config
            }
            Err(e) => {
                println!("[FAIL] Config: {e}");
                failures += 1;
                AppConfig::default()
            }
        }
    } else {
        println!(
            "[WARN] Config: {} not found, using defaults",
            config_path.display()
        );
        AppConfig::default()
    };

    println!(
        "     screen {}x{}, {} action bindings",
        config.screen.width,
        config.screen.height,
        config
            .actions
            .values()
            .filter(|binding| binding.kind().is_some())
            .count()
    );

    let profile_path = profile_path.unwrap_or_else(profile_file_path);
    if profile_path.exists() {
        match CalibrationProfile::load_for_screen(&profile_path, config.screen) {
            Ok(profile) => {
                println!("[OK] Profile: {}", profile_path.display());
                println!(
                    "     {:?} model, {} anchors, residual {:.1}px, created {}",
                    profile.model,
                    profile.anchors.len(),
                    profile.residual_px,
                    profile.created_at
                );
                if profile.residual_px > config.calibration.max_residual_px {
                    println!(
                        "[WARN] Profile residual exceeds the configured limit of {:.1}px",
                        config.calibration.max_residual_px
                    );
                }
            }
            Err(e) => {
                println!("[FAIL] Profile: {e}");
                failures += 1;
            }
        }
    } else {
        println!(
            "[WARN] Profile: {} not found, run `gazectl calibrate`",
            profile_path.display()
        );
    }

    println!();
    if failures > 0 {
        anyhow::bail!("{failures} check(s) failed");
    }
    println!("gazectl is ready.");
    Ok(())
}
