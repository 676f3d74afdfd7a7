//! Show the effective configuration.

use std::path::PathBuf;

use gazectl_common::{config_file_path, profile_file_path, AppConfig};

pub fn run(config: &AppConfig, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config_path = config_path.unwrap_or_else(config_file_path);
    println!("Config: {}", config_path.display());
    println!("Profile: {}", profile_file_path().display());
    println!();

    println!("Screen: {}x{}", config.screen.width, config.screen.height);
    println!();

    let g = &config.gaze;
    println!("Gaze:");
    println!("  Smoothing factor: {}", g.smoothing_factor);
    println!(
        "  Kalman: {} (process {}, measurement {})",
        g.use_kalman, g.kalman_process_noise, g.kalman_measurement_noise
    );
    println!("  Dead zone: {}px", g.dead_zone_radius);
    println!(
        "  Acceleration: exponent {} x{}",
        g.acceleration_curve, g.acceleration_multiplier
    );
    println!("  Eye dominance: {:?}", g.eye_dominance);
    println!();

    let e = &config.expressions;
    println!("Expressions:");
    println!(
        "  Blink: threshold {}, cooldown {}ms, long at {}ms",
        e.blink_threshold, e.blink_cooldown_ms, e.long_blink_ms
    );
    println!(
        "  Thresholds: eyebrow {}, smile {}, jaw {}",
        e.eyebrow_threshold, e.smile_threshold, e.jaw_threshold
    );
    println!(
        "  Baseline: {} frames, debounce {} frames",
        e.baseline_frames, e.debounce_frames
    );
    println!();

    let s = &config.safety;
    println!("Safety:");
    println!("  Max clicks/s: {}", s.max_clicks_per_second);
    println!("  Auto-pause after: {}ms without a face", s.auto_pause_no_face_ms);
    println!("  Emergency key: {}", s.emergency_key);
    println!(
        "  Cooldowns: click {}ms, scroll {}ms, key {}ms",
        s.action_cooldowns.click_ms, s.action_cooldowns.scroll_ms, s.action_cooldowns.key_ms
    );
    if !s.require_confirmation.is_empty() {
        let kinds: Vec<_> = s.require_confirmation.iter().map(|k| k.as_str()).collect();
        println!(
            "  Confirm by repeating within {}ms: {}",
            s.confirmation_timeout_ms,
            kinds.join(", ")
        );
    }
    println!();

    println!("Actions:");
    for (channel, binding) in &config.actions {
        let action = binding
            .kind()
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|| "none".to_string());
        println!("  {:<16} {}", channel.as_str(), action);
    }

    Ok(())
}
