//! Manage named calibration profiles.

use std::path::PathBuf;

use gazectl_common::{profile_file_path, profiles_dir, AppConfig};
use gazectl_frame_model::{CalibrationProfile, ProfileStore};

pub fn store() -> ProfileStore {
    ProfileStore::new(profiles_dir())
}

/// Path of a stored profile, which must exist.
pub fn resolve(name: &str) -> anyhow::Result<PathBuf> {
    let path = store().path_for(name)?;
    if !path.exists() {
        anyhow::bail!("No stored profile named {name:?} (see `gazectl profiles list`)");
    }
    Ok(path)
}

pub fn list(config: &AppConfig) -> anyhow::Result<()> {
    let store = store();
    let names = store.list()?;
    println!("Profiles in {}", store.dir().display());
    if names.is_empty() {
        println!("  (none, save one with `gazectl calibrate --name <NAME>`)");
        return Ok(());
    }
    for name in names {
        match store.load(&name) {
            Ok(profile) => {
                let fits = if profile.screen == config.screen {
                    ""
                } else {
                    "  [other screen]"
                };
                println!(
                    "  {:<20} {}x{} {:?}, residual {:.1}px, created {}{}",
                    name,
                    profile.screen.width,
                    profile.screen.height,
                    profile.model,
                    profile.residual_px,
                    profile.created_at,
                    fits
                );
            }
            Err(e) => println!("  {name:<20} unreadable: {e}"),
        }
    }
    Ok(())
}

/// Make a stored profile the one loaded at startup.
pub fn activate(config: &AppConfig, name: &str) -> anyhow::Result<()> {
    let profile = CalibrationProfile::load_for_screen(resolve(name)?, config.screen)?;
    let active = profile_file_path();
    profile.save(&active)?;
    tracing::info!(name, path = %active.display(), "Activated calibration profile");
    println!("Profile {name:?} is now active ({})", active.display());
    Ok(())
}

pub fn delete(name: &str) -> anyhow::Result<()> {
    if store().delete(name)? {
        println!("Deleted profile {name:?}");
        Ok(())
    } else {
        anyhow::bail!("No stored profile named {name:?}")
    }
}
