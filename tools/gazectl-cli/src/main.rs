//! gazectl CLI: hands-free pointer control from face landmarks.
//!
//! Usage:
//!   gazectl replay <FRAMES>       Run the pipeline over a recorded landmark stream
//!   gazectl calibrate             Fit and save a calibration profile
//!   gazectl synth <OUTPUT>        Write a synthetic landmark session
//!   gazectl profiles <ACTION>     List, activate or delete named profiles
//!   gazectl check                 Validate configuration and profile
//!   gazectl init-config           Write the default configuration
//!   gazectl info                  Show the effective configuration

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use gazectl_common::{config_file_path, AppConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "gazectl",
    about = "Gaze and facial-gesture pointer control",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a recorded landmark stream
    Replay {
        /// Landmark frames (JSONL, one frame per line)
        frames: PathBuf,

        /// Calibration profile (defaults to the saved profile)
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Use a named profile from the profile store
        #[arg(long, conflicts_with = "profile")]
        name: Option<String>,

        /// Write action commands to this JSONL file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write telemetry updates to this JSONL file
        #[arg(long)]
        telemetry: Option<PathBuf>,

        /// Pace frames by their timestamps instead of as fast as possible
        #[arg(long)]
        realtime: bool,

        /// Playback speed multiplier for --realtime
        #[arg(long, default_value = "1.0")]
        speed: f64,
    },

    /// Fit a calibration profile and save it
    Calibrate {
        /// Recorded calibration session (JSONL); omit with --synthetic
        #[arg(short, long, conflicts_with = "synthetic")]
        frames: Option<PathBuf>,

        /// Drive the wizard with a synthetic face that follows the targets
        #[arg(long)]
        synthetic: bool,

        /// Where to save the profile (defaults to the XDG data location)
        #[arg(short, long)]
        save: Option<PathBuf>,

        /// Also keep the profile in the profile store under this name
        #[arg(long)]
        name: Option<String>,
    },

    /// Manage named calibration profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Write a synthetic landmark session for demos and testing
    Synth {
        /// Output JSONL file
        output: PathBuf,

        /// Frame rate of the generated stream
        #[arg(long, default_value = "30")]
        fps: u32,
    },

    /// Validate the configuration and calibration profile
    Check {
        /// Calibration profile to check (defaults to the saved profile)
        #[arg(short, long)]
        profile: Option<PathBuf>,
    },

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Info,
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List stored profiles
    List,

    /// Make a stored profile the active one
    Use { name: String },

    /// Delete a stored profile
    Delete { name: String },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}

fn init_logging(config: &AppConfig, verbose: bool) -> anyhow::Result<()> {
    let mut logging = config.logging.clone();
    if verbose {
        logging.level = "debug".to_string();
    }
    gazectl_common::logging::init_logging(&logging)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();

    // These two must work even when the configuration file is broken.
    match &cli.command {
        Commands::Check { profile } => {
            init_logging(&AppConfig::default(), cli.verbose)?;
            return commands::check::run(config_path, profile.clone());
        }
        Commands::InitConfig { force } => {
            init_logging(&AppConfig::default(), cli.verbose)?;
            let path = config_path.unwrap_or_else(config_file_path);
            return commands::init::run(path, *force);
        }
        _ => {}
    }

    let config = load_config(config_path.as_deref())?;
    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Replay {
            frames,
            profile,
            name,
            output,
            telemetry,
            realtime,
            speed,
        } => {
            let profile = match name {
                Some(name) => Some(commands::profiles::resolve(&name)?),
                None => profile,
            };
            commands::replay::run(
                config,
                commands::replay::ReplayArgs {
                    frames,
                    profile,
                    output,
                    telemetry,
                    realtime,
                    speed,
                },
            )
            .await
        }
        Commands::Calibrate {
            frames,
            synthetic,
            save,
            name,
        } => commands::calibrate::run(config, frames, synthetic, save, name).await,
        Commands::Profiles { action } => match action {
            ProfileAction::List => commands::profiles::list(&config),
            ProfileAction::Use { name } => commands::profiles::activate(&config, &name),
            ProfileAction::Delete { name } => commands::profiles::delete(&name),
        },
        Commands::Synth { output, fps } => commands::synth::run(&config, output, fps),
        Commands::Info => commands::info::run(&config, config_path),
        Commands::Check { .. } | Commands::InitConfig { .. } => Ok(()),
    }
}
