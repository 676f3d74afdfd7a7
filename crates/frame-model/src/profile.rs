//! Calibration profiles: the fitted gaze-space → screen-space transform.
//!
//! A profile is immutable once validated. Recalibration produces a new
//! profile that replaces the old one wholesale.

use std::path::Path;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::{GazeVector, Point2D, ScreenSize};

/// Current on-disk schema version.
pub const PROFILE_VERSION: &str = "1.0";

/// Regression basis used for the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionModel {
    /// `[1, gx, gy]`
    #[default]
    Affine,
    /// `[1, gx, gy, gx*gy, gx^2, gy^2]`
    Quadratic,
}

impl RegressionModel {
    /// Number of coefficients per screen axis.
    pub fn terms(&self) -> usize {
        match self {
            Self::Affine => 3,
            Self::Quadratic => 6,
        }
    }

    /// Evaluate the basis functions for a gaze vector.
    pub fn basis(&self, g: &GazeVector) -> Vec<f64> {
        match self {
            Self::Affine => vec![1.0, g.x, g.y],
            Self::Quadratic => vec![1.0, g.x, g.y, g.x * g.y, g.x * g.x, g.y * g.y],
        }
    }
}

/// One calibration target with its reduced gaze measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    /// Where the user was asked to look.
    pub target: Point2D,
    /// Median of the raw gaze samples collected during the dwell window.
    pub raw: GazeVector,
    /// Sample variance (var_x + var_y) over the dwell window.
    pub variance: f64,
    /// Number of samples collected.
    pub samples: usize,
}

/// A validated calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub version: String,

    /// Screen the profile was fitted for.
    pub screen: ScreenSize,

    pub model: RegressionModel,

    /// Ordered anchors used for the fit.
    pub anchors: Vec<AnchorRecord>,

    /// Coefficients for screen x, one per basis term.
    pub coefficients_x: Vec<f64>,

    /// Coefficients for screen y, one per basis term.
    pub coefficients_y: Vec<f64>,

    /// RMS residual over all anchors (pixels).
    pub residual_px: f64,

    /// Creation time (RFC 3339).
    pub created_at: String,
}

impl CalibrationProfile {
    /// Apply the fitted transform without clamping.
    pub fn apply(&self, gaze: &GazeVector) -> Point2D {
        let basis = self.model.basis(gaze);
        let dot = |coeffs: &[f64]| -> f64 { coeffs.iter().zip(&basis).map(|(c, b)| c * b).sum() };
        Point2D::new(dot(&self.coefficients_x), dot(&self.coefficients_y))
    }

    /// Structural checks applied to profiles read from storage.
    pub fn validate(&self) -> Result<(), String> {
        let terms = self.model.terms();
        if self.coefficients_x.len() != terms || self.coefficients_y.len() != terms {
            return Err(format!(
                "{:?} model needs {terms} coefficients per axis, found {} / {}",
                self.model,
                self.coefficients_x.len(),
                self.coefficients_y.len()
            ));
        }
        if self
            .coefficients_x
            .iter()
            .chain(&self.coefficients_y)
            .any(|c| !c.is_finite())
        {
            return Err("profile contains non-finite coefficients".to_string());
        }
        if self.screen.width == 0 || self.screen.height == 0 {
            return Err("profile screen size is empty".to_string());
        }
        Ok(())
    }

    /// Load a profile from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref().to_path_buf();
        let json = std::fs::read_to_string(&path).map_err(|e| ProfileError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let profile: CalibrationProfile =
            serde_json::from_str(&json).map_err(|e| ProfileError::ParseError {
                path: path.clone(),
                source: e,
            })?;
        profile
            .validate()
            .map_err(|message| ProfileError::ValidationError { message })?;
        Ok(profile)
    }

    /// Load a profile and require it to match the given screen.
    pub fn load_for_screen(
        path: impl AsRef<Path>,
        screen: ScreenSize,
    ) -> Result<Self, ProfileError> {
        let profile = Self::load(path)?;
        if profile.screen != screen {
            return Err(ProfileError::ValidationError {
                message: format!(
                    "profile was fitted for {}x{}, current screen is {}x{}",
                    profile.screen.width, profile.screen.height, screen.width, screen.height
                ),
            });
        }
        Ok(profile)
    }

    /// Save the profile as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProfileError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProfileError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ProfileError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, json).map_err(|e| ProfileError::IoError { path, source: e })
    }
}

/// Named profiles kept as `<name>.json` in one directory, so several users
/// or setups can share a machine.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `name`. Names are limited to letters, digits, `-` and
    /// `_` so they cannot escape the store directory.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, ProfileError> {
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ProfileError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    pub fn save(&self, name: &str, profile: &CalibrationProfile) -> Result<PathBuf, ProfileError> {
        let path = self.path_for(name)?;
        profile.save(&path)?;
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<CalibrationProfile, ProfileError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(ProfileError::NotFound {
                name: name.to_string(),
            });
        }
        CalibrationProfile::load(path)
    }

    /// Stored profile names, sorted. A missing directory is an empty store.
    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ProfileError::IoError {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Remove a stored profile. Returns `false` when it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool, ProfileError> {
        let path = self.path_for(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ProfileError::IoError { path, source: e }),
        }
    }
}

/// Errors that can occur when reading or writing profiles.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid profile: {message}")]
    ValidationError { message: String },

    #[error("Invalid profile name {name:?}: use letters, digits, '-' or '_'")]
    InvalidName { name: String },

    #[error("No stored profile named {name:?}")]
    NotFound { name: String },
}
