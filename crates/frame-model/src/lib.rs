//! gazectl Frame Model
//!
//! Defines the data contracts exchanged by the gaze-to-action pipeline:
//! - **Landmarks:** Per-frame face/iris detector output (JSONL stream)
//! - **Gestures:** Raw and confirmed facial gesture classifications
//! - **Actions:** Outgoing control commands and their configured bindings
//! - **Profiles:** Fitted calibration transforms and their persistence
//! - **Telemetry:** Snapshots pushed to the rendering collaborator
//!
//! Screen coordinates are physical pixels; landmark coordinates are
//! normalized to the camera image.

pub mod action;
pub mod geometry;
pub mod gesture;
pub mod landmark;
pub mod profile;
pub mod synthetic;
pub mod telemetry;

pub use action::*;
pub use geometry::*;
pub use gesture::*;
pub use landmark::*;
pub use profile::*;
pub use telemetry::*;
