//! Camera intrinsic and stereo calibration driven by settings files.
//!
//! This crate ties the workspace together:
//! - re-exports of [`core`] (correspondences, reconciliation, residuals) and
//!   [`pattern`] (chessboards, marker maps, the box-rig lattice),
//! - settings loading and validation ([`settings`]),
//! - the solver, frame and display seams ([`solver`], [`io`]),
//! - the mode-driven run ([`orchestrator`]) and its JSON reports ([`report`]).
//!
//! Detection, optimization, capture and display are supplied by the caller
//! through traits; nothing here links against a vision backend.
//!
//! ## Quickstart
//!
//! ```no_run
//! use calib_rig::settings::{load_settings, validate};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = validate(load_settings("calibration.json")?)?;
//! println!("{} with {}", settings.mode, settings.pattern.kind());
//! # Ok(())
//! # }
//! ```

pub use calib_rig_core as core;
pub use calib_rig_pattern as pattern;

pub mod flags;
pub mod io;
pub mod orchestrator;
pub mod report;
pub mod settings;
pub mod solver;

pub use flags::{build_flag_mask, CalibFlags};
pub use io::{AnnotationLabel, DisplaySink, FrameSource, OperatorKey, Overlay, WaitPolicy};
pub use orchestrator::{
    run_calibration, CalibrationResult, CalibrationStatus, Collaborators, RunError,
};
pub use settings::{validate, Mode, Settings, SettingsFile, ValidationError};
pub use solver::{CalibrationSolver, SolverError};
