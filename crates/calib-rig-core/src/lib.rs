//! Core types and utilities for calib-rig.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete detector, solver or image backend. It provides:
//! - 2D↔3D correspondences grouped per image and per view,
//! - the integer lattice key used to compare object points exactly,
//! - cross-view reconciliation for stereo calibration,
//! - reprojection residuals for the OpenCV-style pinhole + distortion model.

mod camera;
mod correspondence;
mod image;
mod logger;
mod reconcile;
mod reprojection;

pub use camera::{all_finite, CameraIntrinsics, ImageSize, ViewPose};
pub use correspondence::{Correspondence, LatticePoint, ViewCorrespondences};
pub use image::{GrayImage, GrayImageView};
pub use reconcile::{reconcile, reconcile_image, ReconcileOutcome, ReconcileStats};
pub use reprojection::{project_point, reprojection_errors, ReprojectionError, ReprojectionErrors};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
