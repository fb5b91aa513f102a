//! Detector seams.
//!
//! Corner localization and marker decoding live outside this workspace;
//! adapters for a concrete backend implement these traits.

use crate::BoardSize;
use calib_rig_core::GrayImageView;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One decoded fiducial marker, corners in TL, TR, BR, BL order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub id: u32,
    pub corners: [Point2<f64>; 4],
}

/// Sub-pixel chessboard inner-corner detector.
pub trait ChessboardCornerDetector {
    /// Ordered inner corners (row-major, matching [`crate::chessboard_object_points`]),
    /// or `None` when the full board was not found.
    fn detect(&mut self, image: &GrayImageView<'_>, board: BoardSize) -> Option<Vec<Point2<f64>>>;
}

/// Fiducial marker detector.
pub trait MarkerDetector {
    /// Every marker of `dictionary` visible in the image.
    fn detect(&mut self, image: &GrayImageView<'_>, dictionary: &str) -> Vec<DetectedMarker>;
}
