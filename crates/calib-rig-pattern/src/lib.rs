//! Calibration pattern models and correspondence building.
//!
//! Supported patterns:
//! - planar chessboard (grid generated from board size and square size),
//! - a single planar ArUco marker map,
//! - an ArUco "box rig": three orthogonal marker maps whose local
//!   coordinates are normalized into one shared frame and integer lattice.
//!
//! Corner and marker *detection* is not done here. Callers plug in their
//! own detectors through [`ChessboardCornerDetector`] and [`MarkerDetector`];
//! this crate turns their output into ordered 2D↔3D correspondences.

mod builder;
mod chessboard;
mod detector;
mod lattice;
mod marker_map;
mod pattern;
mod plane;

pub use builder::{
    BuilderError, CorrespondenceBuilder, ImageCorrespondences, MarkerAnnotation,
    PatternAnnotations, PatternDetector,
};
pub use chessboard::{chessboard_object_points, BoardSize};
pub use detector::{ChessboardCornerDetector, DetectedMarker, MarkerDetector};
pub use lattice::{Lattice, LatticeError};
pub use marker_map::{MapMarker, MarkerMap, MarkerMapError, MarkerMapSpec};
pub use pattern::{PatternConfig, PatternKind, RigFace};
pub use plane::{Plane, PlaneParseError};

pub use calib_rig_core::{Correspondence, LatticePoint};
