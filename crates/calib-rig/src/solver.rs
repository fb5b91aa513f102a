//! Nonlinear solver seam.
//!
//! The camera model is OpenCV's: a 3×3 camera matrix and up to eight
//! rational-model distortion coefficients. Adapters for a concrete
//! optimizer implement [`CalibrationSolver`].

use crate::flags::CalibFlags;
use calib_rig_core::{all_finite, CameraIntrinsics, ImageSize, ViewPose};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("degenerate input: {0}")]
    Degenerate(String),
    #[error("solver did not converge: {0}")]
    NotConverged(String),
    #[error("solver backend error: {0}")]
    Backend(String),
}

/// Single-camera calibration input.
#[derive(Clone, Debug, PartialEq)]
pub struct IntrinsicProblem {
    pub image_size: ImageSize,
    /// One list per image; same length as `image_points`.
    pub object_points: Vec<Vec<Point3<f64>>>,
    pub image_points: Vec<Vec<Point2<f64>>>,
    /// Starting point; only honoured with `USE_INTRINSIC_GUESS`.
    pub initial: CameraIntrinsics,
    /// `fx / fy` held fixed when `FIX_ASPECT_RATIO` is set.
    pub aspect_ratio: Option<f64>,
    pub flags: CalibFlags,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntrinsicSolution {
    pub intrinsics: CameraIntrinsics,
    /// One pose per input image, in input order.
    pub poses: Vec<ViewPose>,
    /// RMS reprojection error as reported by the solver.
    pub rms: f64,
}

/// Relative pose estimation of a camera pair.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoProblem {
    pub image_size: ImageSize,
    pub object_points: Vec<Vec<Point3<f64>>>,
    pub left_points: Vec<Vec<Point2<f64>>>,
    pub right_points: Vec<Vec<Point2<f64>>>,
    pub left: CameraIntrinsics,
    pub right: CameraIntrinsics,
    pub flags: CalibFlags,
}

/// Pose of the right camera relative to the left one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoSolution {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
    pub rms: f64,
}

impl StereoSolution {
    pub fn is_finite(&self) -> bool {
        all_finite(
            self.rotation
                .iter()
                .chain(self.translation.iter())
                .chain(self.essential.iter())
                .chain(self.fundamental.iter()),
        ) && self.rms.is_finite()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RectifyProblem {
    pub image_size: ImageSize,
    pub left: CameraIntrinsics,
    pub right: CameraIntrinsics,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub flags: CalibFlags,
    /// Free scaling: 0 keeps only valid pixels, 1 keeps every source pixel.
    pub alpha: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectification {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    /// Disparity-to-depth mapping.
    pub q: Matrix4<f64>,
}

impl Rectification {
    pub fn is_finite(&self) -> bool {
        all_finite(
            self.r1
                .iter()
                .chain(self.r2.iter())
                .chain(self.p1.iter())
                .chain(self.p2.iter())
                .chain(self.q.iter()),
        )
    }
}

pub trait CalibrationSolver {
    fn calibrate_camera(&self, problem: &IntrinsicProblem)
        -> Result<IntrinsicSolution, SolverError>;

    fn stereo_calibrate(&self, problem: &StereoProblem) -> Result<StereoSolution, SolverError>;

    fn stereo_rectify(&self, problem: &RectifyProblem) -> Result<Rectification, SolverError>;
}
