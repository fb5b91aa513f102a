//! Camera model values exchanged with the external solver.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Image dimensions in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Pinhole camera matrix plus OpenCV-ordered distortion coefficients
/// `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub camera_matrix: Matrix3<f64>,
    #[serde(rename = "distortion_coefficients", alias = "distortion")]
    pub distortion: Vec<f64>,
}

impl CameraIntrinsics {
    /// Number of distortion coefficients a fresh estimate starts with.
    pub const DEFAULT_DISTORTION_LEN: usize = 8;

    /// Identity camera matrix and zero distortion, the starting point of an
    /// intrinsic calibration without a prior estimate.
    pub fn identity() -> Self {
        Self {
            camera_matrix: Matrix3::identity(),
            distortion: vec![0.0; Self::DEFAULT_DISTORTION_LEN],
        }
    }

    #[inline]
    pub fn fx(&self) -> f64 {
        self.camera_matrix[(0, 0)]
    }

    #[inline]
    pub fn fy(&self) -> f64 {
        self.camera_matrix[(1, 1)]
    }

    #[inline]
    pub fn cx(&self) -> f64 {
        self.camera_matrix[(0, 2)]
    }

    #[inline]
    pub fn cy(&self) -> f64 {
        self.camera_matrix[(1, 2)]
    }

    /// Distortion coefficient `i`, zero when not present.
    #[inline]
    pub fn coeff(&self, i: usize) -> f64 {
        self.distortion.get(i).copied().unwrap_or(0.0)
    }

    /// True when every matrix entry and coefficient is finite.
    pub fn is_finite(&self) -> bool {
        all_finite(self.camera_matrix.iter()) && all_finite(self.distortion.iter())
    }
}

/// Per-view board pose: Rodrigues rotation vector and translation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
}

impl ViewPose {
    pub fn is_finite(&self) -> bool {
        all_finite(self.rotation.iter()) && all_finite(self.translation.iter())
    }
}

/// Range check used for solver sanity checks: no NaN, no infinity.
pub fn all_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}
