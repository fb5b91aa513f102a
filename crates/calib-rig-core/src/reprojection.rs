//! Reprojection residuals for the OpenCV pinhole + rational distortion model.

use crate::{CameraIntrinsics, ViewPose};
use nalgebra::{Point2, Point3, Rotation3};
use serde::{Deserialize, Serialize};

/// Residual summary over a set of views.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionErrors {
    /// RMS pixel error per view.
    pub per_view: Vec<f64>,
    /// RMS pixel error over every point of every view.
    pub total: f64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReprojectionError {
    #[error("expected {expected} views, got {got} poses")]
    PoseCountMismatch { expected: usize, got: usize },
    #[error("view {view}: {objects} object points vs {images} image points")]
    PointCountMismatch {
        view: usize,
        objects: usize,
        images: usize,
    },
}

/// Project one object point through `pose` and `k`.
pub fn project_point(k: &CameraIntrinsics, pose: &ViewPose, p: &Point3<f64>) -> Point2<f64> {
    let rot = Rotation3::from_scaled_axis(pose.rotation);
    let pc = rot * p.coords + pose.translation;
    let z = if pc.z.abs() > f64::EPSILON { pc.z } else { f64::EPSILON };
    let x = pc.x / z;
    let y = pc.y / z;

    let (k1, k2, p1, p2, k3) = (k.coeff(0), k.coeff(1), k.coeff(2), k.coeff(3), k.coeff(4));
    let (k4, k5, k6) = (k.coeff(5), k.coeff(6), k.coeff(7));

    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let radial = (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);
    let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
    let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;

    let m = &k.camera_matrix;
    Point2::new(
        m[(0, 0)] * xd + m[(0, 1)] * yd + m[(0, 2)],
        m[(1, 1)] * yd + m[(1, 2)],
    )
}

/// Per-view and overall RMS reprojection error.
///
/// Views without points contribute a zero entry and do not affect the total.
pub fn reprojection_errors(
    k: &CameraIntrinsics,
    poses: &[ViewPose],
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
) -> Result<ReprojectionErrors, ReprojectionError> {
    if poses.len() != object_points.len() || image_points.len() != object_points.len() {
        return Err(ReprojectionError::PoseCountMismatch {
            expected: object_points.len(),
            got: poses.len().min(image_points.len()),
        });
    }

    let mut per_view = Vec::with_capacity(poses.len());
    let mut total_sq = 0.0;
    let mut total_n = 0usize;

    for (view, ((pose, objs), imgs)) in poses
        .iter()
        .zip(object_points)
        .zip(image_points)
        .enumerate()
    {
        if objs.len() != imgs.len() {
            return Err(ReprojectionError::PointCountMismatch {
                view,
                objects: objs.len(),
                images: imgs.len(),
            });
        }
        let sq: f64 = objs
            .iter()
            .zip(imgs)
            .map(|(o, i)| (project_point(k, pose, o) - i).norm_squared())
            .sum();
        let n = objs.len();
        per_view.push(if n > 0 { (sq / n as f64).sqrt() } else { 0.0 });
        total_sq += sq;
        total_n += n;
    }

    let total = if total_n > 0 {
        (total_sq / total_n as f64).sqrt()
    } else {
        0.0
    };
    Ok(ReprojectionErrors { per_view, total })
}
