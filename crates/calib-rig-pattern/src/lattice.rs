//! Box-rig geometry normalization onto a shared integer lattice.
//!
//! Each rig face is authored as its own planar marker map in local `(x, y)`
//! coordinates. [`Lattice::fold`] places a face in the common box frame and
//! [`Lattice::map`] snaps the folded point to `round((c + offset) / step)`.
//! The snapped key only drives matching, so a corner shared by two faces
//! lands on one integer point even when the two maps disagree by a fraction
//! of a step, while the folded point keeps the true metric layout.

use crate::Plane;
use calib_rig_core::LatticePoint;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LatticeError {
    #[error("lattice step must be finite and > 0, got {0}")]
    InvalidStep(f64),
    #[error("lattice offset must be finite and >= 0, got {0}")]
    InvalidOffset(f64),
}

/// Lattice resolution and translation shared by every face of a rig.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// Added to every local coordinate (negated ones included) before
    /// quantization; must make every map coordinate non-negative.
    #[serde(default = "default_offset")]
    pub offset: f64,
    /// Lattice spacing in map units.
    #[serde(default = "default_step", alias = "denominator")]
    pub step: f64,
}

fn default_offset() -> f64 {
    1000.0
}

fn default_step() -> f64 {
    125.0
}

impl Default for Lattice {
    fn default() -> Self {
        Self {
            offset: default_offset(),
            step: default_step(),
        }
    }
}

impl Lattice {
    pub fn new(offset: f64, step: f64) -> Result<Self, LatticeError> {
        let lattice = Self { offset, step };
        lattice.validate()?;
        Ok(lattice)
    }

    pub fn validate(&self) -> Result<(), LatticeError> {
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(LatticeError::InvalidStep(self.step));
        }
        if !self.offset.is_finite() || self.offset < 0.0 {
            return Err(LatticeError::InvalidOffset(self.offset));
        }
        Ok(())
    }

    /// True when both in-plane coordinates stay non-negative after the
    /// offset, with either sign.
    pub fn covers(&self, p: &Point3<f64>) -> bool {
        p.x.abs() <= self.offset && p.y.abs() <= self.offset
    }

    /// Fold a face-local point into the box frame, offset applied and not
    /// quantized. This is the object point handed to the solver.
    ///
    /// - `XY`: `(x, y)` kept, `z = 0`.
    /// - `YZ`: `y` kept, `z` taken from `-x`, `x = 0`.
    /// - `XZ`: `x` kept, `z` taken from `-y`, `y = 0`.
    pub fn fold(&self, p: &Point3<f64>, plane: Plane) -> Point3<f64> {
        let o = self.offset;
        match plane {
            Plane::Xy => Point3::new(p.x + o, p.y + o, 0.0),
            Plane::Yz => Point3::new(0.0, p.y + o, -p.x + o),
            Plane::Xz => Point3::new(p.x + o, 0.0, -p.y + o),
        }
    }

    /// Matching key of a face-local point: the folded point divided by the
    /// step and rounded.
    pub fn map(&self, p: &Point3<f64>, plane: Plane) -> LatticePoint {
        let snap = |c: f64| (c / self.step).round() as i64;
        let f = self.fold(p, plane);
        LatticePoint::new(snap(f.x), snap(f.y), snap(f.z))
    }

    /// Metric object point of a lattice point, in the box frame.
    pub fn to_object(&self, lp: LatticePoint) -> Point3<f64> {
        Point3::new(
            lp.x as f64 * self.step,
            lp.y as f64 * self.step,
            lp.z as f64 * self.step,
        )
    }
}
