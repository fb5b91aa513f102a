//! Persisted calibration reports.
//!
//! An intrinsics report doubles as an intrinsic-input file: it carries
//! `camera_matrix` and `distortion_coefficients` at the top level, which is
//! all [`CameraIntrinsics`] reads.

use crate::flags::CalibFlags;
use crate::orchestrator::{IntrinsicCalibration, StereoCalibration};
use crate::settings::Settings;
use calib_rig_core::CameraIntrinsics;
use calib_rig_pattern::{PatternConfig, PatternKind};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(thiserror::Error, Debug)]
pub enum ReportIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Seconds since the Unix epoch.
pub fn calibration_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsReport {
    pub calibration_time: u64,
    pub image_width: u32,
    pub image_height: u32,
    pub calibration_pattern: PatternKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub square_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    pub calibration_flags: String,
    pub flag_value: u32,
    pub camera_matrix: Matrix3<f64>,
    pub distortion_coefficients: Vec<f64>,
    pub avg_reprojection_error: f64,
    #[serde(default)]
    pub per_view_reprojection_errors: Vec<f64>,
}

impl IntrinsicsReport {
    pub fn new(settings: &Settings, calib: &IntrinsicCalibration, calibration_time: u64) -> Self {
        let (board_width, board_height, square_size) = match &settings.pattern {
            PatternConfig::Chessboard { board, square_size } => {
                (Some(board.width), Some(board.height), Some(*square_size))
            }
            _ => (None, None, None),
        };
        let flags: CalibFlags = calib.flags;
        Self {
            calibration_time,
            image_width: calib.image_size.width,
            image_height: calib.image_size.height,
            calibration_pattern: settings.pattern.kind(),
            board_width,
            board_height,
            square_size,
            aspect_ratio: settings
                .aspect_ratio
                .filter(|_| flags.contains(CalibFlags::FIX_ASPECT_RATIO)),
            calibration_flags: flags.describe(),
            flag_value: flags.bits(),
            camera_matrix: calib.intrinsics.camera_matrix,
            distortion_coefficients: calib.intrinsics.distortion.clone(),
            avg_reprojection_error: calib.errors.total,
            per_view_reprojection_errors: calib.errors.per_view.clone(),
        }
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics {
            camera_matrix: self.camera_matrix,
            distortion: self.distortion_coefficients.clone(),
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReportIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoParameters {
    pub rotation_matrix: Matrix3<f64>,
    pub translation_vector: Vector3<f64>,
    pub essential_matrix: Matrix3<f64>,
    pub fundamental_matrix: Matrix3<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectificationParameters {
    pub rectification_transformation_1: Matrix3<f64>,
    pub rectification_transformation_2: Matrix3<f64>,
    pub projection_matrix_1: Matrix3x4<f64>,
    pub projection_matrix_2: Matrix3x4<f64>,
    pub disparity_to_depth_mapping_matrix: Matrix4<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtrinsicsReport {
    pub calibration_time: u64,
    pub calibration_pattern: PatternKind,
    pub stereo_parameters: StereoParameters,
    pub rectification_parameters: RectificationParameters,
    pub reprojection_error: f64,
}

impl ExtrinsicsReport {
    pub fn new(settings: &Settings, stereo: &StereoCalibration, calibration_time: u64) -> Self {
        let s = &stereo.solution;
        let r = &stereo.rectification;
        Self {
            calibration_time,
            calibration_pattern: settings.pattern.kind(),
            stereo_parameters: StereoParameters {
                rotation_matrix: s.rotation,
                translation_vector: s.translation,
                essential_matrix: s.essential,
                fundamental_matrix: s.fundamental,
            },
            rectification_parameters: RectificationParameters {
                rectification_transformation_1: r.r1,
                rectification_transformation_2: r.r2,
                projection_matrix_1: r.p1,
                projection_matrix_2: r.p2,
                disparity_to_depth_mapping_matrix: r.q,
            },
            reprojection_error: s.rms,
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReportIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Destination for finished reports.
pub trait ReportWriter {
    fn write_intrinsics(&self, path: &Path, report: &IntrinsicsReport)
        -> Result<(), ReportIoError>;

    fn write_extrinsics(&self, path: &Path, report: &ExtrinsicsReport)
        -> Result<(), ReportIoError>;
}

/// Writes reports as pretty-printed JSON files.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonReportWriter;

impl ReportWriter for JsonReportWriter {
    fn write_intrinsics(&self, path: &Path, report: &IntrinsicsReport) -> Result<(), ReportIoError> {
        report.write_json(path)
    }

    fn write_extrinsics(&self, path: &Path, report: &ExtrinsicsReport) -> Result<(), ReportIoError> {
        report.write_json(path)
    }
}
