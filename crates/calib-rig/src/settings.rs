//! Settings files, their resolution and validation.
//!
//! Loading happens in two steps. [`SettingsFile::resolve`] reads every file
//! the settings reference (image list, rig description, marker maps,
//! intrinsic estimate) into a [`RawSettings`]; nothing is checked beyond
//! "the file parses". [`validate`] then checks the whole configuration at
//! once and either returns every problem it found or a [`Settings`] value
//! the orchestrator can run without further checks.

use crate::flags::{build_flag_mask, parse_fix_digits, CalibFlags};
use calib_rig_core::CameraIntrinsics;
use calib_rig_pattern::{
    BoardSize, Lattice, LatticeError, MarkerMap, MarkerMapError, PatternConfig, PatternKind,
    Plane, RigFace,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Square sizes at or below this are rejected.
pub const MIN_SQUARE_SIZE: f64 = 1e-5;

/// Frames wider than this are halved before detection unless configured
/// otherwise.
pub const DEFAULT_MAX_FRAME_WIDTH: u32 = 1280;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Single-camera intrinsic calibration.
    Intrinsic,
    /// Two-camera calibration from interleaved left/right images.
    Stereo,
    /// Live detection preview, nothing is calibrated.
    Preview,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Intrinsic => "INTRINSIC",
            Mode::Stereo => "STEREO",
            Mode::Preview => "PREVIEW",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTRINSIC" => Ok(Mode::Intrinsic),
            "STEREO" => Ok(Mode::Stereo),
            "PREVIEW" => Ok(Mode::Preview),
            other => Err(other.to_string()),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SettingsIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("cannot read {what} {path}: {source}")]
    Read {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {what} {path}: {source}")]
    Parse {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("marker map {path}: {source}")]
    MarkerMap {
        path: PathBuf,
        #[source]
        source: MarkerMapError,
    },
}

fn default_fix_distortion() -> String {
    "00000".to_string()
}

fn default_max_frame_width() -> u32 {
    DEFAULT_MAX_FRAME_WIDTH
}

/// Settings as stored on disk.
///
/// Path fields are relative to the settings file. An empty string or `"0"`
/// means "not supplied".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsFile {
    pub mode: String,
    pub calibration_pattern: String,
    #[serde(default)]
    pub board_width: i64,
    #[serde(default)]
    pub board_height: i64,
    #[serde(default)]
    pub square_size: f64,
    /// JSON array of image paths (relative to the list file).
    #[serde(default)]
    pub image_list: String,
    /// Marker-map rig description, see [`RigFile`].
    #[serde(default)]
    pub rig: String,
    /// JSON carrying `camera_matrix` and `distortion_coefficients`.
    #[serde(default)]
    pub intrinsic_input: String,
    #[serde(default)]
    pub intrinsic_output: String,
    #[serde(default)]
    pub extrinsic_output: String,
    /// Five `0`/`1` digits, one per distortion coefficient `k1..k5`.
    #[serde(default = "default_fix_distortion")]
    pub fix_distortion: String,
    /// `fx / fy` to hold fixed; `0` leaves the aspect ratio free.
    #[serde(default)]
    pub fix_aspect_ratio: f64,
    #[serde(default)]
    pub zero_tangent: bool,
    #[serde(default)]
    pub fix_principal_point: bool,
    #[serde(default)]
    pub show_undistorted: bool,
    #[serde(default)]
    pub show_marker_coordinates: bool,
    #[serde(default)]
    pub wait_next_image: bool,
    #[serde(default)]
    pub camera_id: String,
    /// `0` disables downsampling.
    #[serde(default = "default_max_frame_width")]
    pub max_frame_width: u32,
}

/// Rig description: marker maps in face order plus their plane labels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RigFile {
    /// Marker-map JSON files, relative to the rig file.
    pub configs: Vec<String>,
    #[serde(default)]
    pub planes: Vec<String>,
    #[serde(default)]
    pub lattice: Option<Lattice>,
}

/// Settings with every referenced file loaded, not yet validated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawSettings {
    pub mode: String,
    pub pattern: String,
    pub board_width: i64,
    pub board_height: i64,
    pub square_size: f64,
    pub images: Vec<PathBuf>,
    pub marker_maps: Vec<MarkerMap>,
    pub planes: Vec<String>,
    pub lattice: Lattice,
    pub intrinsic_input: Option<CameraIntrinsics>,
    pub intrinsic_output: Option<PathBuf>,
    pub extrinsic_output: Option<PathBuf>,
    pub fix_distortion: String,
    pub fix_aspect_ratio: f64,
    pub zero_tangent: bool,
    pub fix_principal_point: bool,
    pub show_undistorted: bool,
    pub show_marker_coordinates: bool,
    pub wait_next_image: bool,
    pub camera_id: String,
    pub max_frame_width: u32,
}

fn supplied(path: &str) -> Option<&str> {
    let trimmed = path.trim();
    (!trimmed.is_empty() && trimmed != "0").then_some(trimmed)
}

fn read_json_file<T: DeserializeOwned>(what: &'static str, path: &Path) -> Result<T, SettingsIoError> {
    let raw = fs::read_to_string(path).map_err(|source| SettingsIoError::Read {
        what,
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SettingsIoError::Parse {
        what,
        path: path.to_path_buf(),
        source,
    })
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

impl SettingsFile {
    /// Load a JSON settings file from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SettingsIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write these settings to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SettingsIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read every referenced file, resolving relative paths against
    /// `base_dir`.
    ///
    /// Marker maps are only loaded for marker patterns. A malformed map is
    /// an error here, never later during detection.
    pub fn resolve(&self, base_dir: impl AsRef<Path>) -> Result<RawSettings, SettingsIoError> {
        let base_dir = base_dir.as_ref();
        let resolve_path = |p: &str| base_dir.join(p);

        let images = match supplied(&self.image_list) {
            Some(list) => {
                let list_path = resolve_path(list);
                let entries: Vec<String> = read_json_file("image list", &list_path)?;
                let list_dir = parent_dir(&list_path);
                entries.iter().map(|e| list_dir.join(e)).collect()
            }
            None => Vec::new(),
        };

        let mut marker_maps = Vec::new();
        let mut planes = Vec::new();
        let mut lattice = Lattice::default();
        let wants_maps = self.calibration_pattern.trim() != PatternKind::Chessboard.label();
        if let (true, Some(rig)) = (wants_maps, supplied(&self.rig)) {
            let rig_path = resolve_path(rig);
            let rig: RigFile = read_json_file("rig file", &rig_path)?;
            let rig_dir = parent_dir(&rig_path);
            for config in &rig.configs {
                let path = rig_dir.join(config);
                let map = MarkerMap::load_json(&path)
                    .map_err(|source| SettingsIoError::MarkerMap { path, source })?;
                marker_maps.push(map);
            }
            planes = rig.planes;
            if let Some(l) = rig.lattice {
                lattice = l;
            }
        }

        let intrinsic_input = match supplied(&self.intrinsic_input) {
            Some(p) => Some(read_json_file("intrinsic input", &resolve_path(p))?),
            None => None,
        };

        Ok(RawSettings {
            mode: self.mode.trim().to_string(),
            pattern: self.calibration_pattern.trim().to_string(),
            board_width: self.board_width,
            board_height: self.board_height,
            square_size: self.square_size,
            images,
            marker_maps,
            planes,
            lattice,
            intrinsic_input,
            intrinsic_output: supplied(&self.intrinsic_output).map(resolve_path),
            extrinsic_output: supplied(&self.extrinsic_output).map(resolve_path),
            fix_distortion: self.fix_distortion.trim().to_string(),
            fix_aspect_ratio: self.fix_aspect_ratio,
            zero_tangent: self.zero_tangent,
            fix_principal_point: self.fix_principal_point,
            show_undistorted: self.show_undistorted,
            show_marker_coordinates: self.show_marker_coordinates,
            wait_next_image: self.wait_next_image,
            camera_id: self.camera_id.trim().to_string(),
            max_frame_width: self.max_frame_width,
        })
    }
}

/// Load a settings file and resolve it relative to its own directory.
pub fn load_settings(path: impl AsRef<Path>) -> Result<RawSettings, SettingsIoError> {
    let path = path.as_ref();
    SettingsFile::load_json(path)?.resolve(parent_dir(path))
}

/// One problem found by [`validate`].
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum SettingsIssue {
    #[error("unknown mode {0:?} (expected INTRINSIC, STEREO or PREVIEW)")]
    UnknownMode(String),
    #[error("unknown calibration pattern {0:?} (expected CHESSBOARD, ARUCO_SINGLE or ARUCO_BOX)")]
    UnknownPattern(String),
    #[error("invalid board size {width}x{height}")]
    InvalidBoardSize { width: i64, height: i64 },
    #[error("invalid square size {0}")]
    InvalidSquareSize(f64),
    #[error("image list is empty")]
    EmptyImageList,
    #[error("stereo calibration needs an even number of images, got {0}")]
    OddImageCount(usize),
    #[error("invalid preview camera id {0:?}")]
    InvalidCameraId(String),
    #[error("{pattern} needs {expected} marker map(s), got {got}")]
    MarkerMapCount {
        pattern: PatternKind,
        expected: usize,
        got: usize,
    },
    #[error("unknown plane label {0:?} (expected XY, YZ or XZ)")]
    UnknownPlane(String),
    #[error("{planes} plane label(s) for {maps} marker map(s)")]
    PlaneCountMismatch { maps: usize, planes: usize },
    #[error("plane {0} assigned to more than one rig face")]
    DuplicatePlane(Plane),
    #[error("ARUCO_BOX requires an intrinsic input")]
    MissingIntrinsicInput,
    #[error("intrinsic input contains non-finite values")]
    NonFiniteIntrinsicInput,
    #[error("fix-distortion setting {0:?} must be five 0/1 digits")]
    InvalidFixDistortion(String),
    #[error("invalid fixed aspect ratio {0}")]
    InvalidAspectRatio(f64),
    #[error(transparent)]
    Lattice(#[from] LatticeError),
    #[error("lattice offset {offset} does not cover box coordinate {coordinate}")]
    LatticeOffsetTooSmall { offset: f64, coordinate: f64 },
}

fn join_issues(issues: &[SettingsIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(thiserror::Error, Clone, Debug, PartialEq)]
#[error("invalid settings: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<SettingsIssue>,
}

impl ValidationError {
    pub fn contains(&self, issue: &SettingsIssue) -> bool {
        self.issues.contains(issue)
    }
}

/// Output files; `None` skips persistence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputPaths {
    pub intrinsic: Option<PathBuf>,
    pub extrinsic: Option<PathBuf>,
}

/// Initial operator-facing toggles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Block on the operator after each shown frame.
    pub wait: bool,
    /// Start the preview with undistortion enabled.
    pub undistort: bool,
    /// Label markers with lattice coordinates instead of ids.
    pub show_coordinates: bool,
}

/// A configuration that passed [`validate`].
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub mode: Mode,
    pub pattern: PatternConfig,
    pub images: Vec<PathBuf>,
    /// Live capture device; only set in preview mode.
    pub camera_id: Option<u32>,
    pub intrinsic_guess: Option<CameraIntrinsics>,
    pub flags: CalibFlags,
    pub aspect_ratio: Option<f64>,
    pub outputs: OutputPaths,
    pub display: DisplayOptions,
    pub max_frame_width: Option<u32>,
}

/// Check a resolved configuration, reporting every problem at once.
pub fn validate(raw: RawSettings) -> Result<Settings, ValidationError> {
    let RawSettings {
        mode,
        pattern,
        board_width,
        board_height,
        square_size,
        images,
        marker_maps,
        planes,
        lattice,
        intrinsic_input,
        intrinsic_output,
        extrinsic_output,
        fix_distortion,
        fix_aspect_ratio,
        zero_tangent,
        fix_principal_point,
        show_undistorted,
        show_marker_coordinates,
        wait_next_image,
        camera_id,
        max_frame_width,
    } = raw;

    let mut issues = Vec::new();

    let mode = match mode.parse::<Mode>() {
        Ok(m) => Some(m),
        Err(s) => {
            issues.push(SettingsIssue::UnknownMode(s));
            None
        }
    };
    let kind = match pattern.parse::<PatternKind>() {
        Ok(k) => Some(k),
        Err(s) => {
            issues.push(SettingsIssue::UnknownPattern(s));
            None
        }
    };

    let mut camera = None;
    match mode {
        Some(Mode::Intrinsic) if images.is_empty() => issues.push(SettingsIssue::EmptyImageList),
        Some(Mode::Stereo) if images.is_empty() => issues.push(SettingsIssue::EmptyImageList),
        Some(Mode::Stereo) if images.len() % 2 != 0 => {
            issues.push(SettingsIssue::OddImageCount(images.len()))
        }
        Some(Mode::Preview) => match camera_id.parse::<u32>() {
            Ok(id) => camera = Some(id),
            Err(_) => issues.push(SettingsIssue::InvalidCameraId(camera_id)),
        },
        _ => {}
    }

    let pattern = kind.and_then(|kind| {
        build_pattern(
            kind,
            PatternInputs {
                board_width,
                board_height,
                square_size,
                marker_maps,
                planes: &planes,
                lattice,
            },
            &mut issues,
        )
    });

    if kind == Some(PatternKind::ArucoBox) && intrinsic_input.is_none() {
        issues.push(SettingsIssue::MissingIntrinsicInput);
    }
    if intrinsic_input.as_ref().is_some_and(|k| !k.is_finite()) {
        issues.push(SettingsIssue::NonFiniteIntrinsicInput);
    }

    let digits = parse_fix_digits(&fix_distortion);
    if digits.is_none() {
        issues.push(SettingsIssue::InvalidFixDistortion(fix_distortion));
    }
    if !fix_aspect_ratio.is_finite() || fix_aspect_ratio < 0.0 {
        issues.push(SettingsIssue::InvalidAspectRatio(fix_aspect_ratio));
    }

    match (mode, pattern, digits) {
        (Some(mode), Some(pattern), Some(digits)) if issues.is_empty() => {
            let aspect_ratio = (fix_aspect_ratio > 0.0).then_some(fix_aspect_ratio);
            Ok(Settings {
                mode,
                pattern,
                images,
                camera_id: camera,
                intrinsic_guess: intrinsic_input,
                flags: build_flag_mask(
                    digits,
                    fix_principal_point,
                    zero_tangent,
                    aspect_ratio.is_some(),
                ),
                aspect_ratio,
                outputs: OutputPaths {
                    intrinsic: intrinsic_output,
                    extrinsic: extrinsic_output,
                },
                display: DisplayOptions {
                    wait: wait_next_image,
                    undistort: show_undistorted,
                    show_coordinates: show_marker_coordinates,
                },
                max_frame_width: (max_frame_width > 0).then_some(max_frame_width),
            })
        }
        _ => Err(ValidationError { issues }),
    }
}

struct PatternInputs<'a> {
    board_width: i64,
    board_height: i64,
    square_size: f64,
    marker_maps: Vec<MarkerMap>,
    planes: &'a [String],
    lattice: Lattice,
}

fn build_pattern(
    kind: PatternKind,
    inputs: PatternInputs<'_>,
    issues: &mut Vec<SettingsIssue>,
) -> Option<PatternConfig> {
    let PatternInputs {
        board_width,
        board_height,
        square_size,
        marker_maps,
        planes,
        lattice,
    } = inputs;

    if kind != PatternKind::Chessboard && marker_maps.len() != kind.required_maps() {
        issues.push(SettingsIssue::MarkerMapCount {
            pattern: kind,
            expected: kind.required_maps(),
            got: marker_maps.len(),
        });
    }

    // Board and square checks apply to every pattern.
    let board = match (u32::try_from(board_width), u32::try_from(board_height)) {
        (Ok(width), Ok(height)) if width > 0 && height > 0 => Some(BoardSize { width, height }),
        _ => {
            issues.push(SettingsIssue::InvalidBoardSize {
                width: board_width,
                height: board_height,
            });
            None
        }
    };
    if !square_size.is_finite() || square_size <= MIN_SQUARE_SIZE {
        issues.push(SettingsIssue::InvalidSquareSize(square_size));
    }

    match kind {
        PatternKind::Chessboard => board.map(|board| PatternConfig::Chessboard { board, square_size }),
        PatternKind::ArucoSingle => {
            let mut maps = marker_maps;
            (maps.len() == 1)
                .then(|| maps.pop())
                .flatten()
                .map(PatternConfig::ArucoSingle)
        }
        PatternKind::ArucoBox => {
            let mut parsed = Vec::with_capacity(planes.len());
            let mut seen = HashSet::new();
            for label in planes {
                match label.parse::<Plane>() {
                    Ok(plane) => {
                        if !seen.insert(plane) {
                            issues.push(SettingsIssue::DuplicatePlane(plane));
                        }
                        parsed.push(plane);
                    }
                    Err(_) => issues.push(SettingsIssue::UnknownPlane(label.clone())),
                }
            }
            if planes.len() != marker_maps.len() {
                issues.push(SettingsIssue::PlaneCountMismatch {
                    maps: marker_maps.len(),
                    planes: planes.len(),
                });
            }

            let lattice_ok = match lattice.validate() {
                Ok(()) => true,
                Err(e) => {
                    issues.push(e.into());
                    false
                }
            };
            if lattice_ok {
                let widest = marker_maps
                    .iter()
                    .flat_map(|m| m.all_corners())
                    .filter(|p| !lattice.covers(p))
                    .flat_map(|p| [p.x, p.y])
                    .map(f64::abs)
                    .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))));
                if let Some(coordinate) = widest {
                    issues.push(SettingsIssue::LatticeOffsetTooSmall {
                        offset: lattice.offset,
                        coordinate,
                    });
                }
            }

            let faces: Vec<RigFace> = marker_maps
                .into_iter()
                .zip(parsed)
                .map(|(map, plane)| RigFace { plane, map })
                .collect();
            let faces: [RigFace; 3] = faces.try_into().ok()?;
            Some(PatternConfig::ArucoBox { faces, lattice })
        }
    }
}
