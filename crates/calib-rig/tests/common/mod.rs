//! Scripted collaborators shared by the orchestration tests.

#![allow(dead_code)]

use calib_rig::core::{CameraIntrinsics, GrayImage, GrayImageView, ViewPose};
use calib_rig::io::{AnnotationLabel, DisplaySink, OperatorKey, Overlay, WaitPolicy};
use calib_rig::pattern::{
    BoardSize, ChessboardCornerDetector, DetectedMarker, MapMarker, MarkerDetector, MarkerMap,
    MarkerMapSpec,
};
use calib_rig::report::{ExtrinsicsReport, IntrinsicsReport, ReportIoError, ReportWriter};
use calib_rig::settings::{DisplayOptions, Mode, OutputPaths, Settings};
use calib_rig::solver::{
    CalibrationSolver, IntrinsicProblem, IntrinsicSolution, Rectification, RectifyProblem,
    SolverError, StereoProblem, StereoSolution,
};
use calib_rig::{pattern::PatternConfig, CalibFlags};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Vector3};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

pub const DICTIONARY: &str = "ARUCO_MIP_36h12";

pub fn frames(n: usize) -> Vec<GrayImage> {
    (0..n).map(|_| GrayImage::blank(64, 48)).collect()
}

pub fn settings(mode: Mode, pattern: PatternConfig) -> Settings {
    Settings {
        mode,
        pattern,
        images: Vec::new(),
        camera_id: None,
        intrinsic_guess: None,
        flags: CalibFlags::NONE,
        aspect_ratio: None,
        outputs: OutputPaths::default(),
        display: DisplayOptions::default(),
        max_frame_width: Some(1280),
    }
}

pub fn chessboard(width: u32, height: u32) -> PatternConfig {
    PatternConfig::Chessboard {
        board: BoardSize { width, height },
        square_size: 10.0,
    }
}

/// Map of 100×100 markers laid out on a row, marker `k` at `x = 100 k`.
pub fn row_map(ids: &[u32]) -> MarkerMap {
    MarkerMap::new(MarkerMapSpec {
        dictionary: DICTIONARY.into(),
        markers: ids
            .iter()
            .enumerate()
            .map(|(k, &id)| {
                let x0 = 100.0 * k as f64;
                MapMarker {
                    id,
                    corners: [
                        [x0, 100.0, 0.0],
                        [x0 + 100.0, 100.0, 0.0],
                        [x0 + 100.0, 0.0, 0.0],
                        [x0, 0.0, 0.0],
                    ],
                }
            })
            .collect(),
    })
    .expect("marker map")
}

pub fn marker(id: u32, u: f64) -> DetectedMarker {
    DetectedMarker {
        id,
        corners: [
            Point2::new(u, 10.0),
            Point2::new(u + 20.0, 10.0),
            Point2::new(u + 20.0, 30.0),
            Point2::new(u, 30.0),
        ],
    }
}

pub fn grid(width: u32, height: u32) -> Vec<Point2<f64>> {
    (0..height)
        .flat_map(|i| (0..width).map(move |j| Point2::new(j as f64 * 5.0, i as f64 * 5.0)))
        .collect()
}

/// Chessboard detector answering from a script, one entry per frame.
#[derive(Default)]
pub struct ScriptedChessboard {
    pub script: VecDeque<Option<Vec<Point2<f64>>>>,
    pub seen_widths: Vec<usize>,
}

impl ScriptedChessboard {
    pub fn new(script: impl IntoIterator<Item = Option<Vec<Point2<f64>>>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            seen_widths: Vec::new(),
        }
    }
}

impl ChessboardCornerDetector for ScriptedChessboard {
    fn detect(&mut self, image: &GrayImageView<'_>, _board: BoardSize) -> Option<Vec<Point2<f64>>> {
        self.seen_widths.push(image.width);
        self.script.pop_front().flatten()
    }
}

/// Marker detector answering from a script, one entry per detector call.
#[derive(Default)]
pub struct ScriptedMarkers {
    pub script: VecDeque<Vec<DetectedMarker>>,
    pub calls: usize,
}

impl ScriptedMarkers {
    pub fn new(script: impl IntoIterator<Item = Vec<DetectedMarker>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }
}

impl MarkerDetector for ScriptedMarkers {
    fn detect(&mut self, _image: &GrayImageView<'_>, dictionary: &str) -> Vec<DetectedMarker> {
        assert_eq!(dictionary, DICTIONARY);
        self.calls += 1;
        self.script.pop_front().unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Finite,
    NonFinite,
    Fail,
    /// One pose fewer than views.
    MissingPose,
}

/// Solver returning fixed, plausible values and recording every problem.
pub struct RecordingSolver {
    pub intrinsic_outcome: Outcome,
    pub intrinsic_calls: RefCell<Vec<IntrinsicProblem>>,
    pub stereo_calls: RefCell<Vec<StereoProblem>>,
    pub rectify_calls: RefCell<Vec<RectifyProblem>>,
}

impl RecordingSolver {
    pub fn new() -> Self {
        Self::with_outcome(Outcome::Finite)
    }

    pub fn with_outcome(intrinsic_outcome: Outcome) -> Self {
        Self {
            intrinsic_outcome,
            intrinsic_calls: RefCell::new(Vec::new()),
            stereo_calls: RefCell::new(Vec::new()),
            rectify_calls: RefCell::new(Vec::new()),
        }
    }

    pub fn total_calls(&self) -> usize {
        self.intrinsic_calls.borrow().len()
            + self.stereo_calls.borrow().len()
            + self.rectify_calls.borrow().len()
    }
}

pub fn solved_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics {
        camera_matrix: Matrix3::new(500.0, 0.0, 32.0, 0.0, 500.0, 24.0, 0.0, 0.0, 1.0),
        distortion: vec![0.0; CameraIntrinsics::DEFAULT_DISTORTION_LEN],
    }
}

impl CalibrationSolver for RecordingSolver {
    fn calibrate_camera(&self, problem: &IntrinsicProblem) -> Result<IntrinsicSolution, SolverError> {
        self.intrinsic_calls.borrow_mut().push(problem.clone());
        let mut intrinsics = solved_intrinsics();
        match self.intrinsic_outcome {
            Outcome::Fail => return Err(SolverError::NotConverged("scripted".into())),
            Outcome::NonFinite => intrinsics.camera_matrix[(0, 0)] = f64::NAN,
            Outcome::Finite | Outcome::MissingPose => {}
        }
        let skip = usize::from(self.intrinsic_outcome == Outcome::MissingPose);
        let poses = problem
            .object_points
            .iter()
            .skip(skip)
            .map(|_| ViewPose {
                rotation: Vector3::zeros(),
                translation: Vector3::new(0.0, 0.0, 1000.0),
            })
            .collect();
        Ok(IntrinsicSolution {
            intrinsics,
            poses,
            rms: 0.5,
        })
    }

    fn stereo_calibrate(&self, problem: &StereoProblem) -> Result<StereoSolution, SolverError> {
        self.stereo_calls.borrow_mut().push(problem.clone());
        Ok(StereoSolution {
            rotation: Matrix3::identity(),
            translation: Vector3::new(-60.0, 0.0, 0.0),
            essential: Matrix3::zeros(),
            fundamental: Matrix3::zeros(),
            rms: 0.25,
        })
    }

    fn stereo_rectify(&self, problem: &RectifyProblem) -> Result<Rectification, SolverError> {
        self.rectify_calls.borrow_mut().push(problem.clone());
        Ok(Rectification {
            r1: Matrix3::identity(),
            r2: Matrix3::identity(),
            p1: Matrix3x4::identity(),
            p2: Matrix3x4::identity(),
            q: Matrix4::identity(),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Shown {
    pub width: usize,
    pub label: AnnotationLabel,
    pub undistorted: bool,
}

/// Display answering key polls from a script and recording what it showed.
#[derive(Default)]
pub struct ScriptedDisplay {
    pub keys: VecDeque<Option<OperatorKey>>,
    pub shown: Vec<Shown>,
    pub waits: Vec<WaitPolicy>,
}

impl ScriptedDisplay {
    pub fn with_keys(keys: impl IntoIterator<Item = Option<OperatorKey>>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl DisplaySink for ScriptedDisplay {
    fn show(&mut self, frame: &GrayImageView<'_>, overlay: Overlay<'_>) {
        self.shown.push(Shown {
            width: frame.width,
            label: overlay.label,
            undistorted: overlay.undistort.is_some(),
        });
    }

    fn poll_key(&mut self, wait: WaitPolicy) -> Option<OperatorKey> {
        self.waits.push(wait);
        self.keys.pop_front().flatten()
    }
}

/// Report writer keeping reports in memory, optionally failing every write.
#[derive(Default)]
pub struct MemoryReports {
    pub fail: bool,
    pub intrinsics: RefCell<Vec<(PathBuf, IntrinsicsReport)>>,
    pub extrinsics: RefCell<Vec<(PathBuf, ExtrinsicsReport)>>,
}

impl ReportWriter for MemoryReports {
    fn write_intrinsics(&self, path: &Path, report: &IntrinsicsReport) -> Result<(), ReportIoError> {
        if self.fail {
            return Err(std::io::Error::other("disk full").into());
        }
        self.intrinsics
            .borrow_mut()
            .push((path.to_path_buf(), report.clone()));
        Ok(())
    }

    fn write_extrinsics(&self, path: &Path, report: &ExtrinsicsReport) -> Result<(), ReportIoError> {
        if self.fail {
            return Err(std::io::Error::other("disk full").into());
        }
        self.extrinsics
            .borrow_mut()
            .push((path.to_path_buf(), report.clone()));
        Ok(())
    }
}
