//! Mode-driven calibration run.
//!
//! [`run_calibration`] pulls frames until the source is exhausted, turns
//! each into correspondences and stores them per view, then finalizes:
//!
//! - `INTRINSIC`: one solver call over every image with at least
//!   [`MIN_POINTS_PER_IMAGE`] correspondences;
//! - `STEREO`: per-camera intrinsics (unless an estimate was supplied),
//!   cross-view reconciliation for marker patterns, relative pose and
//!   rectification;
//! - `PREVIEW`: nothing; frames are only detected and shown.
//!
//! Quitting from the display aborts the run without finalizing.

use crate::flags::CalibFlags;
use crate::io::{AnnotationLabel, DisplaySink, FrameSource, OperatorKey, Overlay, WaitPolicy};
use crate::report::{
    calibration_time, ExtrinsicsReport, IntrinsicsReport, ReportIoError, ReportWriter,
};
use crate::settings::{Mode, Settings};
use crate::solver::{
    CalibrationSolver, IntrinsicProblem, Rectification, RectifyProblem, SolverError,
    StereoProblem, StereoSolution,
};
use calib_rig_core::{
    reconcile, reprojection_errors, CameraIntrinsics, Correspondence, GrayImage, ImageSize,
    ReconcileStats, ReprojectionError, ReprojectionErrors, ViewCorrespondences,
};
use calib_rig_pattern::{BuilderError, CorrespondenceBuilder, PatternDetector};
use std::fmt;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Images (or stereo pairs) with fewer correspondences are not handed to
/// the solver.
pub const MIN_POINTS_PER_IMAGE: usize = 4;

/// Rectification keeps every source pixel.
pub const RECTIFY_ALPHA: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    AwaitingImage,
    Detecting,
    Accumulating,
    DoneIntrinsic,
    DoneStereo,
    PreviewLoop,
    Terminated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewSelector {
    #[default]
    Left,
    Right,
}

impl fmt::Display for ViewSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewSelector::Left => "left",
            ViewSelector::Right => "right",
        })
    }
}

/// Where the next frame is stored.
///
/// Stereo image lists interleave left and right frames, so the pair index
/// only advances after a right frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageCursor {
    pub pair_index: usize,
    pub view: ViewSelector,
}

impl ImageCursor {
    pub fn advance(self, mode: Mode) -> Self {
        match (mode, self.view) {
            (Mode::Stereo, ViewSelector::Left) => Self {
                view: ViewSelector::Right,
                ..self
            },
            _ => Self {
                pair_index: self.pair_index + 1,
                view: ViewSelector::Left,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStage {
    Intrinsic(ViewSelector),
    Stereo,
    Rectify,
}

impl fmt::Display for SolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStage::Intrinsic(view) => write!(f, "intrinsic ({view})"),
            SolveStage::Stereo => f.write_str("stereo"),
            SolveStage::Rectify => f.write_str("rectification"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FinalizeError {
    #[error("no image has enough correspondences to calibrate")]
    NoUsableImages,
    #[error("{stage} solve failed: {source}")]
    Solver {
        stage: SolveStage,
        #[source]
        source: SolverError,
    },
    #[error("{stage} solve produced non-finite values")]
    NonFinite { stage: SolveStage },
    /// The solver returned values the residual pass could not evaluate.
    /// Its intrinsics are kept for inspection.
    #[error("{stage} reprojection check failed: {source}")]
    Reprojection {
        stage: SolveStage,
        intrinsics: CameraIntrinsics,
        #[source]
        source: ReprojectionError,
    },
}

#[derive(Debug, PartialEq)]
pub enum CalibrationStatus {
    Calibrated,
    /// The operator quit before the frame source was exhausted.
    Aborted,
    /// Preview runs never calibrate.
    Previewed,
    Failed(FinalizeError),
}

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Detector(#[from] BuilderError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: usize,
    pub downsampled_frames: usize,
    pub detection_misses: usize,
    pub unmapped_markers: usize,
    /// Correspondences stored for finalization, both views.
    pub accumulated_points: usize,
    /// Images (pairs in stereo) left out of the solve for lack of points.
    pub skipped_images: usize,
    pub reconciliation: ReconcileStats,
}

/// One camera's solved intrinsics with residual diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct IntrinsicCalibration {
    pub intrinsics: CameraIntrinsics,
    pub image_size: ImageSize,
    /// Flags the solver ran with.
    pub flags: CalibFlags,
    pub errors: ReprojectionErrors,
    pub solver_rms: f64,
    /// Indices (pair indices in stereo) of the images handed to the solver.
    pub used_images: Vec<usize>,
}

impl IntrinsicCalibration {
    pub fn is_finite(&self) -> bool {
        self.intrinsics.is_finite()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StereoCalibration {
    pub left: CameraIntrinsics,
    pub right: CameraIntrinsics,
    pub solution: StereoSolution,
    pub rectification: Rectification,
    pub used_pairs: Vec<usize>,
}

#[derive(Debug)]
pub struct CalibrationResult {
    pub success: bool,
    pub status: CalibrationStatus,
    pub state: SessionState,
    /// Left (or only) camera.
    pub left: Option<IntrinsicCalibration>,
    pub right: Option<IntrinsicCalibration>,
    pub extrinsics: Option<StereoCalibration>,
    pub stats: RunStats,
    pub persistence_errors: Vec<ReportIoError>,
}

impl CalibrationResult {
    /// Per-image RMS reprojection errors of the left (or only) camera.
    pub fn per_view_errors(&self) -> &[f64] {
        self.left
            .as_ref()
            .map(|c| c.errors.per_view.as_slice())
            .unwrap_or(&[])
    }
}

/// Everything the orchestrator talks to.
pub struct Collaborators<'a> {
    pub frames: &'a mut dyn FrameSource,
    pub detector: PatternDetector<'a>,
    pub solver: &'a dyn CalibrationSolver,
    pub display: &'a mut dyn DisplaySink,
    pub reports: &'a dyn ReportWriter,
}

/// Mutable state of one run.
#[derive(Debug)]
pub struct CalibrationSession {
    mode: Mode,
    state: SessionState,
    cursor: ImageCursor,
    left: ViewCorrespondences,
    right: ViewCorrespondences,
    image_size: Option<ImageSize>,
    stats: RunStats,
}

impl CalibrationSession {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            state: SessionState::AwaitingImage,
            cursor: ImageCursor::default(),
            left: ViewCorrespondences::new(),
            right: ViewCorrespondences::new(),
            image_size: None,
            stats: RunStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cursor(&self) -> ImageCursor {
        self.cursor
    }

    pub fn left(&self) -> &ViewCorrespondences {
        &self.left
    }

    pub fn right(&self) -> &ViewCorrespondences {
        &self.right
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::trace!("session {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Halve oversized frames and track the calibration image size.
    fn prepare(&mut self, frame: GrayImage, max_width: Option<u32>) -> GrayImage {
        self.stats.frames += 1;
        let frame = match max_width {
            Some(max) if frame.width > max as usize => {
                self.stats.downsampled_frames += 1;
                frame.downsample_half()
            }
            _ => frame,
        };
        let size = frame.size();
        match self.image_size {
            None => self.image_size = Some(size),
            Some(known) if known != size => log::warn!(
                "frame {} is {}x{}, calibrating at {}x{}",
                self.stats.frames,
                size.width,
                size.height,
                known.width,
                known.height
            ),
            Some(_) => {}
        }
        frame
    }

    /// Store one image's correspondences at the cursor and advance it.
    ///
    /// Misses still occupy their slot so stereo pairs stay aligned.
    pub fn record(&mut self, points: Vec<Correspondence>) {
        let ImageCursor { pair_index, view } = self.cursor;
        if points.is_empty() {
            self.stats.detection_misses += 1;
            log::debug!("{view} image {pair_index}: pattern not found");
        } else {
            log::debug!("{view} image {pair_index}: {} correspondences", points.len());
        }
        self.stats.accumulated_points += points.len();
        let target = match view {
            ViewSelector::Left => &mut self.left,
            ViewSelector::Right => &mut self.right,
        };
        target.extend_image(pair_index, points);
        self.cursor = self.cursor.advance(self.mode);
    }

    fn into_result(self, status: CalibrationStatus) -> CalibrationResult {
        CalibrationResult {
            success: false,
            status,
            state: self.state,
            left: None,
            right: None,
            extrinsics: None,
            stats: self.stats,
            persistence_errors: Vec::new(),
        }
    }
}

/// Run one calibration (or preview) session to completion.
///
/// Only a detector that does not fit the configured pattern is an error;
/// every other failure is reported through [`CalibrationResult::status`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(settings, collab), fields(mode = %settings.mode, pattern = %settings.pattern.kind()))
)]
pub fn run_calibration(
    settings: &Settings,
    collab: Collaborators<'_>,
) -> Result<CalibrationResult, RunError> {
    let Collaborators {
        frames,
        detector,
        solver,
        display,
        reports,
    } = collab;
    let mut builder = CorrespondenceBuilder::new(&settings.pattern, detector)?;
    let mut session = CalibrationSession::new(settings.mode);
    let wait = WaitPolicy::for_step_mode(settings.display.wait);
    let label = if settings.display.show_coordinates {
        AnnotationLabel::Coordinates
    } else {
        AnnotationLabel::Id
    };

    if settings.mode == Mode::Preview {
        run_preview(settings, &mut session, &mut builder, frames, display, wait, label);
        return Ok(session.into_result(CalibrationStatus::Previewed));
    }

    loop {
        session.transition(SessionState::AwaitingImage);
        let Some(frame) = frames.next_frame() else {
            break;
        };
        let frame = session.prepare(frame, settings.max_frame_width);

        session.transition(SessionState::Detecting);
        let found = builder.build(&frame.view());
        session.stats.unmapped_markers += found.unmapped_markers;

        session.transition(SessionState::Accumulating);
        display.show(
            &frame.view(),
            Overlay {
                annotations: &found.annotations,
                label,
                undistort: None,
            },
        );
        session.record(found.points);

        if display.poll_key(wait) == Some(OperatorKey::Quit) {
            log::info!("calibration aborted by operator");
            session.transition(SessionState::Terminated);
            return Ok(session.into_result(CalibrationStatus::Aborted));
        }
    }

    log::info!(
        "{} frames read, {} without the pattern",
        session.stats.frames,
        session.stats.detection_misses
    );

    Ok(match settings.mode {
        Mode::Stereo => finalize_stereo(settings, session, solver, reports),
        _ => finalize_intrinsic(settings, session, solver, reports),
    })
}

fn run_preview(
    settings: &Settings,
    session: &mut CalibrationSession,
    builder: &mut CorrespondenceBuilder<'_, '_>,
    frames: &mut dyn FrameSource,
    display: &mut dyn DisplaySink,
    wait: WaitPolicy,
    mut label: AnnotationLabel,
) {
    session.transition(SessionState::PreviewLoop);
    let mut undistort = settings.display.undistort;

    while let Some(frame) = frames.next_frame() {
        let frame = session.prepare(frame, settings.max_frame_width);
        let found = builder.build(&frame.view());
        if found.is_miss() {
            session.stats.detection_misses += 1;
        }
        session.stats.unmapped_markers += found.unmapped_markers;

        if undistort && settings.intrinsic_guess.is_none() {
            log::warn!("undistorted preview requires an intrinsic input");
            undistort = false;
        }
        display.show(
            &frame.view(),
            Overlay {
                annotations: &found.annotations,
                label,
                undistort: settings.intrinsic_guess.as_ref().filter(|_| undistort),
            },
        );

        match display.poll_key(wait) {
            Some(OperatorKey::Quit) => break,
            Some(OperatorKey::ToggleUndistort) => undistort = !undistort,
            Some(OperatorKey::ToggleLabels) => label = label.toggled(),
            _ => {}
        }
    }
    session.transition(SessionState::Terminated);
}

fn calibrate_view(
    view: &ViewCorrespondences,
    image_size: ImageSize,
    settings: &Settings,
    solver: &dyn CalibrationSolver,
    stage: SolveStage,
    stats: &mut RunStats,
) -> Result<IntrinsicCalibration, FinalizeError> {
    let used = view.usable_images(MIN_POINTS_PER_IMAGE);
    stats.skipped_images += view.image_count() - used.len();
    if used.is_empty() {
        return Err(FinalizeError::NoUsableImages);
    }

    let (initial, flags) = match &settings.intrinsic_guess {
        Some(guess) => (
            guess.clone(),
            settings.flags | CalibFlags::USE_INTRINSIC_GUESS,
        ),
        None => (CameraIntrinsics::identity(), settings.flags),
    };
    let problem = IntrinsicProblem {
        image_size,
        object_points: view.object_points(&used),
        image_points: view.image_points(&used),
        initial,
        aspect_ratio: settings.aspect_ratio,
        flags,
    };
    let solution = solver
        .calibrate_camera(&problem)
        .map_err(|source| FinalizeError::Solver { stage, source })?;
    let errors = match reprojection_errors(
        &solution.intrinsics,
        &solution.poses,
        &problem.object_points,
        &problem.image_points,
    ) {
        Ok(errors) => errors,
        Err(source) => {
            return Err(FinalizeError::Reprojection {
                stage,
                intrinsics: solution.intrinsics,
                source,
            })
        }
    };
    log::info!(
        "{stage} calibration over {} images: avg reprojection error {:.4}",
        used.len(),
        errors.total
    );

    Ok(IntrinsicCalibration {
        intrinsics: solution.intrinsics,
        image_size,
        flags,
        errors,
        solver_rms: solution.rms,
        used_images: used,
    })
}

#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
fn finalize_intrinsic(
    settings: &Settings,
    mut session: CalibrationSession,
    solver: &dyn CalibrationSolver,
    reports: &dyn ReportWriter,
) -> CalibrationResult {
    let image_size = session.image_size.unwrap_or_default();
    let stage = SolveStage::Intrinsic(ViewSelector::Left);
    let outcome = calibrate_view(
        &session.left,
        image_size,
        settings,
        solver,
        stage,
        &mut session.stats,
    );
    session.transition(SessionState::DoneIntrinsic);

    let calib = match outcome {
        Ok(calib) => calib,
        Err(e) => {
            log::error!("intrinsic calibration failed: {e}");
            return session.into_result(CalibrationStatus::Failed(e));
        }
    };

    let mut persistence_errors = Vec::new();
    let status = if calib.is_finite() {
        if let Some(path) = &settings.outputs.intrinsic {
            let report = IntrinsicsReport::new(settings, &calib, calibration_time());
            match reports.write_intrinsics(path, &report) {
                Ok(()) => log::info!("intrinsics written to {}", path.display()),
                Err(e) => {
                    log::error!("cannot write {}: {e}", path.display());
                    persistence_errors.push(e);
                }
            }
        }
        CalibrationStatus::Calibrated
    } else {
        log::error!("intrinsic calibration produced non-finite values");
        CalibrationStatus::Failed(FinalizeError::NonFinite { stage })
    };

    let success = status == CalibrationStatus::Calibrated;
    CalibrationResult {
        success,
        left: Some(calib),
        persistence_errors,
        ..session.into_result(status)
    }
}

#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
fn finalize_stereo(
    settings: &Settings,
    mut session: CalibrationSession,
    solver: &dyn CalibrationSolver,
    reports: &dyn ReportWriter,
) -> CalibrationResult {
    let mut left = None;
    let mut right = None;
    let outcome = solve_stereo(settings, &mut session, solver, &mut left, &mut right);
    session.transition(SessionState::DoneStereo);

    let mut persistence_errors = Vec::new();
    let (status, extrinsics) = match outcome {
        Ok(stereo) => {
            if let Some(path) = &settings.outputs.extrinsic {
                let report = ExtrinsicsReport::new(settings, &stereo, calibration_time());
                match reports.write_extrinsics(path, &report) {
                    Ok(()) => log::info!("extrinsics written to {}", path.display()),
                    Err(e) => {
                        log::error!("cannot write {}: {e}", path.display());
                        persistence_errors.push(e);
                    }
                }
            }
            (CalibrationStatus::Calibrated, Some(stereo))
        }
        Err(e) => {
            log::error!("stereo calibration failed: {e}");
            (CalibrationStatus::Failed(e), None)
        }
    };

    let success = status == CalibrationStatus::Calibrated;
    CalibrationResult {
        success,
        left,
        right,
        extrinsics,
        persistence_errors,
        ..session.into_result(status)
    }
}

fn calibrate_stereo_view(
    session: &mut CalibrationSession,
    view: ViewSelector,
    image_size: ImageSize,
    settings: &Settings,
    solver: &dyn CalibrationSolver,
    out: &mut Option<IntrinsicCalibration>,
) -> Result<CameraIntrinsics, FinalizeError> {
    let stage = SolveStage::Intrinsic(view);
    let data = match view {
        ViewSelector::Left => &session.left,
        ViewSelector::Right => &session.right,
    };
    let calib = out.insert(calibrate_view(
        data,
        image_size,
        settings,
        solver,
        stage,
        &mut session.stats,
    )?);
    if !calib.is_finite() {
        return Err(FinalizeError::NonFinite { stage });
    }
    Ok(calib.intrinsics.clone())
}

fn solve_stereo(
    settings: &Settings,
    session: &mut CalibrationSession,
    solver: &dyn CalibrationSolver,
    left_out: &mut Option<IntrinsicCalibration>,
    right_out: &mut Option<IntrinsicCalibration>,
) -> Result<StereoCalibration, FinalizeError> {
    let image_size = session.image_size.unwrap_or_default();

    let (left_k, right_k) = match &settings.intrinsic_guess {
        Some(guess) => (guess.clone(), guess.clone()),
        None => {
            let left = calibrate_stereo_view(
                session,
                ViewSelector::Left,
                image_size,
                settings,
                solver,
                left_out,
            )?;
            let right = calibrate_stereo_view(
                session,
                ViewSelector::Right,
                image_size,
                settings,
                solver,
                right_out,
            )?;
            (left, right)
        }
    };

    let (left_view, right_view) = if settings.pattern.is_chessboard() {
        (session.left.clone(), session.right.clone())
    } else {
        let outcome = reconcile(&session.left, &session.right);
        if outcome.stats.dropped() > 0 {
            log::warn!(
                "reconciliation kept {} shared points, dropped {} left / {} right",
                outcome.stats.shared,
                outcome.stats.dropped_a,
                outcome.stats.dropped_b
            );
        }
        session.stats.reconciliation = outcome.stats;
        (outcome.a, outcome.b)
    };

    let pair_count = left_view.image_count().max(right_view.image_count());
    let pairs: Vec<usize> = (0..pair_count)
        .filter(|&i| {
            left_view.image(i).len() >= MIN_POINTS_PER_IMAGE
                && right_view.image(i).len() >= MIN_POINTS_PER_IMAGE
        })
        .collect();
    session.stats.skipped_images += pair_count - pairs.len();
    if pairs.is_empty() {
        return Err(FinalizeError::NoUsableImages);
    }

    let problem = StereoProblem {
        image_size,
        object_points: left_view.object_points(&pairs),
        left_points: left_view.image_points(&pairs),
        right_points: right_view.image_points(&pairs),
        left: left_k.clone(),
        right: right_k.clone(),
        flags: CalibFlags::FIX_INTRINSIC,
    };
    let solution = solver
        .stereo_calibrate(&problem)
        .map_err(|source| FinalizeError::Solver {
            stage: SolveStage::Stereo,
            source,
        })?;
    log::info!(
        "stereo calibration over {} pairs: reprojection error {:.4}",
        pairs.len(),
        solution.rms
    );
    if !solution.is_finite() {
        return Err(FinalizeError::NonFinite {
            stage: SolveStage::Stereo,
        });
    }

    let rectification = solver
        .stereo_rectify(&RectifyProblem {
            image_size,
            left: left_k.clone(),
            right: right_k.clone(),
            rotation: solution.rotation,
            translation: solution.translation,
            flags: CalibFlags::ZERO_DISPARITY,
            alpha: RECTIFY_ALPHA,
        })
        .map_err(|source| FinalizeError::Solver {
            stage: SolveStage::Rectify,
            source,
        })?;
    if !rectification.is_finite() {
        return Err(FinalizeError::NonFinite {
            stage: SolveStage::Rectify,
        });
    }

    Ok(StereoCalibration {
        left: left_k,
        right: right_k,
        solution,
        rectification,
        used_pairs: pairs,
    })
}
