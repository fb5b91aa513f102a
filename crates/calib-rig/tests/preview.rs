mod common;

use calib_rig::io::{AnnotationLabel, FrameList, OperatorKey};
use calib_rig::orchestrator::SessionState;
use calib_rig::pattern::PatternDetector;
use calib_rig::settings::Mode;
use calib_rig::{run_calibration, CalibrationStatus, Collaborators};
use common::*;

#[test]
fn preview_without_intrinsics_cannot_undistort() {
    let mut settings = settings(Mode::Preview, chessboard(4, 3));
    settings.display.undistort = true;
    let mut frames = FrameList::new(frames(3));
    let mut detector = ScriptedChessboard::new(vec![Some(grid(4, 3)); 3]);
    let solver = RecordingSolver::new();
    let mut display = ScriptedDisplay::with_keys([
        Some(OperatorKey::ToggleUndistort),
        Some(OperatorKey::ToggleLabels),
        None,
    ]);
    let reports = MemoryReports::default();

    let result = run_calibration(
        &settings,
        Collaborators {
            frames: &mut frames,
            detector: PatternDetector::Chessboard(&mut detector),
            solver: &solver,
            display: &mut display,
            reports: &reports,
        },
    )
    .expect("run");

    assert!(!result.success);
    assert_eq!(result.status, CalibrationStatus::Previewed);
    assert_eq!(result.state, SessionState::Terminated);
    assert_eq!(result.stats.frames, 3);
    assert_eq!(result.stats.accumulated_points, 0);
    assert_eq!(solver.total_calls(), 0);

    assert_eq!(display.shown.len(), 3);
    assert!(display.shown.iter().all(|s| !s.undistorted));
    assert_eq!(display.shown[1].label, AnnotationLabel::Id);
    assert_eq!(display.shown[2].label, AnnotationLabel::Coordinates);
}

#[test]
fn preview_with_intrinsics_toggles_undistortion() {
    let mut settings = settings(Mode::Preview, chessboard(4, 3));
    settings.intrinsic_guess = Some(solved_intrinsics());
    settings.display.show_coordinates = true;
    let mut frames = FrameList::new(frames(4));
    let mut detector = ScriptedChessboard::new([Some(grid(4, 3)), None, None, None]);
    let solver = RecordingSolver::new();
    let mut display = ScriptedDisplay::with_keys([
        Some(OperatorKey::ToggleUndistort),
        Some(OperatorKey::Other('x')),
        Some(OperatorKey::Quit),
    ]);
    let reports = MemoryReports::default();

    let result = run_calibration(
        &settings,
        Collaborators {
            frames: &mut frames,
            detector: PatternDetector::Chessboard(&mut detector),
            solver: &solver,
            display: &mut display,
            reports: &reports,
        },
    )
    .expect("run");

    assert_eq!(result.status, CalibrationStatus::Previewed);
    assert_eq!(result.stats.detection_misses, 2);
    assert_eq!(frames.remaining(), 1);
    let undistorted: Vec<bool> = display.shown.iter().map(|s| s.undistorted).collect();
    assert_eq!(undistorted, vec![false, true, true]);
    assert!(display
        .shown
        .iter()
        .all(|s| s.label == AnnotationLabel::Coordinates));
}
