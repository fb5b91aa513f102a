mod common;

use approx::assert_relative_eq;
use calib_rig::core::{LatticePoint, ReconcileStats};
use calib_rig::io::FrameList;
use calib_rig::orchestrator::{FinalizeError, SessionState, SolveStage, ViewSelector};
use calib_rig::pattern::{
    Lattice, MapMarker, MarkerMap, MarkerMapSpec, PatternAnnotations, PatternConfig,
    PatternDetector, Plane, RigFace,
};
use calib_rig::settings::Mode;
use calib_rig::{run_calibration, CalibFlags, CalibrationStatus, Collaborators};
use common::*;
use nalgebra::{Point2, Point3};
use std::path::PathBuf;

/// One 125×125 marker whose top-left corner sits at `(x0, 125)` on its face.
fn face_map(id: u32, x0: f64) -> MarkerMap {
    MarkerMap::new(MarkerMapSpec {
        dictionary: DICTIONARY.into(),
        markers: vec![MapMarker {
            id,
            corners: [
                [x0, 125.0, 0.0],
                [x0 + 125.0, 125.0, 0.0],
                [x0 + 125.0, 0.0, 0.0],
                [x0, 0.0, 0.0],
            ],
        }],
    })
    .expect("face map")
}

fn box_rig() -> PatternConfig {
    PatternConfig::ArucoBox {
        faces: [
            RigFace {
                plane: Plane::Xy,
                map: face_map(10, -1000.0),
            },
            RigFace {
                plane: Plane::Yz,
                map: face_map(20, 875.0),
            },
            RigFace {
                plane: Plane::Xz,
                map: face_map(30, 0.0),
            },
        ],
        lattice: Lattice::default(),
    }
}

#[test]
fn single_map_pairs_are_reconciled_before_the_stereo_solve() {
    let mut settings = settings(Mode::Stereo, PatternConfig::ArucoSingle(row_map(&[1, 2, 3])));
    settings.outputs.extrinsic = Some(PathBuf::from("extrinsics.json"));
    let mut frames = FrameList::new(frames(4));
    let mut detector = ScriptedMarkers::new([
        vec![marker(1, 0.0), marker(2, 40.0)],
        vec![marker(2, 0.0), marker(3, 40.0)],
        vec![marker(1, 0.0), marker(2, 40.0), marker(3, 80.0)],
        vec![marker(3, 0.0)],
    ]);
    let solver = RecordingSolver::new();
    let mut display = ScriptedDisplay::default();
    let reports = MemoryReports::default();

    let result = run_calibration(
        &settings,
        Collaborators {
            frames: &mut frames,
            detector: PatternDetector::Markers(&mut detector),
            solver: &solver,
            display: &mut display,
            reports: &reports,
        },
    )
    .expect("run");

    assert!(result.success, "{:?}", result.status);
    assert_eq!(result.state, SessionState::DoneStereo);
    assert_eq!(
        result.stats.reconciliation,
        ReconcileStats {
            shared: 8,
            dropped_a: 12,
            dropped_b: 4,
        }
    );

    // Each camera is calibrated on its own, unreconciled data.
    let intrinsic = solver.intrinsic_calls.borrow();
    assert_eq!(intrinsic.len(), 2);
    assert_eq!(intrinsic[0].object_points[1].len(), 12);
    assert_eq!(intrinsic[1].object_points[1].len(), 4);
    assert!(result.left.is_some() && result.right.is_some());

    let stereo = solver.stereo_calls.borrow();
    assert_eq!(stereo.len(), 1);
    let problem = &stereo[0];
    assert_eq!(problem.flags, CalibFlags::FIX_INTRINSIC);
    assert_eq!(problem.object_points.len(), 2);
    assert!(problem.object_points.iter().all(|v| v.len() == 4));
    assert_eq!(problem.object_points[0][0], Point3::new(100.0, 100.0, 0.0));
    assert_eq!(problem.object_points[1][0], Point3::new(200.0, 100.0, 0.0));
    assert_eq!(problem.left_points[0][0], Point2::new(40.0, 10.0));
    assert_eq!(problem.right_points[0][0], Point2::new(0.0, 10.0));
    assert_eq!(problem.left_points[1][0], Point2::new(80.0, 10.0));
    assert_eq!(problem.left, solved_intrinsics());

    let rectify = solver.rectify_calls.borrow();
    assert_eq!(rectify.len(), 1);
    assert_eq!(rectify[0].flags, CalibFlags::ZERO_DISPARITY);
    assert_relative_eq!(rectify[0].alpha, 1.0);
    assert_relative_eq!(rectify[0].translation.x, -60.0);

    let extrinsics = result.extrinsics.as_ref().expect("extrinsics");
    assert_eq!(extrinsics.used_pairs, vec![0, 1]);

    let written = reports.extrinsics.borrow();
    assert_eq!(written.len(), 1);
    let report = &written[0].1;
    assert_relative_eq!(report.reprojection_error, 0.25);
    assert_relative_eq!(report.stereo_parameters.translation_vector.x, -60.0);
    assert!(reports.intrinsics.borrow().is_empty());
}

#[test]
fn box_faces_share_edge_corners_across_views() {
    let mut settings = settings(Mode::Stereo, box_rig());
    settings.intrinsic_guess = Some(solved_intrinsics());
    let mut frames = FrameList::new(frames(2));
    let mut detector = ScriptedMarkers::new([
        vec![marker(10, 0.0), marker(20, 100.0)],
        vec![marker(20, 300.0)],
    ]);
    let solver = RecordingSolver::new();
    let mut display = ScriptedDisplay::default();
    let reports = MemoryReports::default();

    let result = run_calibration(
        &settings,
        Collaborators {
            frames: &mut frames,
            detector: PatternDetector::Markers(&mut detector),
            solver: &solver,
            display: &mut display,
            reports: &reports,
        },
    )
    .expect("run");

    assert!(result.success, "{:?}", result.status);
    assert_eq!(detector.calls, 2);
    assert_eq!(
        result.stats.reconciliation,
        ReconcileStats {
            shared: 4,
            dropped_a: 4,
            dropped_b: 0,
        }
    );

    let stereo = solver.stereo_calls.borrow();
    let problem = &stereo[0];
    assert_eq!(
        problem.object_points[0],
        vec![
            Point3::new(0.0, 1125.0, 0.0),
            Point3::new(0.0, 1000.0, 0.0),
            Point3::new(0.0, 1125.0, 125.0),
            Point3::new(0.0, 1000.0, 125.0),
        ]
    );
    // The left camera's XY corners pair with the right camera's YZ corners.
    assert_eq!(
        problem.left_points[0],
        vec![
            Point2::new(0.0, 10.0),
            Point2::new(0.0, 30.0),
            Point2::new(100.0, 10.0),
            Point2::new(100.0, 30.0),
        ]
    );
    assert_eq!(
        problem.right_points[0],
        vec![
            Point2::new(320.0, 10.0),
            Point2::new(320.0, 30.0),
            Point2::new(300.0, 10.0),
            Point2::new(300.0, 30.0),
        ]
    );
    assert_eq!(solver.intrinsic_calls.borrow().len(), 0);
    assert!(result.left.is_none());
}

#[test]
fn box_frames_are_annotated_with_lattice_anchors() {
    let mut settings = settings(Mode::Stereo, box_rig());
    settings.intrinsic_guess = Some(solved_intrinsics());
    let config = settings.pattern.clone();
    let mut detector = ScriptedMarkers::new([vec![marker(20, 0.0)]]);
    let mut builder = calib_rig::pattern::CorrespondenceBuilder::new(
        &config,
        PatternDetector::Markers(&mut detector),
    )
    .expect("builder");
    let frame = calib_rig::core::GrayImage::blank(8, 8);

    let found = builder.build(&frame.view());
    let PatternAnnotations::Markers(markers) = found.annotations else {
        panic!("expected marker annotations");
    };
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].plane, Plane::Yz);
    assert_eq!(markers[0].anchor_corner, 2);
    assert_eq!(markers[0].anchor_lattice, Some(LatticePoint::new(0, 8, 0)));
}

#[test]
fn chessboard_pairs_with_a_miss_are_skipped() {
    let mut settings = settings(Mode::Stereo, chessboard(4, 3));
    settings.intrinsic_guess = Some(solved_intrinsics());
    let mut frames = FrameList::new(frames(4));
    let mut detector = ScriptedChessboard::new([
        Some(grid(4, 3)),
        Some(grid(4, 3)),
        None,
        Some(grid(4, 3)),
    ]);
    let solver = RecordingSolver::new();
    let mut display = ScriptedDisplay::default();
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

    assert!(result.success);
    assert_eq!(result.stats.skipped_images, 1);
    assert_eq!(result.stats.reconciliation, ReconcileStats::default());
    assert_eq!(solver.intrinsic_calls.borrow().len(), 0);
    let stereo = solver.stereo_calls.borrow();
    assert_eq!(stereo[0].object_points.len(), 1);
    assert_eq!(stereo[0].object_points[0].len(), 12);
    assert_eq!(
        result.extrinsics.as_ref().map(|e| e.used_pairs.clone()),
        Some(vec![0])
    );
}

#[test]
fn non_finite_camera_stops_before_the_stereo_solve() {
    let settings = settings(Mode::Stereo, chessboard(4, 3));
    let mut frames = FrameList::new(frames(2));
    let mut detector = ScriptedChessboard::new(vec![Some(grid(4, 3)); 2]);
    let solver = RecordingSolver::with_outcome(Outcome::NonFinite);
    let mut display = ScriptedDisplay::default();
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
    assert_eq!(
        result.status,
        CalibrationStatus::Failed(FinalizeError::NonFinite {
            stage: SolveStage::Intrinsic(ViewSelector::Left)
        })
    );
    assert!(result.left.is_some());
    assert!(solver.stereo_calls.borrow().is_empty());
    assert!(reports.extrinsics.borrow().is_empty());
}
