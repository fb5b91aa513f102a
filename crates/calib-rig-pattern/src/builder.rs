//! Per-image 2D↔3D correspondence construction.

use crate::{
    chessboard_object_points, BoardSize, ChessboardCornerDetector, DetectedMarker, Lattice,
    MarkerDetector, MarkerMap, PatternConfig, Plane,
};
use calib_rig_core::{Correspondence, GrayImageView, LatticePoint};
use nalgebra::{Point2, Point3};
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Detector matching the configured pattern family.
pub enum PatternDetector<'a> {
    Chessboard(&'a mut dyn ChessboardCornerDetector),
    Markers(&'a mut dyn MarkerDetector),
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderError {
    #[error("pattern {pattern} needs a {needed} detector")]
    DetectorMismatch {
        pattern: &'static str,
        needed: &'static str,
    },
}

/// One drawn marker: image quad plus the object coordinate of its anchor
/// corner.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerAnnotation {
    /// Index of the rig face (configuration order) the marker belongs to.
    pub face: usize,
    pub plane: Plane,
    pub id: u32,
    pub corners: [Point2<f64>; 4],
    pub anchor_corner: usize,
    pub anchor_object: Point3<f64>,
    pub anchor_lattice: Option<LatticePoint>,
}

/// What a display sink may draw for one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum PatternAnnotations {
    #[default]
    None,
    Chessboard {
        board: BoardSize,
        corners: Vec<Point2<f64>>,
    },
    Markers(Vec<MarkerAnnotation>),
}

/// Correspondences found in one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageCorrespondences {
    pub points: Vec<Correspondence>,
    pub annotations: PatternAnnotations,
    /// Detected markers whose id is not part of any configured map.
    pub unmapped_markers: usize,
}

impl ImageCorrespondences {
    #[inline]
    pub fn is_miss(&self) -> bool {
        self.points.is_empty()
    }
}

struct FacePlan<'p> {
    plane: Plane,
    map: &'p MarkerMap,
}

enum Plan<'p, 'd> {
    Chessboard {
        board: BoardSize,
        object_points: Vec<Point3<f64>>,
        detector: &'d mut dyn ChessboardCornerDetector,
    },
    Markers {
        faces: Vec<FacePlan<'p>>,
        lattice: Option<Lattice>,
        detector: &'d mut dyn MarkerDetector,
    },
}

/// Turns detector output into ordered correspondences for the configured
/// pattern. The dispatch is resolved once in [`CorrespondenceBuilder::new`].
pub struct CorrespondenceBuilder<'p, 'd> {
    plan: Plan<'p, 'd>,
}

impl<'p, 'd> CorrespondenceBuilder<'p, 'd> {
    pub fn new(
        pattern: &'p PatternConfig,
        detector: PatternDetector<'d>,
    ) -> Result<Self, BuilderError> {
        let plan = match (pattern, detector) {
            (
                PatternConfig::Chessboard { board, square_size },
                PatternDetector::Chessboard(detector),
            ) => Plan::Chessboard {
                board: *board,
                object_points: chessboard_object_points(*board, *square_size),
                detector,
            },
            (PatternConfig::ArucoSingle(map), PatternDetector::Markers(detector)) => {
                Plan::Markers {
                    faces: vec![FacePlan {
                        plane: Plane::Xy,
                        map,
                    }],
                    lattice: None,
                    detector,
                }
            }
            (PatternConfig::ArucoBox { faces, lattice }, PatternDetector::Markers(detector)) => {
                Plan::Markers {
                    faces: faces
                        .iter()
                        .map(|f| FacePlan {
                            plane: f.plane,
                            map: &f.map,
                        })
                        .collect(),
                    lattice: Some(*lattice),
                    detector,
                }
            }
            (pattern, _) => {
                return Err(BuilderError::DetectorMismatch {
                    pattern: pattern.kind().label(),
                    needed: if pattern.is_chessboard() {
                        "chessboard"
                    } else {
                        "marker"
                    },
                })
            }
        };
        Ok(Self { plan })
    }

    /// Build the correspondence list of one image.
    ///
    /// Detector misses produce an empty list; they are never errors.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image), fields(width = image.width, height = image.height))
    )]
    pub fn build(&mut self, image: &GrayImageView<'_>) -> ImageCorrespondences {
        match &mut self.plan {
            Plan::Chessboard {
                board,
                object_points,
                detector,
            } => build_chessboard(image, *board, object_points, &mut **detector),
            Plan::Markers {
                faces,
                lattice,
                detector,
            } => build_markers(image, faces, lattice.as_ref(), &mut **detector),
        }
    }
}

fn build_chessboard(
    image: &GrayImageView<'_>,
    board: BoardSize,
    object_points: &[Point3<f64>],
    detector: &mut dyn ChessboardCornerDetector,
) -> ImageCorrespondences {
    let Some(corners) = detector.detect(image, board) else {
        return ImageCorrespondences::default();
    };
    if corners.len() != object_points.len() {
        log::debug!(
            "chessboard detector returned {} corners, expected {}",
            corners.len(),
            object_points.len()
        );
        return ImageCorrespondences::default();
    }

    let points = corners
        .iter()
        .zip(object_points)
        .map(|(&img, &obj)| Correspondence::new(img, obj))
        .collect();
    ImageCorrespondences {
        points,
        annotations: PatternAnnotations::Chessboard { board, corners },
        unmapped_markers: 0,
    }
}

fn build_markers(
    image: &GrayImageView<'_>,
    faces: &[FacePlan<'_>],
    lattice: Option<&Lattice>,
    detector: &mut dyn MarkerDetector,
) -> ImageCorrespondences {
    // One detector pass per distinct dictionary.
    let mut by_dictionary: HashMap<&str, Vec<DetectedMarker>> = HashMap::new();
    for face in faces {
        let dict = face.map.dictionary();
        if !by_dictionary.contains_key(dict) {
            by_dictionary.insert(dict, detector.detect(image, dict));
        }
    }

    let mut points = Vec::new();
    let mut annotations = Vec::new();
    let mut mapped_ids: HashMap<&str, Vec<u32>> = HashMap::new();

    for (face_idx, face) in faces.iter().enumerate() {
        let dict = face.map.dictionary();
        let detected = by_dictionary.get(dict).map(Vec::as_slice).unwrap_or(&[]);
        for marker in detected {
            let Some(layout) = face.map.corners(marker.id) else {
                continue;
            };
            mapped_ids.entry(dict).or_default().push(marker.id);

            let mut objects = [Point3::origin(); 4];
            let mut keys = [None; 4];
            for k in 0..4 {
                match lattice {
                    Some(lattice) => {
                        objects[k] = lattice.fold(&layout[k], face.plane);
                        keys[k] = Some(lattice.map(&layout[k], face.plane));
                    }
                    None => objects[k] = layout[k],
                }
                points.push(Correspondence {
                    image: marker.corners[k],
                    object: objects[k],
                    lattice: keys[k],
                });
            }

            let anchor = face.plane.anchor_corner();
            annotations.push(MarkerAnnotation {
                face: face_idx,
                plane: face.plane,
                id: marker.id,
                corners: marker.corners,
                anchor_corner: anchor,
                anchor_object: objects[anchor],
                anchor_lattice: keys[anchor],
            });
        }
    }

    let unmapped_markers = by_dictionary
        .iter()
        .map(|(dict, markers)| {
            let mapped = mapped_ids.get(dict).map(Vec::as_slice).unwrap_or(&[]);
            markers.iter().filter(|m| !mapped.contains(&m.id)).count()
        })
        .sum();

    ImageCorrespondences {
        points,
        annotations: PatternAnnotations::Markers(annotations),
        unmapped_markers,
    }
}
