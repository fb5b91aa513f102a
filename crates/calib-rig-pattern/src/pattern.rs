//! Pattern selection, fixed once at configuration time.

use crate::{BoardSize, Lattice, MarkerMap, Plane};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pattern family, as named in settings files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    Chessboard,
    ArucoSingle,
    ArucoBox,
}

impl PatternKind {
    pub fn label(self) -> &'static str {
        match self {
            PatternKind::Chessboard => "CHESSBOARD",
            PatternKind::ArucoSingle => "ARUCO_SINGLE",
            PatternKind::ArucoBox => "ARUCO_BOX",
        }
    }

    /// Number of marker maps the pattern needs (0 for chessboards).
    pub fn required_maps(self) -> usize {
        match self {
            PatternKind::Chessboard => 0,
            PatternKind::ArucoSingle => 1,
            PatternKind::ArucoBox => 3,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PatternKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHESSBOARD" => Ok(PatternKind::Chessboard),
            "ARUCO_SINGLE" => Ok(PatternKind::ArucoSingle),
            "ARUCO_BOX" => Ok(PatternKind::ArucoBox),
            other => Err(other.to_string()),
        }
    }
}

/// A marker map bound to its rig face.
#[derive(Clone, Debug, PartialEq)]
pub struct RigFace {
    pub plane: Plane,
    pub map: MarkerMap,
}

/// Validated pattern description.
#[derive(Clone, Debug, PartialEq)]
pub enum PatternConfig {
    Chessboard {
        board: BoardSize,
        square_size: f64,
    },
    ArucoSingle(MarkerMap),
    ArucoBox {
        faces: [RigFace; 3],
        lattice: Lattice,
    },
}

impl PatternConfig {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternConfig::Chessboard { .. } => PatternKind::Chessboard,
            PatternConfig::ArucoSingle(_) => PatternKind::ArucoSingle,
            PatternConfig::ArucoBox { .. } => PatternKind::ArucoBox,
        }
    }

    #[inline]
    pub fn is_chessboard(&self) -> bool {
        matches!(self, PatternConfig::Chessboard { .. })
    }

    /// Marker-map faces in configuration order (empty for chessboards).
    pub fn faces(&self) -> Vec<(Plane, &MarkerMap)> {
        match self {
            PatternConfig::Chessboard { .. } => Vec::new(),
            PatternConfig::ArucoSingle(map) => vec![(Plane::Xy, map)],
            PatternConfig::ArucoBox { faces, .. } => {
                faces.iter().map(|f| (f.plane, &f.map)).collect()
            }
        }
    }
}
