use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rig face a marker map is mounted on.
///
/// Box rig maps are listed in the order XY, YZ, XZ by convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plane {
    #[serde(rename = "XY")]
    Xy,
    #[serde(rename = "YZ")]
    Yz,
    #[serde(rename = "XZ")]
    Xz,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown plane label {0:?} (expected XY, YZ or XZ)")]
pub struct PlaneParseError(pub String);

impl Plane {
    pub const BOX_ORDER: [Plane; 3] = [Plane::Xy, Plane::Yz, Plane::Xz];

    pub fn label(self) -> &'static str {
        match self {
            Plane::Xy => "XY",
            Plane::Yz => "YZ",
            Plane::Xz => "XZ",
        }
    }

    /// Marker corner (TL, TR, BR, BL order) that sits closest to the shared
    /// rig origin once the face is folded into the box frame. Display sinks
    /// anchor coordinate labels on it.
    pub fn anchor_corner(self) -> usize {
        match self {
            Plane::Xy => 0,
            Plane::Yz => 2,
            Plane::Xz => 3,
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Plane {
    type Err = PlaneParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "XY" => Ok(Plane::Xy),
            "YZ" => Ok(Plane::Yz),
            "XZ" => Ok(Plane::Xz),
            _ => Err(PlaneParseError(s.to_string())),
        }
    }
}
