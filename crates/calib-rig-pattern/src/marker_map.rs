//! Marker maps: known 3D corner layouts of planar ArUco marker sets.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::Path};

/// One marker of a map, corners ordered TL, TR, BR, BL as the detector
/// reports them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub id: u32,
    pub corners: [[f64; 3]; 4],
}

/// On-disk marker map description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerMapSpec {
    /// Dictionary name handed to the marker detector (e.g. `ARUCO_MIP_36h12`).
    pub dictionary: String,
    pub markers: Vec<MapMarker>,
}

/// Marker map loading / validation errors.
#[derive(thiserror::Error, Debug)]
pub enum MarkerMapError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("marker map has an empty dictionary name")]
    MissingDictionary,
    #[error("marker map has no markers")]
    Empty,
    #[error("marker id {0} appears more than once")]
    DuplicateId(u32),
    #[error("marker id {0} has a non-finite corner coordinate")]
    NonFiniteCorner(u32),
}

/// Validated marker map with id lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerMap {
    dictionary: String,
    markers: Vec<MapMarker>,
    index: HashMap<u32, usize>,
}

impl MarkerMap {
    /// Validate a spec and build the id index.
    pub fn new(spec: MarkerMapSpec) -> Result<Self, MarkerMapError> {
        if spec.dictionary.trim().is_empty() {
            return Err(MarkerMapError::MissingDictionary);
        }
        if spec.markers.is_empty() {
            return Err(MarkerMapError::Empty);
        }

        let mut index = HashMap::with_capacity(spec.markers.len());
        for (k, m) in spec.markers.iter().enumerate() {
            if m.corners.iter().flatten().any(|c| !c.is_finite()) {
                return Err(MarkerMapError::NonFiniteCorner(m.id));
            }
            if index.insert(m.id, k).is_some() {
                return Err(MarkerMapError::DuplicateId(m.id));
            }
        }

        Ok(Self {
            dictionary: spec.dictionary,
            markers: spec.markers,
            index,
        })
    }

    /// Load and validate a JSON marker map.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, MarkerMapError> {
        let raw = fs::read_to_string(path)?;
        let spec: MarkerMapSpec = serde_json::from_str(&raw)?;
        Self::new(spec)
    }

    /// Write the map back as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), MarkerMapError> {
        let json = serde_json::to_string_pretty(&self.spec())?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn spec(&self) -> MarkerMapSpec {
        MarkerMapSpec {
            dictionary: self.dictionary.clone(),
            markers: self.markers.clone(),
        }
    }

    #[inline]
    pub fn dictionary(&self) -> &str {
        &self.dictionary
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.index.contains_key(&id)
    }

    /// The four 3D corners of marker `id`, if the map knows it.
    pub fn corners(&self, id: u32) -> Option<[Point3<f64>; 4]> {
        let m = &self.markers[*self.index.get(&id)?];
        Some(m.corners.map(|[x, y, z]| Point3::new(x, y, z)))
    }

    /// Iterate every corner of every marker.
    pub fn all_corners(&self) -> impl Iterator<Item = Point3<f64>> + '_ {
        self.markers
            .iter()
            .flat_map(|m| m.corners.iter().map(|&[x, y, z]| Point3::new(x, y, z)))
    }
}
