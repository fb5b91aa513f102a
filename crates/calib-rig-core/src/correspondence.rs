//! 2D↔3D correspondences and their per-image grouping.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Integer lattice coordinates of an object point.
///
/// Marker-map geometry is snapped onto a shared low-resolution lattice so
/// that the same physical corner, described independently by two rig faces
/// or observed by two cameras, compares exactly equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LatticePoint {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl LatticePoint {
    #[inline]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

/// One observed image point paired with its physical location.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    /// Pixel position in the image.
    pub image: Point2<f64>,
    /// Object point in the pattern frame (user metric unit).
    pub object: Point3<f64>,
    /// Lattice key for marker-map geometry; `None` for chessboard grids.
    #[serde(default)]
    pub lattice: Option<LatticePoint>,
}

impl Correspondence {
    pub fn new(image: Point2<f64>, object: Point3<f64>) -> Self {
        Self {
            image,
            object,
            lattice: None,
        }
    }

    pub fn with_lattice(image: Point2<f64>, object: Point3<f64>, lattice: LatticePoint) -> Self {
        Self {
            image,
            object,
            lattice: Some(lattice),
        }
    }

    /// Whether two correspondences refer to the same physical object point.
    ///
    /// Lattice keys are compared when both sides carry one; otherwise the
    /// object coordinates must be bitwise equal.
    #[inline]
    pub fn same_object(&self, other: &Correspondence) -> bool {
        match (self.lattice, other.lattice) {
            (Some(a), Some(b)) => a == b,
            _ => self.object == other.object,
        }
    }
}

/// Correspondence lists of one camera, indexed by image (or stereo pair)
/// index. Slots stay in place when a detection misses so that index `i`
/// always refers to the same capture.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewCorrespondences {
    images: Vec<Vec<Correspondence>>,
}

impl ViewCorrespondences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size with `count` empty image slots.
    pub fn with_images(count: usize) -> Self {
        Self {
            images: vec![Vec::new(); count],
        }
    }

    pub fn from_images(images: Vec<Vec<Correspondence>>) -> Self {
        Self { images }
    }

    /// Mutable slot for image `index`, growing the list when needed.
    pub fn slot_mut(&mut self, index: usize) -> &mut Vec<Correspondence> {
        if self.images.len() <= index {
            self.images.resize_with(index + 1, Vec::new);
        }
        &mut self.images[index]
    }

    /// Append a batch to image `index`.
    pub fn extend_image(&mut self, index: usize, points: impl IntoIterator<Item = Correspondence>) {
        self.slot_mut(index).extend(points);
    }

    #[inline]
    pub fn image(&self, index: usize) -> &[Correspondence] {
        self.images.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn images(&self) -> &[Vec<Correspondence>] {
        &self.images
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Total number of correspondences over all images.
    pub fn total_points(&self) -> usize {
        self.images.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_points() == 0
    }

    /// Indices of images holding at least `min_points` correspondences.
    pub fn usable_images(&self, min_points: usize) -> Vec<usize> {
        self.images
            .iter()
            .enumerate()
            .filter(|(_, pts)| pts.len() >= min_points)
            .map(|(i, _)| i)
            .collect()
    }

    /// Object points of the selected images, in selection order.
    pub fn object_points(&self, indices: &[usize]) -> Vec<Vec<Point3<f64>>> {
        indices
            .iter()
            .map(|&i| self.image(i).iter().map(|c| c.object).collect())
            .collect()
    }

    /// Image points of the selected images, in selection order.
    pub fn image_points(&self, indices: &[usize]) -> Vec<Vec<Point2<f64>>> {
        indices
            .iter()
            .map(|&i| self.image(i).iter().map(|c| c.image).collect())
            .collect()
    }
}
