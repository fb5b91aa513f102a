use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Chessboard size in **inner corners** per row (`width`) and column (`height`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSize {
    pub width: u32,
    pub height: u32,
}

impl BoardSize {
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Object points of the inner-corner grid, row-major, `z = 0`.
///
/// Matches the corner order chessboard detectors report: row by row, each
/// row left to right.
pub fn chessboard_object_points(board: BoardSize, square_size: f64) -> Vec<Point3<f64>> {
    let mut out = Vec::with_capacity(board.corner_count());
    for i in 0..board.height {
        for j in 0..board.width {
            out.push(Point3::new(
                j as f64 * square_size,
                i as f64 * square_size,
                0.0,
            ));
        }
    }
    out
}
