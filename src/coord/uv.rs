//! UV-space transforms between a tile and its descendants.
//!
//! When a requested tile is not loaded yet, the renderer draws the
//! sub-rectangle of the nearest loaded ancestor instead. The transform
//! from the requested tile's UV space into the ancestor's UV space is the
//! composition of per-level child transforms, accumulated one level at a
//! time while walking up the quad-tree.

/// UV corners of a full tile, wound for viewing the sphere from outside
/// (the default sky case).
pub const UV_OUTSIDE: UvQuad = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];

/// UV corners of a full tile, wound for viewing from inside (planet case).
pub const UV_INSIDE: UvQuad = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

/// Four UV corner coordinates of a textured quad.
pub type UvQuad = [[f64; 2]; 4];

/// A 3x3 matrix used as a 2D affine transform over UV coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3(pub [[f64; 3]; 3]);

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    /// Non-uniform scale about the origin.
    pub fn scale(sx: f64, sy: f64) -> Mat3 {
        Mat3([[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Translation.
    pub fn translation(tx: f64, ty: f64) -> Mat3 {
        Mat3([[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]])
    }

    /// Matrix product `self * rhs` (apply `rhs` first, then `self`).
    pub fn mul(&self, rhs: &Mat3) -> Mat3 {
        let a = &self.0;
        let b = &rhs.0;
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
        }
        Mat3(out)
    }

    /// Transform a UV point.
    pub fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let m = &self.0;
        [
            m[0][0] * p[0] + m[0][1] * p[1] + m[0][2],
            m[1][0] * p[0] + m[1][1] * p[1] + m[1][2],
        ]
    }
}

/// Accumulate the transform that maps a tile's UV space into the UV
/// sub-rectangle occupied by its `i`-th child.
///
/// The child transform scales by 0.5 and offsets into the quadrant
/// `(i / 2, i % 2)`; the child index bits encode the `(x, y)` sub-quadrant.
/// Calling this repeatedly with the same accumulator walks down more than
/// one level: to map a tile to its grandchild following child indices
/// `0 -> 1`,
///
/// ```
/// use hipslayer::coord::{child_uv_mat, Mat3};
/// let mut m = Mat3::IDENTITY;
/// m = child_uv_mat(0, &m);
/// m = child_uv_mat(1, &m);
/// ```
pub fn child_uv_mat(i: i32, m: &Mat3) -> Mat3 {
    debug_assert!((0..4).contains(&i));
    let child = Mat3::scale(0.5, 0.5).mul(&Mat3::translation((i / 2) as f64, (i % 2) as f64));
    child.mul(m)
}
