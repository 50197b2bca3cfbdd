//! Planar homography from four point correspondences.
//!
//! The 3x3 transform is solved with the direct linear transform: each
//! correspondence contributes two rows to an 8x8 system with `h33 = 1`.
//! Points are Hartley-normalized (centroid at the origin, mean distance
//! √2) before solving so that the pivot threshold means the same thing for
//! a 64-pixel thumbnail and a 4K frame; the solution is denormalized and
//! rescaled back to `h33 = 1`.

use crate::types::{DrapeError, DrapeResult, Mat3, PixelPoint, Quad};
use serde::{Deserialize, Serialize};

/// Numerical thresholds for homography solving
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomographyParams {
    /// Smallest accepted pivot magnitude in the 8x8 elimination
    pub pivot_epsilon: f64,
    /// Smallest accepted |det| when inverting
    pub determinant_epsilon: f64,
}

impl Default for HomographyParams {
    fn default() -> Self {
        Self {
            pivot_epsilon: 1e-12,
            determinant_epsilon: 1e-12,
        }
    }
}

/// Projective transform together with its inverse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Mat3,
    inverse: Mat3,
}

impl Homography {
    /// Solve the transform taking `source[i]` to `destination[i]` and invert it
    pub fn from_correspondences(
        source: &Quad,
        destination: &Quad,
        params: &HomographyParams,
    ) -> DrapeResult<Self> {
        let matrix = compute_homography(source, destination, params)?;
        let inverse = invert_3x3(&matrix, params.determinant_epsilon)?;
        Ok(Self { matrix, inverse })
    }

    /// Source -> destination
    pub fn matrix(&self) -> &Mat3 {
        &self.matrix
    }

    /// Destination -> source
    pub fn inverse(&self) -> &Mat3 {
        &self.inverse
    }

    pub fn apply(&self, point: PixelPoint) -> Option<PixelPoint> {
        project(&self.matrix, point)
    }

    pub fn apply_inverse(&self, point: PixelPoint) -> Option<PixelPoint> {
        project(&self.inverse, point)
    }
}

/// Apply a homography to a point; `None` when it maps to infinity
pub fn project(matrix: &Mat3, point: PixelPoint) -> Option<PixelPoint> {
    let [x, y] = point;
    let w = matrix[(2, 0)] * x + matrix[(2, 1)] * y + matrix[(2, 2)];
    if w == 0.0 || !w.is_finite() {
        return None;
    }
    Some([
        (matrix[(0, 0)] * x + matrix[(0, 1)] * y + matrix[(0, 2)]) / w,
        (matrix[(1, 0)] * x + matrix[(1, 1)] * y + matrix[(1, 2)]) / w,
    ])
}

/// Solve the homography mapping each source corner to the matching
/// destination corner, normalized so the bottom-right entry is 1.
///
/// Fails with `SingularMatrix` when the correspondences are degenerate
/// (three or more collinear points) and with `DegenerateQuad` when a quad
/// has non-finite or coincident points.
pub fn compute_homography(
    source: &Quad,
    destination: &Quad,
    params: &HomographyParams,
) -> DrapeResult<Mat3> {
    let src_norm = normalizing_transform(source)?;
    let dst_norm = normalizing_transform(destination)?;

    let mut a = [[0.0f64; 8]; 8];
    let mut b = [0.0f64; 8];
    for i in 0..4 {
        let [x, y] = apply_affine(&src_norm, source[i]);
        let [u, v] = apply_affine(&dst_norm, destination[i]);

        a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y];
        b[2 * i] = u;
        a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y];
        b[2 * i + 1] = v;
    }

    let h = solve_linear(a, b, params.pivot_epsilon)?;
    let normalized = Mat3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);

    let dst_denorm = invert_3x3(&dst_norm, params.determinant_epsilon)?;
    let matrix = dst_denorm * normalized * src_norm;

    let scale = matrix[(2, 2)];
    if scale.abs() < params.pivot_epsilon {
        return Err(DrapeError::SingularMatrix {
            pivot: scale,
            epsilon: params.pivot_epsilon,
        });
    }
    let matrix = matrix / scale;

    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(DrapeError::Processing(
            "Homography contains non-finite entries".to_string(),
        ));
    }
    log::debug!("Homography: {:?}", matrix);
    Ok(matrix)
}

/// Closed-form adjugate inverse of a 3x3 matrix
pub fn invert_3x3(m: &Mat3, determinant_epsilon: f64) -> DrapeResult<Mat3> {
    let (a, b, c) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (d, e, f) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
    let (g, h, i) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);

    let c00 = e * i - f * h;
    let c01 = -(d * i - f * g);
    let c02 = d * h - e * g;

    let det = a * c00 + b * c01 + c * c02;
    if !(det.abs() >= determinant_epsilon) {
        return Err(DrapeError::SingularMatrix {
            pivot: det,
            epsilon: determinant_epsilon,
        });
    }

    let c10 = -(b * i - c * h);
    let c11 = a * i - c * g;
    let c12 = -(a * h - b * g);
    let c20 = b * f - c * e;
    let c21 = -(a * f - c * d);
    let c22 = a * e - b * d;

    // inverse = adjugate / det, adjugate = transposed cofactors
    Ok(Mat3::new(
        c00, c10, c20,
        c01, c11, c21,
        c02, c12, c22,
    ) / det)
}

/// Gaussian elimination with partial pivoting
fn solve_linear(mut a: [[f64; 8]; 8], mut b: [f64; 8], pivot_epsilon: f64) -> DrapeResult<[f64; 8]> {
    const N: usize = 8;

    for col in 0..N {
        let mut pivot_row = col;
        for row in col + 1..N {
            if a[row][col].abs() > a[pivot_row][col].abs() {
                pivot_row = row;
            }
        }

        let pivot = a[pivot_row][col];
        if !(pivot.abs() >= pivot_epsilon) {
            return Err(DrapeError::SingularMatrix {
                pivot,
                epsilon: pivot_epsilon,
            });
        }

        if pivot_row != col {
            a.swap(pivot_row, col);
            b.swap(pivot_row, col);
        }

        for row in col + 1..N {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; N];
    for row in (0..N).rev() {
        let mut sum = b[row];
        for k in row + 1..N {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Ok(x)
}

/// Similarity moving the centroid to the origin with mean distance √2
fn normalizing_transform(points: &Quad) -> DrapeResult<Mat3> {
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return Err(DrapeError::DegenerateQuad(format!(
            "non-finite corner in {:?}",
            points
        )));
    }

    let cx = points.iter().map(|p| p[0]).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / 4.0;
    let mean_dist = points
        .iter()
        .map(|p| (p[0] - cx).hypot(p[1] - cy))
        .sum::<f64>()
        / 4.0;

    if !(mean_dist > 0.0) {
        return Err(DrapeError::DegenerateQuad(format!(
            "corners coincide at ({}, {})",
            cx, cy
        )));
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    Ok(Mat3::new(
        s, 0.0, -s * cx,
        0.0, s, -s * cy,
        0.0, 0.0, 1.0,
    ))
}

fn apply_affine(m: &Mat3, p: PixelPoint) -> PixelPoint {
    [
        m[(0, 0)] * p[0] + m[(0, 1)] * p[1] + m[(0, 2)],
        m[(1, 0)] * p[0] + m[(1, 1)] * p[1] + m[(1, 2)],
    ]
}
