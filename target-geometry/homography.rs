use imageproc::geometric_transformations::Projection;
use nalgebra::{DMatrix, Matrix3, Vector3, SVD};
use target_core::Point;

/// Homogeneous coordinates closer to zero than this are treated as points at infinity
const W_EPSILON: f64 = 1e-10;

/// Planar projective transform acting on column vectors `(x, y, 1)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self(matrix)
    }

    /// Row-major coefficients
    pub fn from_row_slice(data: &[f64; 9]) -> Self {
        Self(Matrix3::from_row_slice(data))
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self(Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0))
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self(Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Map a point; `None` when it lands at infinity
    pub fn project(&self, p: &Point) -> Option<Point> {
        let v = self.0 * Vector3::new(p.x, p.y, 1.0);
        if v.z.abs() < W_EPSILON || !v.iter().all(|c| c.is_finite()) {
            return None;
        }
        Some(Point::new(v.x / v.z, v.y / v.z))
    }

    pub fn inverse(&self) -> Option<Homography> {
        self.0.try_inverse().map(|m| Homography(m).normalized())
    }

    /// `self ∘ other`: apply `other` first
    pub fn compose(&self, other: &Homography) -> Homography {
        Homography(self.0 * other.0).normalized()
    }

    /// Scale so the bottom-right coefficient is 1 when possible
    pub fn normalized(self) -> Homography {
        let s = self.0[(2, 2)];
        if s.abs() > W_EPSILON && s.is_finite() {
            Homography(self.0 / s)
        } else {
            self
        }
    }

    /// Squared distance between the projection of `src` and `dst`; infinite at infinity
    pub fn transfer_error_sq(&self, src: &Point, dst: &Point) -> f64 {
        match self.project(src) {
            Some(p) => (p - dst).norm_squared(),
            None => f64::INFINITY,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }

    /// Row-major `f32` projection for image warping; `None` when not invertible
    pub fn to_projection(&self) -> Option<Projection> {
        let m = self.normalized().0;
        let mut data = [0.0f32; 9];
        for r in 0..3 {
            for c in 0..3 {
                data[r * 3 + c] = m[(r, c)] as f32;
            }
        }
        Projection::from_matrix(data)
    }

    /// Direct linear transform on normalized coordinates; least squares for more than four pairs.
    ///
    /// Returns `None` for fewer than four pairs or a degenerate configuration.
    pub fn estimate(src: &[Point], dst: &[Point]) -> Option<Homography> {
        if src.len() < 4 || src.len() != dst.len() {
            return None;
        }

        let (src_norm, src_t) = normalize_points(src)?;
        let (dst_norm, dst_t) = normalize_points(dst)?;
        if is_collinear(&src_norm) || is_collinear(&dst_norm) {
            return None;
        }

        let n = src_norm.len();
        let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);
        for (i, (s, d)) in src_norm.iter().zip(&dst_norm).enumerate() {
            let r = 2 * i;
            a.row_mut(r).copy_from_slice(&[-s.x, -s.y, -1.0, 0.0, 0.0, 0.0, s.x * d.x, s.y * d.x, d.x]);
            a.row_mut(r + 1).copy_from_slice(&[0.0, 0.0, 0.0, -s.x, -s.y, -1.0, s.x * d.y, s.y * d.y, d.y]);
        }

        // Rows of zeros pad to 9 so the thin SVD still exposes the null space
        let svd = SVD::new(a, false, true);
        let v_t = svd.v_t?;
        let (min_idx, _) = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))?;
        let h = v_t.row(min_idx);
        let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        let dst_inv = dst_t.try_inverse()?;
        let result = Homography(dst_inv * h_norm * src_t);
        if result.0[(2, 2)].abs() < W_EPSILON || !result.is_finite() {
            return None;
        }
        let result = result.normalized();

        // A rank-deficient matrix collapses the plane
        if result.0.determinant().abs() < 1e-12 {
            return None;
        }
        Some(result)
    }
}

/// Translate to the centroid and scale to mean distance √2
fn normalize_points(points: &[Point]) -> Option<(Vec<Point>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-10 || !mean_dist.is_finite() {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / mean_dist;
    let normalized = points
        .iter()
        .map(|p| Point::new((p.x - cx) * scale, (p.y - cy) * scale))
        .collect();
    let t = Matrix3::new(scale, 0.0, -cx * scale, 0.0, scale, -cy * scale, 0.0, 0.0, 1.0);
    Some((normalized, t))
}

/// All points on one line: the scatter matrix is rank one
fn is_collinear(centred: &[Point]) -> bool {
    let (sxx, syy, sxy) = centred
        .iter()
        .fold((0.0, 0.0, 0.0), |(sxx, syy, sxy), p| (sxx + p.x * p.x, syy + p.y * p.y, sxy + p.x * p.y));
    let trace = sxx + syy;
    sxx * syy - sxy * sxy <= 1e-12 * trace * trace
}

/// True when some three of the points are (nearly) on one line
pub fn has_collinear_triple(points: &[Point]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let (a, b, c) = (points[i], points[j], points[k]);
                let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
                let scale = (b - a).norm() * (c - a).norm();
                if cross.abs() <= 1e-6 * scale.max(1e-12) {
                    return true;
                }
            }
        }
    }
    false
}
