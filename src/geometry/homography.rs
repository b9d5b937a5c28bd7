use faer::linalg::solvers::SolveLstsqCore;
use glam::DVec2;
use log::debug;
use nalgebra as na;

const EPS: f64 = 1e-12;
/// Smallest |det| accepted for a homography scaled so that h22 = 1.
const MIN_DET: f64 = 1e-8;

/// Invertible projective transform, stored together with its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: na::Matrix3<f64>,
    inverse: na::Matrix3<f64>,
}

impl Homography {
    /// Wraps `matrix`, rescaled so that h22 = 1 where possible. Returns `None`
    /// for non-finite or (near) singular matrices.
    pub fn from_matrix(matrix: na::Matrix3<f64>) -> Option<Homography> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let scale = if matrix[(2, 2)].abs() > EPS {
            matrix[(2, 2)]
        } else {
            matrix.norm()
        };
        if scale.abs() <= EPS {
            return None;
        }
        let matrix = matrix / scale;
        if matrix.determinant().abs() < MIN_DET {
            debug!("rejecting near singular homography {}", matrix);
            return None;
        }
        let inverse = matrix.try_inverse()?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Homography { matrix, inverse })
    }

    pub fn identity() -> Homography {
        Homography {
            matrix: na::Matrix3::identity(),
            inverse: na::Matrix3::identity(),
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Homography {
        Homography {
            matrix: na::Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0),
            inverse: na::Matrix3::new(1.0, 0.0, -tx, 0.0, 1.0, -ty, 0.0, 0.0, 1.0),
        }
    }

    pub fn matrix(&self) -> &na::Matrix3<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> Homography {
        Homography {
            matrix: self.inverse,
            inverse: self.matrix,
        }
    }

    /// `self ∘ other`: applies `other` first.
    pub fn compose(&self, other: &Homography) -> Homography {
        Homography {
            matrix: self.matrix * other.matrix,
            inverse: other.inverse * self.inverse,
        }
    }

    /// (tx, ty) of the normalized matrix.
    pub fn translation_component(&self) -> (f64, f64) {
        (self.matrix[(0, 2)], self.matrix[(1, 2)])
    }

    /// Maps a point; `None` when it lands on or behind the line at infinity.
    pub fn project(&self, p: DVec2) -> Option<DVec2> {
        project_with(&self.matrix, p)
    }
}

pub(crate) fn project_with(m: &na::Matrix3<f64>, p: DVec2) -> Option<DVec2> {
    let v = m * na::Vector3::new(p.x, p.y, 1.0);
    let w = v[2];
    if !w.is_finite() || w <= EPS {
        return None;
    }
    let out = DVec2::new(v[0] / w, v[1] / w);
    out.is_finite().then_some(out)
}

/// Hartley normalization: centroid to the origin, mean distance sqrt(2).
fn normalize_points(points: &[DVec2]) -> Option<(Vec<DVec2>, na::Matrix3<f64>)> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(DVec2::ZERO, |acc, p| acc + *p) / n;
    let mean_dist = points.iter().map(|p| p.distance(centroid)).sum::<f64>() / n;
    if mean_dist <= EPS {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = na::Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    Some((points.iter().map(|p| (*p - centroid) * s).collect(), t))
}

fn normalized_pairs(
    pairs: &[(DVec2, DVec2)],
) -> Option<(Vec<(DVec2, DVec2)>, na::Matrix3<f64>, na::Matrix3<f64>)> {
    let (src, dst): (Vec<_>, Vec<_>) = pairs.iter().copied().unzip();
    let (src_n, t_src) = normalize_points(&src)?;
    let (dst_n, t_dst) = normalize_points(&dst)?;
    Some((src_n.into_iter().zip(dst_n).collect(), t_src, t_dst))
}

fn denormalize(
    h_norm: na::Matrix3<f64>,
    t_src: &na::Matrix3<f64>,
    t_dst: &na::Matrix3<f64>,
) -> Option<na::Matrix3<f64>> {
    Some(t_dst.try_inverse()? * h_norm * t_src)
}

/// Direct linear transform from exactly four pairs, via the null vector of
/// the (zero padded) 9x9 system.
pub fn fit_minimal(pairs: &[(DVec2, DVec2); 4]) -> Option<na::Matrix3<f64>> {
    let (norm, t_src, t_dst) = normalized_pairs(pairs)?;
    let mut a = na::SMatrix::<f64, 9, 9>::zeros();
    for (i, (p, q)) in norm.iter().enumerate() {
        let (x, y, u, v) = (p.x, p.y, q.x, q.y);
        let r0 = [-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u];
        let r1 = [0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v];
        for c in 0..9 {
            a[(2 * i, c)] = r0[c];
            a[(2 * i + 1, c)] = r1[c];
        }
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let smallest = svd.singular_values.imin();
    let h = v_t.row(smallest);
    let h_norm = na::Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    let m = denormalize(h_norm, &t_src, &t_dst)?;
    // the null vector has arbitrary sign and scale; fix h22 = 1
    let scale = if m[(2, 2)].abs() > EPS { m[(2, 2)] } else { m.norm() };
    (scale.abs() > EPS).then(|| m / scale)
}

/// Linear least squares over all pairs with h22 fixed to 1, on normalized
/// coordinates.
pub fn fit_least_squares(pairs: &[(DVec2, DVec2)]) -> Option<na::Matrix3<f64>> {
    if pairs.len() < 4 {
        return None;
    }
    let (norm, t_src, t_dst) = normalized_pairs(pairs)?;
    let coeff = |r: usize, c: usize| -> f64 {
        let (p, q) = norm[r / 2];
        let (x, y, u, v) = (p.x, p.y, q.x, q.y);
        let row = if r % 2 == 0 {
            [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y]
        } else {
            [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y]
        };
        row[c]
    };
    let rows = norm.len() * 2;
    let a: faer::Mat<f64> = faer::Mat::from_fn(rows, 8, coeff);
    let mut x: faer::Mat<f64> = faer::Mat::from_fn(rows, 1, |r, _| {
        let q = norm[r / 2].1;
        if r % 2 == 0 { q.x } else { q.y }
    });
    a.qr()
        .solve_lstsq_in_place_with_conj(faer::Conj::No, x.as_mut());
    let h: Vec<f64> = (0..8).map(|i| *x.get(i, 0)).collect();
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let h_norm = na::Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    denormalize(h_norm, &t_src, &t_dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_and_inverse_round_trip() {
        let h = Homography::from_matrix(na::Matrix3::new(
            1.1, 0.05, 12.0, -0.02, 0.95, -4.0, 1e-4, -2e-4, 1.0,
        ))
        .unwrap();
        let id = h.compose(&h.inverse());
        assert!((id.matrix() - na::Matrix3::identity()).norm() < 1e-9);
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let m = na::Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
        assert!(Homography::from_matrix(m).is_none());
        assert!(Homography::from_matrix(na::Matrix3::zeros()).is_none());
    }

    #[test]
    fn point_behind_camera_does_not_project() {
        let h = Homography::from_matrix(na::Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, -0.01, 0.0, 1.0))
            .unwrap();
        assert!(h.project(DVec2::new(50.0, 0.0)).is_some());
        assert!(h.project(DVec2::new(200.0, 0.0)).is_none());
    }
}
