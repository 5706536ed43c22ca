//! Vector type and norms.

use nalgebra::DVector;

/// Fixed-length real vector. Elementwise arithmetic, dot products and
/// in-place scaling come from `nalgebra`.
pub type Vector = DVector<f64>;

/// Norm selection used by solvers and residual checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NormType {
    L1,
    #[default]
    L2,
    Linf,
}

/// Norm helpers on top of `nalgebra` vectors.
pub trait VectorNorms {
    fn norm_of(&self, kind: NormType) -> f64;

    /// Norm of `self - other`.
    fn norm_residual(&self, other: &Self, kind: NormType) -> f64;
}

impl VectorNorms for Vector {
    fn norm_of(&self, kind: NormType) -> f64 {
        match kind {
            NormType::L1 => self.iter().map(|v| v.abs()).sum(),
            NormType::L2 => self.norm(),
            NormType::Linf => self.iter().fold(0.0_f64, |m, v| m.max(v.abs())),
        }
    }

    fn norm_residual(&self, other: &Self, kind: NormType) -> f64 {
        debug_assert_eq!(self.len(), other.len());
        let diff = self.iter().zip(other.iter()).map(|(a, b)| a - b);
        match kind {
            NormType::L1 => diff.map(f64::abs).sum(),
            NormType::L2 => diff.map(|d| d * d).sum::<f64>().sqrt(),
            NormType::Linf => diff.fold(0.0_f64, |m, d| m.max(d.abs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norms_of_known_vector() {
        let v = Vector::from_vec(vec![3.0, -4.0, 0.0]);
        assert_eq!(v.norm_of(NormType::L1), 7.0);
        assert_eq!(v.norm_of(NormType::L2), 5.0);
        assert_eq!(v.norm_of(NormType::Linf), 4.0);
    }

    #[test]
    fn residual_norm_matches_difference() {
        let a = Vector::from_vec(vec![1.0, 2.0, 3.0]);
        let b = Vector::from_vec(vec![1.5, 2.0, 1.0]);
        assert_eq!(a.norm_residual(&b, NormType::Linf), 2.0);
        assert_eq!(a.norm_residual(&b, NormType::L1), 2.5);
        assert!((a.norm_residual(&b, NormType::L2) - (a - b).norm()).abs() < 1e-15);
    }
}
