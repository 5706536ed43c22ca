//! Diagonal (Jacobi) preconditioner.

use crate::error::{LinalgError, LinalgResult};
use crate::matrix::Matrix;
use crate::preconditioner::Preconditioner;
use crate::vector::Vector;

/// `M = diag(A)`; applying it divides each entry by the diagonal.
#[derive(Clone, Debug)]
pub struct PcJacobi {
    inv_diag: Vector,
}

impl PcJacobi {
    pub fn new(a: &Matrix) -> LinalgResult<Self> {
        let diag = a.diagonal()?;
        let mut inv_diag = Vector::zeros(diag.len());
        for (i, &d) in diag.iter().enumerate() {
            if d == 0.0 || !d.is_finite() {
                return Err(LinalgError::ZeroDiagonal { row: i });
            }
            inv_diag[i] = 1.0 / d;
        }
        Ok(Self { inv_diag })
    }
}

impl Preconditioner for PcJacobi {
    fn apply(&self, r: &Vector) -> LinalgResult<Vector> {
        if r.len() != self.inv_diag.len() {
            return Err(LinalgError::DimensionMismatch {
                what: "jacobi apply",
                expected: self.inv_diag.len(),
                found: r.len(),
            });
        }
        Ok(r.component_mul(&self.inv_diag))
    }

    fn size(&self) -> usize {
        self.inv_diag.len()
    }

    fn name(&self) -> &'static str {
        "jacobi"
    }
}
