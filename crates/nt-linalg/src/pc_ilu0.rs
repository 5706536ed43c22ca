//! Zero-fill incomplete LU preconditioner.
//!
//! The factorization keeps the sparsity pattern of `A` (for dense input, the
//! pattern of its nonzero entries plus the diagonal). `L` is unit lower
//! triangular and shares storage with `U`.

use crate::error::{LinalgError, LinalgResult};
use crate::matrix::Matrix;
use crate::preconditioner::Preconditioner;
use crate::vector::Vector;

#[derive(Clone, Debug)]
pub struct PcIlu0 {
    n: usize,
    offsets: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    /// Position of the diagonal entry of each row in `values`.
    diag: Vec<usize>,
}

impl PcIlu0 {
    pub fn new(a: &Matrix) -> LinalgResult<Self> {
        if !a.is_square() {
            return Err(LinalgError::NotSquare {
                rows: a.rows(),
                cols: a.cols(),
            });
        }
        let n = a.rows();
        let (offsets, cols, values) = pattern_of(a)?;

        let mut diag = vec![usize::MAX; n];
        for i in 0..n {
            for p in offsets[i]..offsets[i + 1] {
                if cols[p] == i {
                    diag[i] = p;
                }
            }
            if diag[i] == usize::MAX {
                return Err(LinalgError::ZeroPivot { row: i });
            }
        }

        let mut pc = Self {
            n,
            offsets,
            cols,
            values,
            diag,
        };
        pc.factorize()?;
        Ok(pc)
    }

    /// IKJ elimination restricted to the stored pattern.
    fn factorize(&mut self) -> LinalgResult<()> {
        let mut position: Vec<Option<usize>> = vec![None; self.n];
        for i in 0..self.n {
            let (start, end) = (self.offsets[i], self.offsets[i + 1]);
            for p in start..end {
                position[self.cols[p]] = Some(p);
            }

            for p in start..end {
                let k = self.cols[p];
                if k >= i {
                    break;
                }
                let pivot = self.values[self.diag[k]];
                if pivot == 0.0 {
                    return Err(LinalgError::ZeroPivot { row: k });
                }
                self.values[p] /= pivot;
                let l_ik = self.values[p];
                for q in self.diag[k] + 1..self.offsets[k + 1] {
                    if let Some(w) = position[self.cols[q]] {
                        self.values[w] -= l_ik * self.values[q];
                    }
                }
            }

            if self.values[self.diag[i]] == 0.0 {
                return Err(LinalgError::ZeroPivot { row: i });
            }
            for p in start..end {
                position[self.cols[p]] = None;
            }
        }
        Ok(())
    }
}

impl Preconditioner for PcIlu0 {
    fn apply(&self, r: &Vector) -> LinalgResult<Vector> {
        if r.len() != self.n {
            return Err(LinalgError::DimensionMismatch {
                what: "ilu0 apply",
                expected: self.n,
                found: r.len(),
            });
        }
        // forward: L y = r
        let mut z = r.clone();
        for i in 0..self.n {
            let mut sum = z[i];
            for p in self.offsets[i]..self.diag[i] {
                sum -= self.values[p] * z[self.cols[p]];
            }
            z[i] = sum;
        }
        // backward: U z = y
        for i in (0..self.n).rev() {
            let mut sum = z[i];
            for p in self.diag[i] + 1..self.offsets[i + 1] {
                sum -= self.values[p] * z[self.cols[p]];
            }
            z[i] = sum / self.values[self.diag[i]];
        }
        Ok(z)
    }

    fn size(&self) -> usize {
        self.n
    }

    fn name(&self) -> &'static str {
        "ilu0"
    }
}

/// CSR arrays (sorted columns) of the factorization pattern.
fn pattern_of(a: &Matrix) -> LinalgResult<(Vec<usize>, Vec<usize>, Vec<f64>)> {
    let n = a.rows();
    let mut offsets = Vec::with_capacity(n + 1);
    let mut cols = Vec::new();
    let mut values = Vec::new();
    offsets.push(0);
    match a {
        Matrix::Sparse(m) => {
            for i in 0..n {
                for (j, v) in m.row_entries(i) {
                    cols.push(j);
                    values.push(v);
                }
                offsets.push(cols.len());
            }
        }
        Matrix::Dense(m) => {
            let data = m.as_dmatrix();
            for i in 0..n {
                for j in 0..n {
                    let v = data[(i, j)];
                    if v != 0.0 || i == j {
                        cols.push(j);
                        values.push(v);
                    }
                }
                offsets.push(cols.len());
            }
        }
        Matrix::Shell(_) => {
            return Err(LinalgError::Unsupported {
                what: "incomplete factorization",
                variant: "shell",
            });
        }
    }
    Ok((offsets, cols, values))
}
