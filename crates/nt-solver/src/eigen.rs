//! Dense eigenvalue solver for standard and generalized problems.

use nalgebra::DMatrix;
use nt_core::SolverDb;
use nt_linalg::{Matrix, Vector};
use tracing::{debug, warn};

use crate::error::{SolverError, SolverResult};
use crate::qz;

/// Eigen solver configuration.
#[derive(Clone, Debug)]
pub struct EigenConfig {
    /// Relative residual above which the dominant pair is reported as inaccurate
    pub tolerance: f64,
    /// QR/QZ sweeps allowed per eigenvalue
    pub max_iterations: usize,
}

impl Default for EigenConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

impl EigenConfig {
    pub fn from_db(db: &SolverDb) -> SolverResult<Self> {
        let defaults = Self::default();
        let tolerance = db.real_or("eigen_tolerance", defaults.tolerance)?;
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(SolverError::InvalidArgument {
                what: format!("eigen_tolerance must be positive, got {tolerance}"),
            });
        }
        Ok(Self {
            tolerance,
            max_iterations: db.positive_or("eigen_max_iterations", defaults.max_iterations)?,
        })
    }
}

/// Complete spectrum. Column `k` of the vector matrices belongs to eigenvalue `k`.
#[derive(Clone, Debug)]
pub struct Spectrum {
    pub values_re: Vec<f64>,
    pub values_im: Vec<f64>,
    pub vectors_re: DMatrix<f64>,
    pub vectors_im: DMatrix<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.values_re.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values_re.is_empty()
    }

    /// Index of the largest finite real part; the lowest index wins ties.
    pub fn dominant_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (k, &v) in self.values_re.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            match best {
                Some(b) if self.values_re[b] >= v => {}
                _ => best = Some(k),
            }
        }
        best
    }
}

/// Eigenvalue with maximum real part and its unit-norm eigenvector.
#[derive(Clone, Debug)]
pub struct DominantEigenpair {
    pub value: f64,
    pub vector: Vector,
}

/// Full-spectrum eigen solver for `A x = lambda x` or `A x = lambda B x`.
#[derive(Clone, Debug, Default)]
pub struct DenseEigenSolver {
    config: EigenConfig,
    a: Option<DMatrix<f64>>,
    b: Option<DMatrix<f64>>,
    result: Option<DominantEigenpair>,
}

impl DenseEigenSolver {
    pub fn new(config: EigenConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn from_db(db: &SolverDb) -> SolverResult<Self> {
        Ok(Self::new(EigenConfig::from_db(db)?))
    }

    /// Both operators must be dense, square and of equal size.
    pub fn set_operators(&mut self, a: &Matrix, b: Option<&Matrix>) -> SolverResult<()> {
        let a = dense_square(a, "A")?;
        let b = match b {
            Some(b) => {
                let b = dense_square(b, "B")?;
                if b.nrows() != a.nrows() {
                    return Err(SolverError::InvalidArgument {
                        what: format!(
                            "eigen operators differ in size: A is {n}x{n}, B is {m}x{m}",
                            n = a.nrows(),
                            m = b.nrows()
                        ),
                    });
                }
                Some(b)
            }
            None => None,
        };
        self.a = Some(a);
        self.b = b;
        self.result = None;
        Ok(())
    }

    /// Every eigenvalue and eigenvector of the configured problem.
    ///
    /// For the generalized problem each eigenvalue is `alpha / beta` with
    /// the QZ denominator `beta` applied here.
    pub fn solve_complete(&self) -> SolverResult<Spectrum> {
        let a = self.a.as_ref().ok_or_else(|| SolverError::InvalidState {
            what: "eigen solve called before set_operators".into(),
        })?;
        let n = a.nrows();
        let schur = match &self.b {
            Some(b) => qz::generalized(a, b, self.config.max_iterations)?,
            None => qz::standard(a, self.config.max_iterations)?,
        };

        let beta_max = schur.beta.iter().copied().fold(0.0_f64, f64::max);
        let mut values_re = Vec::with_capacity(n);
        let mut values_im = Vec::with_capacity(n);
        for (alpha, &beta) in schur.alpha.iter().zip(&schur.beta) {
            if beta <= f64::EPSILON * beta_max || beta == 0.0 {
                // infinite eigenvalue of a singular B
                values_re.push(f64::INFINITY);
                values_im.push(0.0);
            } else {
                values_re.push(alpha.re / beta);
                values_im.push(alpha.im / beta);
            }
        }

        Ok(Spectrum {
            values_re,
            values_im,
            vectors_re: schur.vectors.map(|z| z.re),
            vectors_im: schur.vectors.map(|z| z.im),
        })
    }

    /// Dominant eigenpair: the eigenvalue with maximum real part, with the
    /// real part of its eigenvector normalized to unit 2-norm.
    pub fn solve(&mut self) -> SolverResult<DominantEigenpair> {
        let spectrum = self.solve_complete()?;
        let k = spectrum
            .dominant_index()
            .ok_or_else(|| SolverError::InvalidState {
                what: "no finite eigenvalue".into(),
            })?;

        let mut vector: Vector = spectrum.vectors_re.column(k).into_owned();
        let norm = vector.norm();
        if norm > 0.0 {
            vector /= norm;
        } else {
            warn!(index = k, "dominant eigenvector has no real part");
        }
        if spectrum.values_im[k] != 0.0 {
            debug!(
                re = spectrum.values_re[k],
                im = spectrum.values_im[k],
                "dominant eigenvalue is complex"
            );
        }

        let pair = DominantEigenpair {
            value: spectrum.values_re[k],
            vector,
        };
        self.check_residual(&pair);
        self.result = Some(pair.clone());
        Ok(pair)
    }

    pub fn eigenvalue(&self) -> Option<f64> {
        self.result.as_ref().map(|p| p.value)
    }

    pub fn eigenvector(&self) -> Option<&Vector> {
        self.result.as_ref().map(|p| &p.vector)
    }

    fn check_residual(&self, pair: &DominantEigenpair) {
        let Some(a) = &self.a else { return };
        let ax = a * &pair.vector;
        let bx = match &self.b {
            Some(b) => b * &pair.vector,
            None => pair.vector.clone(),
        };
        let scale = ax.norm().max(bx.norm() * pair.value.abs()).max(f64::MIN_POSITIVE);
        let residual = (ax - bx * pair.value).norm() / scale;
        if residual > self.config.tolerance {
            warn!(
                eigenvalue = pair.value,
                residual, "dominant eigenpair residual above tolerance"
            );
        }
    }
}

fn dense_square(m: &Matrix, name: &str) -> SolverResult<DMatrix<f64>> {
    let dense = m.as_dense().ok_or_else(|| SolverError::InvalidArgument {
        what: format!(
            "eigen solver needs a dense {name}, got a {} matrix",
            m.variant_name()
        ),
    })?;
    if dense.rows() != dense.cols() {
        return Err(SolverError::InvalidArgument {
            what: format!(
                "eigen solver needs a square {name}, got {}x{}",
                dense.rows(),
                dense.cols()
            ),
        });
    }
    Ok(dense.as_dmatrix().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_linalg::{DenseMatrix, SparseMatrix};

    fn dense(rows: usize, values: &[f64]) -> Matrix {
        Matrix::from(DenseMatrix::from_row_slice(rows, rows, values).unwrap())
    }

    #[test]
    fn diagonal_dominant_pair() {
        let mut solver = DenseEigenSolver::default();
        solver
            .set_operators(&dense(2, &[3.0, 0.0, 0.0, 7.0]), None)
            .unwrap();
        let pair = solver.solve().unwrap();
        assert!((pair.value - 7.0).abs() < 1e-12);
        assert!(pair.vector[0].abs() < 1e-12);
        assert!((pair.vector[1].abs() - 1.0).abs() < 1e-9);
        assert_eq!(solver.eigenvalue(), Some(pair.value));
    }

    #[test]
    fn sparse_operator_rejected() {
        let mut solver = DenseEigenSolver::default();
        let sparse = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 2.0)]).unwrap();
        let err = solver.set_operators(&Matrix::from(sparse), None);
        assert!(matches!(err, Err(SolverError::InvalidArgument { .. })));
    }

    #[test]
    fn mismatched_pencil_rejected() {
        let mut solver = DenseEigenSolver::default();
        let err = solver.set_operators(
            &dense(2, &[1.0, 0.0, 0.0, 1.0]),
            Some(&dense(1, &[1.0])),
        );
        assert!(matches!(err, Err(SolverError::InvalidArgument { .. })));
    }

    #[test]
    fn solve_without_operators_is_invalid_state() {
        let solver = DenseEigenSolver::default();
        assert!(matches!(
            solver.solve_complete(),
            Err(SolverError::InvalidState { .. })
        ));
    }

    #[test]
    fn ties_pick_lowest_index() {
        let spectrum = Spectrum {
            values_re: vec![1.0, 4.0, 4.0, f64::INFINITY],
            values_im: vec![0.0; 4],
            vectors_re: DMatrix::identity(4, 4),
            vectors_im: DMatrix::zeros(4, 4),
        };
        assert_eq!(spectrum.dominant_index(), Some(1));
    }
}
