//! Matrix representations sharing one operator contract.

use std::fmt;

use nalgebra::DMatrix;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::error::{LinalgError, LinalgResult};
use crate::vector::Vector;

/// Closure type used by shell matrices: writes `y = M x`.
pub type ShellApply = Box<dyn Fn(&Vector, &mut Vector) + Send + Sync>;

/// Dense row/column storage with direct element access.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseMatrix {
    data: DMatrix<f64>,
}

impl DenseMatrix {
    /// Matrix of shape `rows x cols` with every entry set to `value`.
    pub fn new(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            data: DMatrix::from_element(rows, cols, value),
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(rows, cols, 0.0)
    }

    pub fn identity(n: usize) -> Self {
        Self {
            data: DMatrix::identity(n, n),
        }
    }

    /// Build from row-major values.
    pub fn from_row_slice(rows: usize, cols: usize, values: &[f64]) -> LinalgResult<Self> {
        if values.len() != rows * cols {
            return Err(LinalgError::DimensionMismatch {
                what: "dense row slice",
                expected: rows * cols,
                found: values.len(),
            });
        }
        Ok(Self {
            data: DMatrix::from_row_slice(rows, cols, values),
        })
    }

    pub fn from_diagonal(diag: &[f64]) -> Self {
        let n = diag.len();
        let mut data = DMatrix::zeros(n, n);
        for (i, &d) in diag.iter().enumerate() {
            data[(i, i)] = d;
        }
        Self { data }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn get(&self, i: usize, j: usize) -> LinalgResult<f64> {
        self.check_index(i, j)?;
        Ok(self.data[(i, j)])
    }

    pub fn set(&mut self, i: usize, j: usize, v: f64) -> LinalgResult<()> {
        self.check_index(i, j)?;
        self.data[(i, j)] = v;
        Ok(())
    }

    /// Accumulate `v` into entry `(i, j)`.
    pub fn add(&mut self, i: usize, j: usize, v: f64) -> LinalgResult<()> {
        self.check_index(i, j)?;
        self.data[(i, j)] += v;
        Ok(())
    }

    pub fn as_dmatrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn into_dmatrix(self) -> DMatrix<f64> {
        self.data
    }

    pub fn apply_into(&self, x: &Vector, y: &mut Vector) -> LinalgResult<()> {
        check_len("dense apply input", self.cols(), x.len())?;
        check_len("dense apply output", self.rows(), y.len())?;
        y.gemv(1.0, &self.data, x, 0.0);
        Ok(())
    }

    pub fn transpose_apply_into(&self, x: &Vector, y: &mut Vector) -> LinalgResult<()> {
        check_len("dense transpose input", self.rows(), x.len())?;
        check_len("dense transpose output", self.cols(), y.len())?;
        y.gemv_tr(1.0, &self.data, x, 0.0);
        Ok(())
    }

    fn check_index(&self, i: usize, j: usize) -> LinalgResult<()> {
        if i >= self.rows() || j >= self.cols() {
            return Err(LinalgError::IndexOutOfBounds {
                row: i,
                col: j,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(())
    }
}

impl From<DMatrix<f64>> for DenseMatrix {
    fn from(data: DMatrix<f64>) -> Self {
        Self { data }
    }
}

/// Compressed sparse row storage.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    csr: CsrMatrix<f64>,
}

impl SparseMatrix {
    /// Assemble from `(row, col, value)` triplets. Duplicates are summed.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> LinalgResult<Self> {
        let mut coo = CooMatrix::new(rows, cols);
        for &(i, j, v) in triplets {
            if i >= rows || j >= cols {
                return Err(LinalgError::IndexOutOfBounds {
                    row: i,
                    col: j,
                    rows,
                    cols,
                });
            }
            coo.push(i, j, v);
        }
        Ok(Self {
            csr: CsrMatrix::from(&coo),
        })
    }

    pub fn from_csr(csr: CsrMatrix<f64>) -> Self {
        Self { csr }
    }

    pub fn rows(&self) -> usize {
        self.csr.nrows()
    }

    pub fn cols(&self) -> usize {
        self.csr.ncols()
    }

    pub fn nnz(&self) -> usize {
        self.csr.nnz()
    }

    pub fn csr(&self) -> &CsrMatrix<f64> {
        &self.csr
    }

    /// Stored entries of row `i` as `(col, value)` pairs, columns ascending.
    pub fn row_entries(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let offsets = self.csr.row_offsets();
        let (start, end) = (offsets[i], offsets[i + 1]);
        self.csr.col_indices()[start..end]
            .iter()
            .copied()
            .zip(self.csr.values()[start..end].iter().copied())
    }

    /// Entry `(i, j)`, zero when not stored.
    pub fn get(&self, i: usize, j: usize) -> LinalgResult<f64> {
        if i >= self.rows() || j >= self.cols() {
            return Err(LinalgError::IndexOutOfBounds {
                row: i,
                col: j,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        let offsets = self.csr.row_offsets();
        let cols = &self.csr.col_indices()[offsets[i]..offsets[i + 1]];
        Ok(match cols.binary_search(&j) {
            Ok(p) => self.csr.values()[offsets[i] + p],
            Err(_) => 0.0,
        })
    }

    pub fn apply_into(&self, x: &Vector, y: &mut Vector) -> LinalgResult<()> {
        check_len("sparse apply input", self.cols(), x.len())?;
        check_len("sparse apply output", self.rows(), y.len())?;
        // spmm scales the old contents by beta and NaN * 0 is NaN
        y.fill(0.0);
        spmm_csr_dense(0.0, &mut *y, 1.0, Op::NoOp(&self.csr), Op::NoOp(x));
        Ok(())
    }

    pub fn transpose_apply_into(&self, x: &Vector, y: &mut Vector) -> LinalgResult<()> {
        check_len("sparse transpose input", self.rows(), x.len())?;
        check_len("sparse transpose output", self.cols(), y.len())?;
        y.fill(0.0);
        spmm_csr_dense(0.0, &mut *y, 1.0, Op::Transpose(&self.csr), Op::NoOp(x));
        Ok(())
    }
}

/// Matrix-free operator backed by a stored closure.
pub struct ShellMatrix {
    rows: usize,
    cols: usize,
    apply: ShellApply,
    transpose: Option<ShellApply>,
}

impl ShellMatrix {
    /// Shell of shape `rows x cols`; `apply` receives `x` and writes `y = M x`.
    /// Any context the operator needs is captured by the closure.
    pub fn new<F>(rows: usize, cols: usize, apply: F) -> Self
    where
        F: Fn(&Vector, &mut Vector) + Send + Sync + 'static,
    {
        Self {
            rows,
            cols,
            apply: Box::new(apply),
            transpose: None,
        }
    }

    /// Register the transpose action `y = M^T x`.
    pub fn with_transpose<F>(mut self, transpose: F) -> Self
    where
        F: Fn(&Vector, &mut Vector) + Send + Sync + 'static,
    {
        self.transpose = Some(Box::new(transpose));
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn apply_into(&self, x: &Vector, y: &mut Vector) -> LinalgResult<()> {
        check_len("shell apply input", self.cols, x.len())?;
        check_len("shell apply output", self.rows, y.len())?;
        (self.apply)(x, y);
        Ok(())
    }

    pub fn transpose_apply_into(&self, x: &Vector, y: &mut Vector) -> LinalgResult<()> {
        let transpose = self.transpose.as_ref().ok_or(LinalgError::Unsupported {
            what: "transpose apply",
            variant: "shell (no transpose registered)",
        })?;
        check_len("shell transpose input", self.rows, x.len())?;
        check_len("shell transpose output", self.cols, y.len())?;
        transpose(x, y);
        Ok(())
    }
}

impl fmt::Debug for ShellMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("has_transpose", &self.transpose.is_some())
            .finish()
    }
}

/// Linear operator of fixed shape.
#[derive(Debug)]
pub enum Matrix {
    Dense(DenseMatrix),
    Sparse(SparseMatrix),
    Shell(ShellMatrix),
}

impl Matrix {
    pub fn rows(&self) -> usize {
        match self {
            Matrix::Dense(m) => m.rows(),
            Matrix::Sparse(m) => m.rows(),
            Matrix::Shell(m) => m.rows(),
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            Matrix::Dense(m) => m.cols(),
            Matrix::Sparse(m) => m.cols(),
            Matrix::Shell(m) => m.cols(),
        }
    }

    pub fn is_square(&self) -> bool {
        self.rows() == self.cols()
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Matrix::Dense(_) => "dense",
            Matrix::Sparse(_) => "sparse",
            Matrix::Shell(_) => "shell",
        }
    }

    /// `y = M x`.
    pub fn apply(&self, x: &Vector) -> LinalgResult<Vector> {
        let mut y = Vector::zeros(self.rows());
        self.apply_into(x, &mut y)?;
        Ok(y)
    }

    pub fn apply_into(&self, x: &Vector, y: &mut Vector) -> LinalgResult<()> {
        match self {
            Matrix::Dense(m) => m.apply_into(x, y),
            Matrix::Sparse(m) => m.apply_into(x, y),
            Matrix::Shell(m) => m.apply_into(x, y),
        }
    }

    /// `y = M^T x`.
    pub fn transpose_apply(&self, x: &Vector) -> LinalgResult<Vector> {
        let mut y = Vector::zeros(self.cols());
        match self {
            Matrix::Dense(m) => m.transpose_apply_into(x, &mut y)?,
            Matrix::Sparse(m) => m.transpose_apply_into(x, &mut y)?,
            Matrix::Shell(m) => m.transpose_apply_into(x, &mut y)?,
        }
        Ok(y)
    }

    /// Element access; shell matrices have no stored entries.
    pub fn get(&self, i: usize, j: usize) -> LinalgResult<f64> {
        match self {
            Matrix::Dense(m) => m.get(i, j),
            Matrix::Sparse(m) => m.get(i, j),
            Matrix::Shell(_) => Err(LinalgError::Unsupported {
                what: "element access",
                variant: "shell",
            }),
        }
    }

    /// Main diagonal of a square matrix.
    pub fn diagonal(&self) -> LinalgResult<Vector> {
        if !self.is_square() {
            return Err(LinalgError::NotSquare {
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        let n = self.rows();
        match self {
            Matrix::Dense(m) => Ok(Vector::from_fn(n, |i, _| m.as_dmatrix()[(i, i)])),
            Matrix::Sparse(m) => {
                let mut d = Vector::zeros(n);
                for i in 0..n {
                    d[i] = m.get(i, i)?;
                }
                Ok(d)
            }
            Matrix::Shell(_) => Err(LinalgError::Unsupported {
                what: "diagonal extraction",
                variant: "shell",
            }),
        }
    }

    pub fn as_dense(&self) -> Option<&DenseMatrix> {
        match self {
            Matrix::Dense(m) => Some(m),
            _ => None,
        }
    }

    /// Materialize any variant as a dense matrix (shells column by column).
    pub fn to_dense(&self) -> LinalgResult<DenseMatrix> {
        match self {
            Matrix::Dense(m) => Ok(m.clone()),
            Matrix::Sparse(m) => {
                let mut d = DenseMatrix::zeros(m.rows(), m.cols());
                for i in 0..m.rows() {
                    for (j, v) in m.row_entries(i) {
                        d.add(i, j, v)?;
                    }
                }
                Ok(d)
            }
            Matrix::Shell(m) => {
                let mut d = DenseMatrix::zeros(m.rows(), m.cols());
                let mut e = Vector::zeros(m.cols());
                let mut col = Vector::zeros(m.rows());
                for j in 0..m.cols() {
                    e[j] = 1.0;
                    m.apply_into(&e, &mut col)?;
                    e[j] = 0.0;
                    for i in 0..m.rows() {
                        d.set(i, j, col[i])?;
                    }
                }
                Ok(d)
            }
        }
    }
}

impl From<DenseMatrix> for Matrix {
    fn from(m: DenseMatrix) -> Self {
        Matrix::Dense(m)
    }
}

impl From<SparseMatrix> for Matrix {
    fn from(m: SparseMatrix) -> Self {
        Matrix::Sparse(m)
    }
}

impl From<ShellMatrix> for Matrix {
    fn from(m: ShellMatrix) -> Self {
        Matrix::Shell(m)
    }
}

fn check_len(what: &'static str, expected: usize, found: usize) -> LinalgResult<()> {
    if expected != found {
        return Err(LinalgError::DimensionMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}
