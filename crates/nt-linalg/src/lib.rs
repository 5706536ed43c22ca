//! Matrix/vector layer and preconditioners.
//!
//! A [`Matrix`] is a linear operator of fixed shape in one of three
//! representations: dense, sparse (CSR), or shell (matrix-free, defined by a
//! stored closure). All of them share the `apply` contract, so solvers never
//! need to know which one they hold.

pub mod error;
pub mod matrix;
pub mod pc_ilu0;
pub mod pc_jacobi;
pub mod preconditioner;
pub mod vector;

pub use error::{LinalgError, LinalgResult};
pub use matrix::{DenseMatrix, Matrix, ShellApply, ShellMatrix, SparseMatrix};
pub use pc_ilu0::PcIlu0;
pub use pc_jacobi::PcJacobi;
pub use preconditioner::{PcSide, PcType, Preconditioner, build_preconditioner};
pub use vector::{NormType, Vector, VectorNorms};
