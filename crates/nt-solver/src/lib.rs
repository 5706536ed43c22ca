//! Iterative linear solvers and the dense eigenvalue backend.
//!
//! [`LinearSolver`] runs GMRES(m) or preconditioned Richardson iteration on
//! any [`nt_linalg::Matrix`] and reports its outcome as a
//! [`LinearSolveReport`]; non-convergence is a status, not an error.
//! [`DenseEigenSolver`] computes the complete spectrum of a dense standard or
//! generalized problem through complex QR/QZ iteration.

pub mod eigen;
pub mod error;
pub mod linear;
pub mod monitor;
mod qz;

pub use eigen::{DenseEigenSolver, DominantEigenpair, EigenConfig, Spectrum};
pub use error::{SolverError, SolverResult};
pub use linear::{LinearSolver, LinearSolverConfig, LinearSolverKind};
pub use monitor::{ConvergenceMonitor, LinearSolveReport, LinearStatus, MAX_MONITOR_LEVEL};
