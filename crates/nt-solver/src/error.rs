//! Error types for solver operations.

use nt_core::CoreError;
use nt_linalg::LinalgError;
use thiserror::Error;

/// Errors that can occur while configuring or running a solver.
///
/// Divergence and iteration exhaustion of iterative solves are not errors;
/// they are reported through [`crate::LinearStatus`].
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Invalid argument: {what}")]
    InvalidArgument { what: String },

    #[error("Invalid state: {what}")]
    InvalidState { what: String },

    #[error("Eigenvalue iteration did not converge after {iterations} iterations")]
    EigenNotConverged { iterations: usize },

    #[error("Linear algebra error: {0}")]
    Linalg(#[from] LinalgError),

    #[error("Configuration error: {0}")]
    Core(#[from] CoreError),
}

pub type SolverResult<T> = Result<T, SolverError>;
