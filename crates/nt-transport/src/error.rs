//! Error types for the multigroup transport layer.

use nt_core::CoreError;
use nt_linalg::LinalgError;
use nt_solver::SolverError;
use thiserror::Error;

/// Errors raised while setting up or running a multigroup solve.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid argument: {what}")]
    InvalidArgument { what: String },

    /// A pre-correction coarse flux is zero (or the correction ratio is not
    /// finite), so the multiplicative prolongation is undefined.
    #[error("Degenerate coarse cell {coarse_cell} in group {group}: pre-correction flux {value}")]
    DegenerateCell {
        coarse_cell: usize,
        group: usize,
        value: f64,
    },

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Linear algebra error: {0}")]
    Linalg(#[from] LinalgError),

    #[error("Configuration error: {0}")]
    Core(#[from] CoreError),
}

pub type TransportResult<T> = Result<T, TransportError>;

pub(crate) fn invalid(what: impl Into<String>) -> TransportError {
    TransportError::InvalidArgument { what: what.into() }
}
