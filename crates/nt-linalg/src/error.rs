//! Error types for matrix and preconditioner operations.

use nt_core::CoreError;
use thiserror::Error;

/// Errors raised by the linear algebra layer.
///
/// This layer never recovers: every condition is signalled to the caller.
#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("Dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Entry ({row}, {col}) out of bounds for a {rows}x{cols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Zero diagonal entry in row {row}")]
    ZeroDiagonal { row: usize },

    #[error("Zero pivot in incomplete factorization at row {row}")]
    ZeroPivot { row: usize },

    #[error("{what} is not supported for {variant} matrices")]
    Unsupported {
        what: &'static str,
        variant: &'static str,
    },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type LinalgResult<T> = Result<T, LinalgError>;
