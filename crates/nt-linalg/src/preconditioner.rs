//! Preconditioner contract and selection.

use std::fmt;
use std::str::FromStr;

use nt_core::CoreError;

use crate::error::LinalgResult;
use crate::matrix::Matrix;
use crate::pc_ilu0::PcIlu0;
use crate::pc_jacobi::PcJacobi;
use crate::vector::Vector;

/// Approximate inverse of a system matrix, `z = M^{-1} r`.
pub trait Preconditioner: Send + Sync + fmt::Debug {
    fn apply(&self, r: &Vector) -> LinalgResult<Vector>;

    /// Dimension of the operator this was built for.
    fn size(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Preconditioner selection (`pc_type` option).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PcType {
    #[default]
    None,
    Jacobi,
    Ilu0,
}

impl FromStr for PcType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(PcType::None),
            "jacobi" => Ok(PcType::Jacobi),
            "ilu0" => Ok(PcType::Ilu0),
            other => Err(CoreError::InvalidArg {
                what: format!("unknown pc_type '{other}' (expected none, jacobi or ilu0)"),
            }),
        }
    }
}

/// Side on which the preconditioner is applied (`pc_side` option).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PcSide {
    /// Solve `M^{-1} A x = M^{-1} b`.
    #[default]
    Left,
    /// Solve `A M^{-1} y = b`, `x = M^{-1} y`.
    Right,
}

impl FromStr for PcSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "0" => Ok(PcSide::Left),
            "right" | "1" => Ok(PcSide::Right),
            other => Err(CoreError::InvalidArg {
                what: format!("unknown pc_side '{other}' (expected left or right)"),
            }),
        }
    }
}

/// Build the preconditioner selected by `kind` for matrix `a`.
pub fn build_preconditioner(
    kind: PcType,
    a: &Matrix,
) -> LinalgResult<Option<Box<dyn Preconditioner>>> {
    Ok(match kind {
        PcType::None => None,
        PcType::Jacobi => Some(Box::new(PcJacobi::new(a)?)),
        PcType::Ilu0 => Some(Box::new(PcIlu0::new(a)?)),
    })
}
