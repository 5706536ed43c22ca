//! Multigroup outer iteration and coarse-mesh finite-difference acceleration.
//!
//! [`MultigroupSolver`] sweeps the energy groups through a
//! [`WithinGroupSolver`], measures the flux change and, between passes,
//! lets a [`CmfdAccelerator`] correct the fine flux from a coarse diffusion
//! solve built from homogenized data and tallied face currents.
//! [`DiffusionGroupSolver`] is a finite-volume diffusion implementation of
//! the within-group step.

pub mod cmfd;
pub mod coarse;
pub mod error;
pub mod homogenize;
pub mod material;
pub mod mesh;
pub mod mg;
pub mod source;
pub mod state;
pub mod tally;
pub mod within_group;

pub use cmfd::{
    CmfdAccelerator, CmfdUpdate, FissionTerm, loss_operator, production_operator, prolongate,
};
pub use coarse::{CoarseMesh, CoarseMeshMapping};
pub use error::{TransportError, TransportResult};
pub use homogenize::{Homogenized, homogenize};
pub use material::{Material, MaterialProvider};
pub use mesh::{AxisRegions, Boundaries, BoundaryCondition, CartesianMesh, Side};
pub use mg::{Acceleration, MultigroupConfig, MultigroupSolver, OuterReport, OuterStatus};
pub use source::SweepSource;
pub use state::GroupFluxField;
pub use tally::CurrentTally;
pub use within_group::{DiffusionGroupSolver, WithinGroupSolver, diffusion_operator};
