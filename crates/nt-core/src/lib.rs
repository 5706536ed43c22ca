//! nt-core: shared foundation for the neutronflow solver stack.
//!
//! Contains:
//! - numeric (tolerances + float comparison and checking helpers)
//! - error (shared error types)
//! - db (flat key/value solver configuration)

pub mod db;
pub mod error;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use db::{DbValue, SolverDb};
pub use error::{CoreError, CoreResult};
pub use numeric::*;
