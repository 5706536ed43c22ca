//! Multigroup outer iteration with optional coarse-mesh acceleration.

use std::str::FromStr;
use std::sync::Arc;

use nt_core::{CoreError, SolverDb};
use nt_linalg::{NormType, VectorNorms};
use nt_solver::{DominantEigenpair, MAX_MONITOR_LEVEL};
use tracing::{debug, info, warn};

use crate::cmfd::CmfdAccelerator;
use crate::coarse::CoarseMesh;
use crate::error::{TransportError, TransportResult, invalid};
use crate::material::MaterialProvider;
use crate::mesh::{Boundaries, CartesianMesh};
use crate::state::GroupFluxField;
use crate::tally::CurrentTally;
use crate::within_group::WithinGroupSolver;

/// Outer acceleration scheme (`outer_acceleration` option).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Acceleration {
    /// Plain Gauss-Seidel over groups.
    None,
    #[default]
    Cmfd,
}

impl FromStr for Acceleration {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Acceleration::None),
            "cmfd" => Ok(Acceleration::Cmfd),
            other => Err(CoreError::InvalidArg {
                what: format!("unknown outer_acceleration '{other}' (expected none or cmfd)"),
            }),
        }
    }
}

/// Outer solver configuration.
#[derive(Clone, Debug)]
pub struct MultigroupConfig {
    /// L-infinity tolerance on the flux change over one outer iteration
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Iterations between progress records
    pub print_interval: usize,
    /// 0 silent, 1 summary, 2 progress
    pub monitor_level: u8,
    pub acceleration: Acceleration,
    /// Fine cells per coarse cell along each axis
    pub coarse_mesh_level: usize,
    pub adjoint: bool,
}

impl Default for MultigroupConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 100,
            print_interval: 10,
            monitor_level: 0,
            acceleration: Acceleration::Cmfd,
            coarse_mesh_level: 2,
            adjoint: false,
        }
    }
}

impl MultigroupConfig {
    pub fn from_db(db: &SolverDb) -> TransportResult<Self> {
        let defaults = Self::default();
        let acceleration = match db.get_str("outer_acceleration")? {
            Some(s) => s.parse()?,
            None => defaults.acceleration,
        };
        let config = Self {
            tolerance: db.real_or("outer_tolerance", defaults.tolerance)?,
            max_iterations: db.positive_or("max_outer_iterations", defaults.max_iterations)?,
            print_interval: db.positive_or("outer_print_interval", defaults.print_interval)?,
            monitor_level: db.bounded_or("monitor_level", 0, MAX_MONITOR_LEVEL.into())? as u8,
            acceleration,
            coarse_mesh_level: db
                .positive_or("cmfd_coarse_mesh_level", defaults.coarse_mesh_level)?,
            adjoint: db.bool_or("adjoint", defaults.adjoint)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TransportResult<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(invalid(format!(
                "outer_tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 || self.print_interval == 0 || self.coarse_mesh_level == 0 {
            return Err(invalid(
                "max_outer_iterations, outer_print_interval and cmfd_coarse_mesh_level must be positive",
            ));
        }
        if self.monitor_level > MAX_MONITOR_LEVEL {
            return Err(invalid(format!(
                "monitor_level must be at most {MAX_MONITOR_LEVEL}, got {}",
                self.monitor_level
            )));
        }
        Ok(())
    }
}

/// Terminal state of an outer solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OuterStatus {
    Converged,
    /// The flux change became NaN or infinite.
    Diverged,
    MaxIterationsReached,
}

/// Outcome of [`MultigroupSolver::solve`].
#[derive(Clone, Debug)]
pub struct OuterReport {
    pub status: OuterStatus,
    /// Outer iterations performed before the final residual check
    pub iterations: usize,
    /// Last total residual
    pub residual: f64,
    /// Total residual of every sweep pass
    pub residuals: Vec<f64>,
    /// Within-group solves in this call
    pub sweeps: usize,
    /// Coarse corrections applied
    pub cmfd_updates: usize,
    /// Coarse corrections skipped (degenerate cell or diverged coarse solve)
    pub skipped_updates: usize,
}

impl OuterReport {
    pub fn converged(&self) -> bool {
        self.status == OuterStatus::Converged
    }
}

/// Gauss-Seidel over energy groups, each pass followed by a CMFD correction.
///
/// Groups are visited low to high for the forward problem and high to low
/// for the adjoint.
#[derive(Debug)]
pub struct MultigroupSolver<W: WithinGroupSolver> {
    config: MultigroupConfig,
    mesh: Arc<CartesianMesh>,
    material: Arc<dyn MaterialProvider>,
    wg: W,
    tally: Option<CurrentTally>,
    cmfd: Option<CmfdAccelerator>,
}

impl<W: WithinGroupSolver> MultigroupSolver<W> {
    /// `db` carries the outer options; `coarse_db` configures the coarse
    /// linear solve and is only used with CMFD.
    pub fn new(
        db: &SolverDb,
        coarse_db: SolverDb,
        mesh: Arc<CartesianMesh>,
        material: Arc<dyn MaterialProvider>,
        boundaries: Boundaries,
        wg: W,
    ) -> TransportResult<Self> {
        let config = MultigroupConfig::from_db(db)?;
        Self::with_config(config, coarse_db, mesh, material, boundaries, wg)
    }

    pub fn with_config(
        config: MultigroupConfig,
        coarse_db: SolverDb,
        mesh: Arc<CartesianMesh>,
        material: Arc<dyn MaterialProvider>,
        boundaries: Boundaries,
        wg: W,
    ) -> TransportResult<Self> {
        config.validate()?;
        if wg.number_groups() != material.number_groups() {
            return Err(invalid(format!(
                "within-group solver has {} groups, material has {}",
                wg.number_groups(),
                material.number_groups()
            )));
        }
        if wg.sweep_source().is_adjoint() != config.adjoint {
            return Err(invalid("adjoint flag differs between outer and within-group solvers"));
        }

        let (tally, cmfd) = match config.acceleration {
            Acceleration::None => (None, None),
            Acceleration::Cmfd => {
                let coarse = Arc::new(CoarseMesh::new(Arc::clone(&mesh), config.coarse_mesh_level)?);
                let tally = CurrentTally::new(Arc::clone(&coarse), material.number_groups());
                let cmfd = CmfdAccelerator::new(coarse, boundaries, coarse_db)?;
                (Some(tally), Some(cmfd))
            }
        };

        Ok(Self {
            config,
            mesh,
            material,
            wg,
            tally,
            cmfd,
        })
    }

    pub fn config(&self) -> &MultigroupConfig {
        &self.config
    }

    pub fn within_group(&self) -> &W {
        &self.wg
    }

    pub fn within_group_mut(&mut self) -> &mut W {
        &mut self.wg
    }

    /// Coarse face currents of the last pass, when accelerated.
    pub fn tally(&self) -> Option<&CurrentTally> {
        self.tally.as_ref()
    }

    pub fn accelerator(&self) -> Option<&CmfdAccelerator> {
        self.cmfd.as_ref()
    }

    /// Run outer iterations on `phi` in place.
    ///
    /// A non-converged solve is reported through [`OuterReport::status`];
    /// `phi` always holds the last iterate.
    pub fn solve(&mut self, phi: &mut GroupFluxField, keff: f64) -> TransportResult<OuterReport> {
        let groups = self.wg.number_groups();
        if phi.number_groups() != groups {
            return Err(invalid(format!(
                "flux has {} groups, expected {groups}",
                phi.number_groups()
            )));
        }
        if phi.number_cells() != self.mesh.number_cells() {
            return Err(invalid(format!(
                "flux has {} cells, expected {}",
                phi.number_cells(),
                self.mesh.number_cells()
            )));
        }
        self.wg.setup_outer(keff, phi)?;

        let level = self.config.monitor_level;
        let sweeps_before = self.wg.number_sweeps();
        let mut residuals = Vec::new();
        let mut cmfd_updates = 0;
        let mut skipped_updates = 0;
        let mut group_residual = vec![0.0; groups];

        let mut status = OuterStatus::MaxIterationsReached;
        let mut iterations = self.config.max_iterations;
        for iteration in 0..=self.config.max_iterations {
            let snapshot = phi.clone();
            for step in 0..groups {
                let g = if self.config.adjoint {
                    groups - 1 - step
                } else {
                    step
                };
                self.wg.solve(g, phi, self.tally.as_mut())?;
            }

            for (g, r) in group_residual.iter_mut().enumerate() {
                *r = phi.phi(g).norm_residual(snapshot.phi(g), NormType::Linf);
            }
            // max() skips NaN, so a non-finite flux is caught separately
            let residual = if phi.is_finite() {
                group_residual.iter().fold(0.0_f64, |m, &r| m.max(r))
            } else {
                f64::NAN
            };
            residuals.push(residual);

            if level > 1 && iteration % self.config.print_interval == 0 {
                debug!(iteration, residual, groups = ?group_residual, "outer iteration");
            }

            if !residual.is_finite() {
                status = OuterStatus::Diverged;
                iterations = iteration;
                break;
            }
            if residual < self.config.tolerance {
                status = OuterStatus::Converged;
                iterations = iteration;
                break;
            }
            if iteration == self.config.max_iterations {
                break;
            }

            if let (Some(cmfd), Some(tally)) = (self.cmfd.as_mut(), self.tally.as_ref()) {
                match cmfd.update(self.material.as_ref(), phi, tally, self.wg.sweep_source()) {
                    Ok(update) if update.applied => cmfd_updates += 1,
                    Ok(_) => skipped_updates += 1,
                    Err(TransportError::DegenerateCell {
                        coarse_cell,
                        group,
                        value,
                    }) => {
                        warn!(
                            iteration,
                            coarse_cell, group, value, "degenerate coarse cell, correction skipped"
                        );
                        skipped_updates += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let report = OuterReport {
            status,
            iterations,
            residual: residuals.last().copied().unwrap_or(0.0),
            residuals,
            sweeps: self.wg.number_sweeps() - sweeps_before,
            cmfd_updates,
            skipped_updates,
        };
        if level > 0 {
            info!(
                status = ?report.status,
                iterations = report.iterations,
                residual = report.residual,
                sweeps = report.sweeps,
                cmfd_updates = report.cmfd_updates,
                skipped = report.skipped_updates,
                "multigroup solve finished"
            );
        }
        if report.status == OuterStatus::Diverged {
            warn!(iterations = report.iterations, "multigroup solve diverged");
        }
        Ok(report)
    }

    /// Coarse-mesh estimate of the dominant eigenpair from the current flux
    /// and the tally of the last pass. `None` without CMFD.
    pub fn coarse_criticality(
        &self,
        phi: &GroupFluxField,
    ) -> TransportResult<Option<DominantEigenpair>> {
        let (Some(cmfd), Some(tally)) = (self.cmfd.as_ref(), self.tally.as_ref()) else {
            return Ok(None);
        };
        let pair =
            cmfd.coarse_criticality(self.material.as_ref(), phi, tally, self.config.adjoint)?;
        Ok(Some(pair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::source::SweepSource;

    /// Records the group order and writes a fixed value into each group.
    #[derive(Debug)]
    struct Recorder {
        source: SweepSource,
        value: f64,
        visited: Vec<usize>,
    }

    impl Recorder {
        fn new(
            groups: usize,
            adjoint: bool,
            value: f64,
        ) -> (Self, Arc<CartesianMesh>, Arc<dyn MaterialProvider>) {
            let mesh = Arc::new(CartesianMesh::uniform_1d(2, 2.0, 0).unwrap());
            let mut mat = Material::new(1, groups).unwrap();
            for g in 0..groups {
                mat.set_sigma_t(0, g, 1.0).unwrap();
            }
            mat.finalize().unwrap();
            let material: Arc<dyn MaterialProvider> = Arc::new(mat);
            let source =
                SweepSource::new(Arc::clone(&mesh), Arc::clone(&material), vec![], false, adjoint)
                    .unwrap();
            let recorder = Self {
                source,
                value,
                visited: Vec::new(),
            };
            (recorder, mesh, material)
        }
    }

    impl WithinGroupSolver for Recorder {
        fn number_groups(&self) -> usize {
            3
        }

        fn setup_outer(&mut self, keff: f64, phi: &GroupFluxField) -> TransportResult<()> {
            self.source.setup_outer(keff, phi)
        }

        fn solve(
            &mut self,
            g: usize,
            phi: &mut GroupFluxField,
            _tally: Option<&mut CurrentTally>,
        ) -> TransportResult<()> {
            self.visited.push(g);
            phi.phi_mut(g).fill(self.value);
            Ok(())
        }

        fn sweep_source(&self) -> &SweepSource {
            &self.source
        }

        fn number_sweeps(&self) -> usize {
            self.visited.len()
        }
    }

    fn outer(adjoint: bool) -> MultigroupConfig {
        MultigroupConfig {
            acceleration: Acceleration::None,
            adjoint,
            ..MultigroupConfig::default()
        }
    }

    #[test]
    fn adjoint_reverses_group_order() {
        let (wg, mesh, material) = Recorder::new(3, true, 1.0);
        let bcs = Boundaries::default();
        let mut solver =
            MultigroupSolver::with_config(outer(true), SolverDb::new(), mesh, material, bcs, wg)
                .unwrap();
        let mut phi = GroupFluxField::uniform(3, 2, 1.0);
        let report = solver.solve(&mut phi, 1.0).unwrap();
        assert_eq!(report.status, OuterStatus::Converged);
        assert_eq!(report.iterations, 0);
        assert_eq!(solver.within_group().visited, vec![2, 1, 0]);
    }

    #[test]
    fn non_finite_flux_is_divergence() {
        let (wg, mesh, material) = Recorder::new(3, false, f64::NAN);
        let bcs = Boundaries::default();
        let mut solver =
            MultigroupSolver::with_config(outer(false), SolverDb::new(), mesh, material, bcs, wg)
                .unwrap();
        let mut phi = GroupFluxField::uniform(3, 2, 1.0);
        let report = solver.solve(&mut phi, 1.0).unwrap();
        assert_eq!(report.status, OuterStatus::Diverged);
        assert!(!report.converged());
        assert_eq!(report.sweeps, 3);
        assert_eq!(solver.within_group().visited, vec![0, 1, 2]);
    }

    #[test]
    fn flux_with_wrong_cell_count_rejected() {
        let (wg, mesh, material) = Recorder::new(3, false, 1.0);
        let bcs = Boundaries::default();
        let mut solver =
            MultigroupSolver::with_config(outer(false), SolverDb::new(), mesh, material, bcs, wg)
                .unwrap();
        let mut phi = GroupFluxField::uniform(3, 1, 1.0);
        let err = solver.solve(&mut phi, 1.0).unwrap_err();
        assert!(matches!(err, TransportError::InvalidArgument { .. }));
        assert!(solver.within_group().visited.is_empty());
    }

    #[test]
    fn config_from_db() {
        let db = SolverDb::new()
            .with("outer_tolerance", 1e-8)
            .with("max_outer_iterations", 7_i64)
            .with("outer_acceleration", "none")
            .with("adjoint", true);
        let config = MultigroupConfig::from_db(&db).unwrap();
        assert_eq!(config.tolerance, 1e-8);
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.acceleration, Acceleration::None);
        assert!(config.adjoint);
        assert_eq!(config.coarse_mesh_level, 2);
    }

    #[test]
    fn invalid_options_rejected() {
        let db = SolverDb::new().with("outer_tolerance", -1.0);
        assert!(MultigroupConfig::from_db(&db).is_err());
        let db = SolverDb::new().with("outer_acceleration", "anderson");
        assert!(MultigroupConfig::from_db(&db).is_err());
        let db = SolverDb::new().with("cmfd_coarse_mesh_level", 0_i64);
        assert!(MultigroupConfig::from_db(&db).is_err());
        let db = SolverDb::new().with("monitor_level", 3_i64);
        assert!(matches!(
            MultigroupConfig::from_db(&db),
            Err(TransportError::Core(CoreError::InvalidArg { .. }))
        ));
        let config = MultigroupConfig {
            monitor_level: 7,
            ..MultigroupConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
