//! Within-group solvers.
//!
//! The outer solver only needs [`WithinGroupSolver`]. [`DiffusionGroupSolver`]
//! is a cell-centered finite-volume diffusion implementation of it that also
//! tallies the fine face currents crossing coarse faces.

use std::sync::Arc;

use nt_core::SolverDb;
use nt_linalg::{Matrix, SparseMatrix, Vector};
use nt_solver::LinearSolver;
use tracing::warn;

use crate::error::{TransportResult, invalid};
use crate::material::MaterialProvider;
use crate::mesh::{AXES, Boundaries, CartesianMesh, Side, boundary_coupling, coupling};
use crate::source::SweepSource;
use crate::state::GroupFluxField;
use crate::tally::CurrentTally;

/// Per-group solve driven by the outer iteration.
pub trait WithinGroupSolver {
    fn number_groups(&self) -> usize;

    /// Fix eigenvalue-dependent sources before an outer solve.
    fn setup_outer(&mut self, keff: f64, phi: &GroupFluxField) -> TransportResult<()>;

    /// Update group `g` of `phi` in place. When a tally is given, its
    /// entries for `g` are replaced by the currents of this solve.
    fn solve(
        &mut self,
        g: usize,
        phi: &mut GroupFluxField,
        tally: Option<&mut CurrentTally>,
    ) -> TransportResult<()>;

    fn sweep_source(&self) -> &SweepSource;

    /// Group solves performed so far.
    fn number_sweeps(&self) -> usize;
}

/// Diffusion solve per group on a Cartesian mesh.
pub struct DiffusionGroupSolver {
    mesh: Arc<CartesianMesh>,
    material: Arc<dyn MaterialProvider>,
    boundaries: Boundaries,
    source: SweepSource,
    solvers: Vec<LinearSolver>,
    sweeps: usize,
}

impl DiffusionGroupSolver {
    /// Assemble one operator per group; `db` configures the linear solves.
    pub fn new(
        mesh: Arc<CartesianMesh>,
        material: Arc<dyn MaterialProvider>,
        boundaries: Boundaries,
        source: SweepSource,
        db: &SolverDb,
    ) -> TransportResult<Self> {
        let groups = material.number_groups();
        let mut solvers = Vec::with_capacity(groups);
        for g in 0..groups {
            let op = diffusion_operator(&mesh, material.as_ref(), &boundaries, g)?;
            let mut solver = LinearSolver::from_db(db)?;
            solver.set_operators(Arc::new(Matrix::from(op)), Some(db))?;
            solvers.push(solver);
        }
        Ok(Self {
            mesh,
            material,
            boundaries,
            source,
            solvers,
            sweeps: 0,
        })
    }

    fn diffusion(&self, cell: usize, g: usize) -> f64 {
        self.material.diff_coef(self.mesh.material_index(cell), g)
    }

    /// Net currents along `+axis` on fine faces that lie on coarse faces.
    fn tally_currents(&self, g: usize, phi: &Vector, tally: &mut CurrentTally) {
        let mesh = &self.mesh;
        for axis in 0..mesh.dimension() {
            for cell in 0..mesh.number_cells() {
                let coords = mesh.cell_coords(cell);
                let d = self.diffusion(cell, g);
                let h = mesh.width(axis, coords[axis]);

                if coords[axis] == 0 && tally.is_tallied_edge(axis, 0) {
                    let bc = self.boundaries.get(Side::new(axis, false));
                    let current = -boundary_coupling(bc, d, h) * phi[cell];
                    tally.tally(axis, coords, g, current);
                }

                let edge = coords[axis] + 1;
                if !tally.is_tallied_edge(axis, edge) {
                    continue;
                }
                let current = match mesh.neighbor(cell, axis, true) {
                    Some(nb) => {
                        let h_n = mesh.width(axis, edge);
                        let d_tilde = coupling(d, h, self.diffusion(nb, g), h_n);
                        -d_tilde * (phi[nb] - phi[cell])
                    }
                    None => {
                        let bc = self.boundaries.get(Side::new(axis, true));
                        boundary_coupling(bc, d, h) * phi[cell]
                    }
                };
                let mut face = coords;
                face[axis] = edge;
                tally.tally(axis, face, g, current);
            }
        }
    }
}

impl WithinGroupSolver for DiffusionGroupSolver {
    fn number_groups(&self) -> usize {
        self.solvers.len()
    }

    fn setup_outer(&mut self, keff: f64, phi: &GroupFluxField) -> TransportResult<()> {
        self.source.setup_outer(keff, phi)
    }

    fn solve(
        &mut self,
        g: usize,
        phi: &mut GroupFluxField,
        tally: Option<&mut CurrentTally>,
    ) -> TransportResult<()> {
        if g >= self.solvers.len() {
            return Err(invalid(format!(
                "group {g} out of range for {} groups",
                self.solvers.len()
            )));
        }
        let b = self.source.build_total(g, phi);
        let mut x = phi.phi(g).clone();
        let report = self.solvers[g].solve(&b, &mut x)?;
        if !report.converged() {
            warn!(
                group = g,
                status = ?report.status,
                residual = report.residual_norm,
                "within-group solve did not converge"
            );
        }
        *phi.phi_mut(g) = x;
        self.sweeps += 1;

        if let Some(tally) = tally {
            tally.reset_group(g);
            self.tally_currents(g, phi.phi(g), tally);
        }
        Ok(())
    }

    fn sweep_source(&self) -> &SweepSource {
        &self.source
    }

    fn number_sweeps(&self) -> usize {
        self.sweeps
    }
}

impl std::fmt::Debug for DiffusionGroupSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffusionGroupSolver")
            .field("cells", &self.mesh.number_cells())
            .field("groups", &self.solvers.len())
            .field("boundaries", &self.boundaries)
            .field("source", &self.source)
            .field("sweeps", &self.sweeps)
            .finish()
    }
}

/// Per-unit-volume diffusion operator of group `g`: leakage plus removal
/// `sigma_t - sigma_s(g <- g)`.
pub fn diffusion_operator(
    mesh: &CartesianMesh,
    material: &dyn MaterialProvider,
    boundaries: &Boundaries,
    g: usize,
) -> TransportResult<SparseMatrix> {
    let n = mesh.number_cells();
    let mut triplets = Vec::with_capacity(n * (2 * AXES + 1));
    for cell in 0..n {
        let m = mesh.material_index(cell);
        if m >= material.number_materials() {
            return Err(invalid(format!("mesh references unknown material {m}")));
        }
        let coords = mesh.cell_coords(cell);
        let d = material.diff_coef(m, g);
        let mut diag = material.sigma_t(m, g) - material.sigma_s(m, g, g);
        for axis in 0..mesh.dimension() {
            let h = mesh.width(axis, coords[axis]);
            let scale = mesh.face_area(axis, cell) / mesh.volume(cell);
            for high in [false, true] {
                match mesh.neighbor(cell, axis, high) {
                    Some(nb) => {
                        let h_n = mesh.width(axis, mesh.cell_coords(nb)[axis]);
                        let d_n = material.diff_coef(mesh.material_index(nb), g);
                        let d_tilde = coupling(d, h, d_n, h_n);
                        diag += scale * d_tilde;
                        triplets.push((cell, nb, -scale * d_tilde));
                    }
                    None => {
                        let bc = boundaries.get(Side::new(axis, high));
                        diag += scale * boundary_coupling(bc, d, h);
                    }
                }
            }
        }
        triplets.push((cell, cell, diag));
    }
    Ok(SparseMatrix::from_triplets(n, n, &triplets)?)
}
