//! Coarse-mesh finite-difference acceleration.
//!
//! One update homogenizes the fine problem, builds the coarse multigroup
//! diffusion operator with current-consistent face corrections, solves it,
//! and rescales the fine flux cell by cell with the coarse correction.

use std::sync::Arc;

use nt_core::{SolverDb, checked_ratio};
use nt_linalg::{Matrix, SparseMatrix, Vector};
use nt_solver::{
    DenseEigenSolver, DominantEigenpair, EigenConfig, LinearSolveReport, LinearSolver,
    LinearStatus,
};
use tracing::{debug, warn};

use crate::coarse::{CoarseMesh, CoarseMeshMapping};
use crate::error::{TransportError, TransportResult, invalid};
use crate::homogenize::{Homogenized, homogenize};
use crate::material::MaterialProvider;
use crate::mesh::{AXES, Boundaries, BoundaryCondition, Side, boundary_coupling, coupling};
use crate::source::SweepSource;
use crate::state::GroupFluxField;
use crate::tally::CurrentTally;

/// Whether fission appears in the coarse loss operator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FissionTerm {
    /// Fission is a fixed source (or absent).
    Excluded,
    /// Multiplying problem: `-chi nu sigma_f / k` enters the operator.
    Implicit { inv_keff: f64 },
}

/// Correction factor making `J = -D~ (phi_r - phi_l) - D^ (phi_r + phi_l)` exact.
fn correction(current: f64, d_tilde: f64, phi_l: f64, phi_r: f64) -> f64 {
    let sum = phi_r + phi_l;
    if sum == 0.0 {
        0.0
    } else {
        -(current + d_tilde * (phi_r - phi_l)) / sum
    }
}

/// Coarse multigroup loss operator, unknowns ordered `g * cells + c`.
///
/// Rows are balances per unit volume: leakage, removal, scattering from
/// other groups and (optionally) fission. For the adjoint problem the
/// group-coupling blocks are transposed; leakage is unchanged.
pub fn loss_operator(
    coarse: &CoarseMesh,
    boundaries: &Boundaries,
    hom: &Homogenized,
    tally: &CurrentTally,
    fission: FissionTerm,
    adjoint: bool,
) -> TransportResult<SparseMatrix> {
    let mesh = coarse.coarse_mesh();
    let mat = &hom.material;
    let nc = mesh.number_cells();
    let groups = mat.number_groups();
    if tally.number_groups() != groups {
        return Err(invalid(format!(
            "tally has {} groups, material has {groups}",
            tally.number_groups()
        )));
    }
    let n = groups * nc;
    let mut triplets: Vec<(usize, usize, f64)> = Vec::with_capacity(n * (2 * AXES + groups));

    for g in 0..groups {
        let phi = &hom.flux[g];
        for c in 0..nc {
            let row = g * nc + c;
            let coords = mesh.cell_coords(c);
            let d_c = mat.diff_coef(c, g);
            let mut diag = mat.sigma_t(c, g) - mat.sigma_s(c, g, g);

            for axis in 0..mesh.dimension() {
                let h_c = mesh.width(axis, coords[axis]);
                let scale = mesh.face_area(axis, c) / mesh.volume(c);
                for high in [false, true] {
                    let mut face = coords;
                    if high {
                        face[axis] += 1;
                    }
                    let current = tally.current(axis, face, g);
                    match mesh.neighbor(c, axis, high) {
                        Some(nb) => {
                            let h_n = mesh.width(axis, mesh.cell_coords(nb)[axis]);
                            let d_tilde = coupling(d_c, h_c, mat.diff_coef(nb, g), h_n);
                            let (phi_l, phi_r) = if high {
                                (phi[c], phi[nb])
                            } else {
                                (phi[nb], phi[c])
                            };
                            let d_hat = correction(current, d_tilde, phi_l, phi_r);
                            // outgoing current of c in terms of (phi_c, phi_nb)
                            let (own, other) = if high {
                                (d_tilde - d_hat, -(d_tilde + d_hat))
                            } else {
                                (d_tilde + d_hat, -(d_tilde - d_hat))
                            };
                            diag += scale * own;
                            triplets.push((row, g * nc + nb, scale * other));
                        }
                        None => {
                            let bc = boundaries.get(Side::new(axis, high));
                            let d_tilde = boundary_coupling(bc, d_c, h_c);
                            let outgoing = if high { current } else { -current };
                            let d_hat = match bc {
                                BoundaryCondition::Reflective => 0.0,
                                BoundaryCondition::Vacuum if phi[c] != 0.0 => {
                                    outgoing / phi[c] - d_tilde
                                }
                                BoundaryCondition::Vacuum => 0.0,
                            };
                            diag += scale * (d_tilde + d_hat);
                        }
                    }
                }
            }
            triplets.push((row, row, diag));

            for gp in 0..groups {
                let col = gp * nc + c;
                if gp != g {
                    let s = if adjoint {
                        mat.sigma_s(c, gp, g)
                    } else {
                        mat.sigma_s(c, g, gp)
                    };
                    if s != 0.0 {
                        triplets.push((row, col, -s));
                    }
                }
                if let FissionTerm::Implicit { inv_keff } = fission {
                    let f = fission_coupling(mat, c, g, gp, adjoint);
                    if f != 0.0 {
                        triplets.push((row, col, -f * inv_keff));
                    }
                }
            }
        }
    }

    Ok(SparseMatrix::from_triplets(n, n, &triplets)?)
}

/// Fission production operator `chi_g nu sigma_f_g'` (transposed for the adjoint).
pub fn production_operator(hom: &Homogenized, adjoint: bool) -> TransportResult<SparseMatrix> {
    let mat = &hom.material;
    let nc = mat.number_materials();
    let groups = mat.number_groups();
    let mut triplets = Vec::new();
    for g in 0..groups {
        for gp in 0..groups {
            for c in 0..nc {
                let f = fission_coupling(mat, c, g, gp, adjoint);
                if f != 0.0 {
                    triplets.push((g * nc + c, gp * nc + c, f));
                }
            }
        }
    }
    let n = groups * nc;
    Ok(SparseMatrix::from_triplets(n, n, &triplets)?)
}

fn fission_coupling(
    mat: &dyn MaterialProvider,
    c: usize,
    g: usize,
    gp: usize,
    adjoint: bool,
) -> f64 {
    if adjoint {
        mat.nu_sigma_f(c, g) * mat.chi(c, gp)
    } else {
        mat.chi(c, g) * mat.nu_sigma_f(c, gp)
    }
}

/// Scale every fine flux by `x / x0` of its coarse cell and group.
///
/// All ratios are checked before the flux is touched: a (numerically) zero
/// `x0` or a non-finite ratio fails with [`TransportError::DegenerateCell`]
/// and leaves `phi` unchanged.
pub fn prolongate(
    phi: &mut GroupFluxField,
    mapping: &CoarseMeshMapping,
    x: &Vector,
    x0: &Vector,
) -> TransportResult<()> {
    let nc = mapping.number_coarse_cells();
    let groups = phi.number_groups();
    if x.len() != groups * nc || x0.len() != groups * nc {
        return Err(invalid(format!(
            "coarse vectors of length {} and {} for {groups} groups x {nc} cells",
            x.len(),
            x0.len()
        )));
    }

    let mut ratio = Vec::with_capacity(groups * nc);
    for g in 0..groups {
        for c in 0..nc {
            let k = g * nc + c;
            let r = checked_ratio(x[k], x0[k]).ok_or(TransportError::DegenerateCell {
                coarse_cell: c,
                group: g,
                value: x0[k],
            })?;
            ratio.push(r);
        }
    }

    for g in 0..groups {
        let flux = phi.phi_mut(g);
        for (i, v) in flux.iter_mut().enumerate() {
            *v *= ratio[g * nc + mapping.coarse_cell(i)];
        }
    }
    Ok(())
}

/// Outcome of one coarse-mesh update.
#[derive(Clone, Debug)]
pub struct CmfdUpdate {
    pub report: LinearSolveReport,
    /// False when the coarse solve diverged and the flux was left alone.
    pub applied: bool,
}

/// Coarse-mesh accelerator for a fixed coarse mesh and boundary set.
#[derive(Debug)]
pub struct CmfdAccelerator {
    coarse: Arc<CoarseMesh>,
    boundaries: Boundaries,
    solver: LinearSolver,
    solver_db: SolverDb,
    eigen: EigenConfig,
}

impl CmfdAccelerator {
    /// `solver_db` configures the coarse linear solve, its preconditioner
    /// and the coarse eigenvalue estimate.
    pub fn new(
        coarse: Arc<CoarseMesh>,
        boundaries: Boundaries,
        solver_db: SolverDb,
    ) -> TransportResult<Self> {
        Ok(Self {
            coarse,
            boundaries,
            solver: LinearSolver::from_db(&solver_db)?,
            eigen: EigenConfig::from_db(&solver_db)?,
            solver_db,
        })
    }

    pub fn coarse_mesh(&self) -> &Arc<CoarseMesh> {
        &self.coarse
    }

    /// Homogenize, build, solve and prolongate.
    ///
    /// Fission treatment, `1 / k` and the adjoint flag come from `source`,
    /// so the coarse problem matches the within-group problem.
    pub fn update(
        &mut self,
        material: &dyn MaterialProvider,
        phi: &mut GroupFluxField,
        tally: &CurrentTally,
        source: &SweepSource,
    ) -> TransportResult<CmfdUpdate> {
        let adjoint = source.is_adjoint();
        let hom = homogenize(material, &self.coarse, phi, adjoint)?;
        let fission = if source.is_multiplying() {
            FissionTerm::Implicit {
                inv_keff: source.inv_keff(),
            }
        } else {
            FissionTerm::Excluded
        };
        let op = loss_operator(&self.coarse, &self.boundaries, &hom, tally, fission, adjoint)?;

        let mapping = self.coarse.mapping();
        let mesh = self.coarse.fine_mesh();
        let nc = mapping.number_coarse_cells();
        let groups = phi.number_groups();
        let mut b = Vector::zeros(groups * nc);
        for g in 0..groups {
            let q = source.build_fixed(g);
            for i in 0..mesh.number_cells() {
                let c = mapping.coarse_cell(i);
                b[g * nc + c] += q[i] * mesh.volume(i) / mapping.coarse_volume(c);
            }
        }
        let x0 = Vector::from_iterator(
            groups * nc,
            hom.flux.iter().flat_map(|f| f.iter().copied()),
        );

        let mut x = x0.clone();
        self.solver
            .set_operators(Arc::new(Matrix::from(op)), Some(&self.solver_db))?;
        let report = self.solver.solve(&b, &mut x)?;
        debug!(
            status = ?report.status,
            iterations = report.iterations,
            residual = report.residual_norm,
            "coarse solve"
        );
        if report.status == LinearStatus::Diverge {
            warn!(
                iterations = report.iterations,
                "coarse solve diverged, correction skipped"
            );
            return Ok(CmfdUpdate {
                report,
                applied: false,
            });
        }

        prolongate(phi, mapping, &x, &x0)?;
        Ok(CmfdUpdate {
            report,
            applied: true,
        })
    }

    /// Dominant eigenpair of `F x = k M x` on the coarse mesh.
    ///
    /// `M` is the loss operator without fission and `F` the production
    /// operator, both built from the current flux and tally.
    pub fn coarse_criticality(
        &self,
        material: &dyn MaterialProvider,
        phi: &GroupFluxField,
        tally: &CurrentTally,
        adjoint: bool,
    ) -> TransportResult<DominantEigenpair> {
        let hom = homogenize(material, &self.coarse, phi, adjoint)?;
        let loss = loss_operator(
            &self.coarse,
            &self.boundaries,
            &hom,
            tally,
            FissionTerm::Excluded,
            adjoint,
        )?;
        let production = production_operator(&hom, adjoint)?;

        let m = Matrix::from(Matrix::from(loss).to_dense()?);
        let f = Matrix::from(Matrix::from(production).to_dense()?);
        let mut eigen = DenseEigenSolver::new(self.eigen.clone());
        eigen.set_operators(&f, Some(&m))?;
        Ok(eigen.solve()?)
    }
}
