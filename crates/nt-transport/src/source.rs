//! Right-hand-side builder for within-group solves.

use std::sync::Arc;

use nt_linalg::Vector;

use crate::error::{TransportResult, invalid};
use crate::material::MaterialProvider;
use crate::mesh::CartesianMesh;
use crate::state::GroupFluxField;

/// Builds fixed, in-scatter and fission sources for one group.
///
/// For the adjoint problem the group coupling is transposed: scattering is
/// read as `g -> g'` and the roles of `chi` and `nu sigma_f` swap.
pub struct SweepSource {
    mesh: Arc<CartesianMesh>,
    material: Arc<dyn MaterialProvider>,
    external: Vec<Vector>,
    multiply: bool,
    adjoint: bool,
    inv_keff: f64,
    /// Frozen fission density, already scaled by `1 / k`.
    fission_density: Option<Vector>,
}

impl SweepSource {
    /// `external` holds one source density per group, or nothing.
    pub fn new(
        mesh: Arc<CartesianMesh>,
        material: Arc<dyn MaterialProvider>,
        external: Vec<Vector>,
        multiply: bool,
        adjoint: bool,
    ) -> TransportResult<Self> {
        let groups = material.number_groups();
        if !external.is_empty() && external.len() != groups {
            return Err(invalid(format!(
                "{} external sources for {groups} groups",
                external.len()
            )));
        }
        if let Some(q) = external.iter().find(|q| q.len() != mesh.number_cells()) {
            return Err(invalid(format!(
                "external source has {} entries for {} cells",
                q.len(),
                mesh.number_cells()
            )));
        }
        if let Some(&m) = mesh
            .material_map()
            .iter()
            .find(|&&m| m >= material.number_materials())
        {
            return Err(invalid(format!("mesh references unknown material {m}")));
        }
        Ok(Self {
            mesh,
            material,
            external,
            multiply,
            adjoint,
            inv_keff: 1.0,
            fission_density: None,
        })
    }

    pub fn is_multiplying(&self) -> bool {
        self.multiply
    }

    pub fn is_adjoint(&self) -> bool {
        self.adjoint
    }

    pub fn inv_keff(&self) -> f64 {
        self.inv_keff
    }

    /// Fix the eigenvalue for the coming outer solve.
    ///
    /// Non-multiplying problems freeze the fission density of `phi`;
    /// multiplying problems keep fission implicit and only store `1 / k`.
    pub fn setup_outer(&mut self, keff: f64, phi: &GroupFluxField) -> TransportResult<()> {
        if !(keff.is_finite() && keff > 0.0) {
            return Err(invalid(format!("keff must be positive, got {keff}")));
        }
        let cells = self.mesh.number_cells();
        let groups = self.material.number_groups();
        if phi.number_cells() != cells || phi.number_groups() != groups {
            return Err(invalid(format!(
                "flux is {}x{} (groups x cells), expected {groups}x{cells}",
                phi.number_groups(),
                phi.number_cells()
            )));
        }
        self.inv_keff = 1.0 / keff;
        self.fission_density = if self.multiply {
            None
        } else {
            let mut density = self.fission_density_of(phi);
            density *= self.inv_keff;
            Some(density)
        };
        Ok(())
    }

    /// Per-cell fission rate, `sum_g' nu sigma_f(g') phi(g')` (adjoint: `chi`).
    fn fission_density_of(&self, phi: &GroupFluxField) -> Vector {
        let n = self.mesh.number_cells();
        Vector::from_fn(n, |i, _| {
            let m = self.mesh.material_index(i);
            (0..phi.number_groups())
                .map(|gp| self.fission_emission(m, gp) * phi.phi(gp)[i])
                .sum()
        })
    }

    fn fission_emission(&self, m: usize, g: usize) -> f64 {
        if self.adjoint {
            self.material.chi(m, g)
        } else {
            self.material.nu_sigma_f(m, g)
        }
    }

    fn fission_spectrum(&self, m: usize, g: usize) -> f64 {
        if self.adjoint {
            self.material.nu_sigma_f(m, g)
        } else {
            self.material.chi(m, g)
        }
    }

    /// External source plus, for non-multiplying problems, the frozen fission source.
    pub fn build_fixed(&self, g: usize) -> Vector {
        let n = self.mesh.number_cells();
        let mut q = self
            .external
            .get(g)
            .cloned()
            .unwrap_or_else(|| Vector::zeros(n));
        if let Some(density) = &self.fission_density {
            for i in 0..n {
                q[i] += self.fission_spectrum(self.mesh.material_index(i), g) * density[i];
            }
        }
        q
    }

    /// Scattering into `g` from every other group.
    pub fn build_in_scatter(&self, g: usize, phi: &GroupFluxField) -> Vector {
        let n = self.mesh.number_cells();
        Vector::from_fn(n, |i, _| {
            let m = self.mesh.material_index(i);
            (0..phi.number_groups())
                .filter(|&gp| gp != g)
                .map(|gp| {
                    let s = if self.adjoint {
                        self.material.sigma_s(m, gp, g)
                    } else {
                        self.material.sigma_s(m, g, gp)
                    };
                    s * phi.phi(gp)[i]
                })
                .sum()
        })
    }

    /// Fission source of a multiplying problem from the current flux; zero otherwise.
    pub fn build_fission(&self, g: usize, phi: &GroupFluxField) -> Vector {
        let n = self.mesh.number_cells();
        if !self.multiply {
            return Vector::zeros(n);
        }
        let density = self.fission_density_of(phi);
        Vector::from_fn(n, |i, _| {
            self.fission_spectrum(self.mesh.material_index(i), g) * density[i] * self.inv_keff
        })
    }

    /// Everything that drives group `g`.
    pub fn build_total(&self, g: usize, phi: &GroupFluxField) -> Vector {
        self.build_fixed(g) + self.build_in_scatter(g, phi) + self.build_fission(g, phi)
    }
}

impl std::fmt::Debug for SweepSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepSource")
            .field("groups", &self.material.number_groups())
            .field("multiply", &self.multiply)
            .field("adjoint", &self.adjoint)
            .field("inv_keff", &self.inv_keff)
            .finish()
    }
}
