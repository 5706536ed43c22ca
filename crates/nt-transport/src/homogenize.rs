//! Flux-weighted homogenization onto a coarse mesh.
//!
//! Reaction rates are preserved: for every coarse cell `c`,
//! `sigma_hom * phi_c * V_c = sum_i sigma_i * phi_i * V_i` over its fine
//! cells, where `phi_c` is the volume-averaged flux. Coarse cells with zero
//! flux weight fall back to volume weighting. Groups are independent and
//! are homogenized in parallel.

use nt_linalg::Vector;
use rayon::prelude::*;

use crate::coarse::CoarseMesh;
use crate::error::{TransportResult, invalid};
use crate::material::{Material, MaterialProvider};
use crate::state::GroupFluxField;

/// Coarse material (material `c` belongs to coarse cell `c`) and the
/// volume-averaged coarse flux.
#[derive(Clone, Debug)]
pub struct Homogenized {
    pub material: Material,
    pub flux: Vec<Vector>,
}

/// Running weighted and volume-weighted sums per coarse cell.
struct Accumulator {
    weighted: Vec<f64>,
    weight: Vec<f64>,
    by_volume: Vec<f64>,
    volume: Vec<f64>,
}

impl Accumulator {
    fn new(n: usize) -> Self {
        Self {
            weighted: vec![0.0; n],
            weight: vec![0.0; n],
            by_volume: vec![0.0; n],
            volume: vec![0.0; n],
        }
    }

    /// `weight` already includes the cell volume.
    fn add(&mut self, c: usize, value: f64, weight: f64, volume: f64) {
        self.weighted[c] += value * weight;
        self.weight[c] += weight;
        self.by_volume[c] += value * volume;
        self.volume[c] += volume;
    }

    fn finish(self) -> Vec<f64> {
        (0..self.weight.len())
            .map(|c| {
                if self.weight[c] > 0.0 {
                    self.weighted[c] / self.weight[c]
                } else if self.volume[c] > 0.0 {
                    self.by_volume[c] / self.volume[c]
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Homogenized data of one group.
struct GroupData {
    sigma_t: Vec<f64>,
    sigma_a: Vec<f64>,
    diff_coef: Vec<f64>,
    nu_sigma_f: Vec<f64>,
    sigma_f: Vec<f64>,
    chi: Vec<f64>,
    /// `scatter[gp][c]` is scattering from `gp` into this group.
    scatter: Vec<Vec<f64>>,
    flux: Vector,
}

/// Homogenize `material` over `coarse` with weights from `phi`.
///
/// Scattering `gp -> g` is weighted with the flux of the group it is
/// multiplied by in the balance equation: the source group `gp` for the
/// forward problem, the destination group `g` for the adjoint. Fission
/// data follows the same rule through the fission production rate.
pub fn homogenize(
    material: &dyn MaterialProvider,
    coarse: &CoarseMesh,
    phi: &GroupFluxField,
    adjoint: bool,
) -> TransportResult<Homogenized> {
    let mesh = coarse.fine_mesh();
    let mapping = coarse.mapping();
    let groups = material.number_groups();
    let nc = coarse.number_coarse_cells();
    let nf = mesh.number_cells();
    if phi.number_groups() != groups || phi.number_cells() != nf {
        return Err(invalid(format!(
            "flux has {} groups x {} cells, expected {groups} x {nf}",
            phi.number_groups(),
            phi.number_cells()
        )));
    }

    // volume-integrated fission production, per fine cell
    let production: Vec<f64> = (0..nf)
        .map(|i| {
            let m = mesh.material_index(i);
            let rate: f64 = (0..groups)
                .map(|g| {
                    let emission = if adjoint {
                        material.chi(m, g)
                    } else {
                        material.nu_sigma_f(m, g)
                    };
                    emission * phi.phi(g)[i]
                })
                .sum();
            rate * mesh.volume(i)
        })
        .collect();

    let per_group: Vec<GroupData> = (0..groups)
        .into_par_iter()
        .map(|g| {
            let mut sigma_t = Accumulator::new(nc);
            let mut sigma_a = Accumulator::new(nc);
            let mut diff = Accumulator::new(nc);
            let mut nu_sigma_f = Accumulator::new(nc);
            let mut sigma_f = Accumulator::new(nc);
            let mut chi = Accumulator::new(nc);
            let mut scatter: Vec<Accumulator> = (0..groups).map(|_| Accumulator::new(nc)).collect();
            let mut flux = Vector::zeros(nc);

            for i in 0..nf {
                let c = mapping.coarse_cell(i);
                let m = mesh.material_index(i);
                let v = mesh.volume(i);
                let w = phi.phi(g)[i] * v;

                flux[c] += w;
                sigma_t.add(c, material.sigma_t(m, g), w, v);
                sigma_a.add(c, material.sigma_a(m, g), w, v);
                diff.add(c, material.diff_coef(m, g), w, v);
                let fission_weight = if adjoint { production[i] } else { w };
                nu_sigma_f.add(c, material.nu_sigma_f(m, g), fission_weight, v);
                sigma_f.add(c, material.sigma_f(m, g), fission_weight, v);
                let chi_weight = if adjoint { w } else { production[i] };
                chi.add(c, material.chi(m, g), chi_weight, v);
                for (gp, acc) in scatter.iter_mut().enumerate() {
                    let sw = if adjoint { w } else { phi.phi(gp)[i] * v };
                    acc.add(c, material.sigma_s(m, g, gp), sw, v);
                }
            }
            for c in 0..nc {
                flux[c] /= mapping.coarse_volume(c);
            }

            GroupData {
                sigma_t: sigma_t.finish(),
                sigma_a: sigma_a.finish(),
                diff_coef: diff.finish(),
                nu_sigma_f: nu_sigma_f.finish(),
                sigma_f: sigma_f.finish(),
                chi: chi.finish(),
                scatter: scatter.into_iter().map(Accumulator::finish).collect(),
                flux,
            }
        })
        .collect();

    let mut coarse_material = Material::new(nc, groups)?;
    let mut flux = Vec::with_capacity(groups);
    for (g, data) in per_group.into_iter().enumerate() {
        for c in 0..nc {
            coarse_material
                .set_sigma_t(c, g, data.sigma_t[c])?
                .set_sigma_a(c, g, data.sigma_a[c])?
                .set_diff_coef(c, g, data.diff_coef[c])?
                .set_nu_sigma_f(c, g, data.nu_sigma_f[c])?
                .set_sigma_f(c, g, data.sigma_f[c])?
                .set_chi(c, g, data.chi[c])?;
            for (gp, s) in data.scatter.iter().enumerate() {
                coarse_material.set_sigma_s(c, g, gp, s[c])?;
            }
        }
        flux.push(data.flux);
    }
    coarse_material.mark_finalized();

    Ok(Homogenized {
        material: coarse_material,
        flux,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::CartesianMesh;
    use std::sync::Arc;

    fn two_materials() -> Material {
        let mut mat = Material::new(2, 1).unwrap();
        mat.set_sigma_t(0, 0, 1.0).unwrap();
        mat.set_sigma_t(1, 0, 3.0).unwrap();
        mat.set_sigma_s(0, 0, 0, 0.5).unwrap();
        mat.set_sigma_s(1, 0, 0, 1.0).unwrap();
        mat.finalize().unwrap();
        mat
    }

    #[test]
    fn reaction_rates_are_preserved() {
        let fine = Arc::new(CartesianMesh::new_1d(vec![1.0, 2.0], vec![0, 1]).unwrap());
        let coarse = CoarseMesh::new(fine, 2).unwrap();
        let phi = GroupFluxField::from_groups(vec![Vector::from_vec(vec![2.0, 1.0])]).unwrap();
        let hom = homogenize(&two_materials(), &coarse, &phi, false).unwrap();

        // phi_c = (2*1 + 1*2) / 3
        let phi_c = 4.0 / 3.0;
        assert!((hom.flux[0][0] - phi_c).abs() < 1e-14);
        // sigma_t: (1*2 + 3*2) / 4
        assert!((hom.material.sigma_t(0, 0) - 2.0).abs() < 1e-14);
        let rate = hom.material.sigma_t(0, 0) * phi_c * 3.0;
        assert!((rate - (1.0 * 2.0 + 3.0 * 2.0)).abs() < 1e-12);
        assert!(hom.material.is_finalized());
    }

    #[test]
    fn zero_flux_falls_back_to_volume_weighting() {
        let fine = Arc::new(CartesianMesh::new_1d(vec![1.0, 3.0], vec![0, 1]).unwrap());
        let coarse = CoarseMesh::new(fine, 2).unwrap();
        let phi = GroupFluxField::new(1, 2);
        let hom = homogenize(&two_materials(), &coarse, &phi, false).unwrap();
        assert!((hom.material.sigma_t(0, 0) - 2.5).abs() < 1e-14);
        assert_eq!(hom.flux[0][0], 0.0);
    }

    #[test]
    fn shape_mismatch_rejected() {
        let fine = Arc::new(CartesianMesh::uniform_1d(2, 2.0, 0).unwrap());
        let coarse = CoarseMesh::new(fine, 1).unwrap();
        let phi = GroupFluxField::new(1, 3);
        assert!(homogenize(&two_materials(), &coarse, &phi, false).is_err());
    }
}
