//! Multigroup cross sections.

use std::fmt;

use nalgebra::DMatrix;

use crate::error::{TransportResult, invalid};

/// Read-only access to multigroup cross sections.
///
/// `sigma_s(m, g, gp)` is scattering from group `gp` into group `g`.
pub trait MaterialProvider: Send + Sync + fmt::Debug {
    fn number_groups(&self) -> usize;
    fn number_materials(&self) -> usize;
    fn sigma_t(&self, m: usize, g: usize) -> f64;
    fn sigma_a(&self, m: usize, g: usize) -> f64;
    fn nu_sigma_f(&self, m: usize, g: usize) -> f64;
    fn sigma_f(&self, m: usize, g: usize) -> f64;
    fn chi(&self, m: usize, g: usize) -> f64;
    fn sigma_s(&self, m: usize, g: usize, gp: usize) -> f64;
    fn diff_coef(&self, m: usize, g: usize) -> f64;

    /// Neutrons per fission, zero for non-fissile entries.
    fn nu(&self, m: usize, g: usize) -> f64 {
        let sf = self.sigma_f(m, g);
        if sf > 0.0 { self.nu_sigma_f(m, g) / sf } else { 0.0 }
    }
}

/// Tabulated cross sections, materials by rows and groups by columns.
#[derive(Clone, Debug)]
pub struct Material {
    groups: usize,
    sigma_t: DMatrix<f64>,
    sigma_a: DMatrix<f64>,
    nu_sigma_f: DMatrix<f64>,
    sigma_f: DMatrix<f64>,
    chi: DMatrix<f64>,
    diff_coef: DMatrix<f64>,
    /// One `groups x groups` matrix per material, `(g, gp)` is `gp -> g`.
    sigma_s: Vec<DMatrix<f64>>,
    absorption_set: DMatrix<bool>,
    diffusion_set: DMatrix<bool>,
    finalized: bool,
}

impl Material {
    pub fn new(number_materials: usize, number_groups: usize) -> TransportResult<Self> {
        if number_materials == 0 || number_groups == 0 {
            return Err(invalid("material needs at least one material and one group"));
        }
        let zeros = DMatrix::zeros(number_materials, number_groups);
        let unset = DMatrix::from_element(number_materials, number_groups, false);
        Ok(Self {
            groups: number_groups,
            sigma_t: zeros.clone(),
            sigma_a: zeros.clone(),
            nu_sigma_f: zeros.clone(),
            sigma_f: zeros.clone(),
            chi: zeros.clone(),
            diff_coef: zeros,
            sigma_s: vec![DMatrix::zeros(number_groups, number_groups); number_materials],
            absorption_set: unset.clone(),
            diffusion_set: unset,
            finalized: false,
        })
    }

    fn check(&self, m: usize, g: usize, value: f64, what: &str) -> TransportResult<()> {
        if m >= self.sigma_t.nrows() || g >= self.groups {
            return Err(invalid(format!("{what}: entry ({m}, {g}) out of range")));
        }
        if !(value.is_finite() && value >= 0.0) {
            return Err(invalid(format!("{what}: value {value} must be finite and non-negative")));
        }
        Ok(())
    }

    pub fn set_sigma_t(&mut self, m: usize, g: usize, v: f64) -> TransportResult<&mut Self> {
        self.check(m, g, v, "sigma_t")?;
        self.sigma_t[(m, g)] = v;
        self.finalized = false;
        Ok(self)
    }

    pub fn set_sigma_a(&mut self, m: usize, g: usize, v: f64) -> TransportResult<&mut Self> {
        self.check(m, g, v, "sigma_a")?;
        self.sigma_a[(m, g)] = v;
        self.absorption_set[(m, g)] = true;
        Ok(self)
    }

    /// Sets both `sigma_f` and `nu * sigma_f`.
    pub fn set_fission(
        &mut self,
        m: usize,
        g: usize,
        sigma_f: f64,
        nu: f64,
    ) -> TransportResult<&mut Self> {
        self.check(m, g, sigma_f, "sigma_f")?;
        self.check(m, g, nu, "nu")?;
        self.sigma_f[(m, g)] = sigma_f;
        self.nu_sigma_f[(m, g)] = nu * sigma_f;
        self.finalized = false;
        Ok(self)
    }

    pub fn set_sigma_f(&mut self, m: usize, g: usize, v: f64) -> TransportResult<&mut Self> {
        self.check(m, g, v, "sigma_f")?;
        self.sigma_f[(m, g)] = v;
        self.finalized = false;
        Ok(self)
    }

    pub fn set_nu_sigma_f(&mut self, m: usize, g: usize, v: f64) -> TransportResult<&mut Self> {
        self.check(m, g, v, "nu_sigma_f")?;
        self.nu_sigma_f[(m, g)] = v;
        self.finalized = false;
        Ok(self)
    }

    pub fn set_chi(&mut self, m: usize, g: usize, v: f64) -> TransportResult<&mut Self> {
        self.check(m, g, v, "chi")?;
        self.chi[(m, g)] = v;
        self.finalized = false;
        Ok(self)
    }

    /// Scattering from `gp` into `g`.
    pub fn set_sigma_s(
        &mut self,
        m: usize,
        g: usize,
        gp: usize,
        v: f64,
    ) -> TransportResult<&mut Self> {
        self.check(m, g, v, "sigma_s")?;
        self.check(m, gp, v, "sigma_s")?;
        self.sigma_s[m][(g, gp)] = v;
        self.finalized = false;
        Ok(self)
    }

    pub fn set_diff_coef(&mut self, m: usize, g: usize, v: f64) -> TransportResult<&mut Self> {
        self.check(m, g, v, "diff_coef")?;
        self.diff_coef[(m, g)] = v;
        self.diffusion_set[(m, g)] = true;
        Ok(self)
    }

    /// Fill derived data and normalize the fission spectrum.
    ///
    /// Unset absorption becomes total minus out-scatter; an unset diffusion
    /// coefficient becomes `1 / (3 sigma_t)`. Each fissile material's `chi`
    /// is scaled to sum to one.
    pub fn finalize(&mut self) -> TransportResult<()> {
        for m in 0..self.number_materials() {
            for g in 0..self.groups {
                if !self.absorption_set[(m, g)] {
                    let out: f64 = (0..self.groups).map(|gp| self.sigma_s[m][(gp, g)]).sum();
                    self.sigma_a[(m, g)] = (self.sigma_t[(m, g)] - out).max(0.0);
                }
                if !self.diffusion_set[(m, g)] {
                    let st = self.sigma_t[(m, g)];
                    if st <= 0.0 {
                        return Err(invalid(format!(
                            "material {m} group {g}: no diffusion coefficient and zero sigma_t"
                        )));
                    }
                    self.diff_coef[(m, g)] = 1.0 / (3.0 * st);
                }
            }
            let chi_sum: f64 = self.chi.row(m).sum();
            if chi_sum > 0.0 {
                self.chi.row_mut(m).iter_mut().for_each(|c| *c /= chi_sum);
            } else if self.nu_sigma_f.row(m).sum() > 0.0 {
                return Err(invalid(format!("fissile material {m} has no fission spectrum")));
            }
        }
        self.finalized = true;
        Ok(())
    }

    /// Accept the data as given, without deriving or normalizing anything.
    pub(crate) fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl MaterialProvider for Material {
    fn number_groups(&self) -> usize {
        self.groups
    }

    fn number_materials(&self) -> usize {
        self.sigma_t.nrows()
    }

    fn sigma_t(&self, m: usize, g: usize) -> f64 {
        self.sigma_t[(m, g)]
    }

    fn sigma_a(&self, m: usize, g: usize) -> f64 {
        self.sigma_a[(m, g)]
    }

    fn nu_sigma_f(&self, m: usize, g: usize) -> f64 {
        self.nu_sigma_f[(m, g)]
    }

    fn sigma_f(&self, m: usize, g: usize) -> f64 {
        self.sigma_f[(m, g)]
    }

    fn chi(&self, m: usize, g: usize) -> f64 {
        self.chi[(m, g)]
    }

    fn sigma_s(&self, m: usize, g: usize, gp: usize) -> f64 {
        self.sigma_s[m][(g, gp)]
    }

    fn diff_coef(&self, m: usize, g: usize) -> f64 {
        self.diff_coef[(m, g)]
    }
}
