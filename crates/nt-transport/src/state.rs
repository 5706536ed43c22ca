//! Multigroup scalar flux.

use nt_linalg::Vector;

use crate::error::{TransportResult, invalid};

/// Scalar flux per fine cell, one vector per energy group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupFluxField {
    phi: Vec<Vector>,
}

impl GroupFluxField {
    pub fn new(number_groups: usize, number_cells: usize) -> Self {
        Self::uniform(number_groups, number_cells, 0.0)
    }

    pub fn uniform(number_groups: usize, number_cells: usize, value: f64) -> Self {
        Self {
            phi: vec![Vector::from_element(number_cells, value); number_groups],
        }
    }

    /// All groups must have the same length.
    pub fn from_groups(phi: Vec<Vector>) -> TransportResult<Self> {
        if let Some(first) = phi.first() {
            if phi.iter().any(|p| p.len() != first.len()) {
                return Err(invalid("group fluxes differ in length"));
            }
        }
        Ok(Self { phi })
    }

    pub fn number_groups(&self) -> usize {
        self.phi.len()
    }

    pub fn number_cells(&self) -> usize {
        self.phi.first().map_or(0, Vector::len)
    }

    pub fn phi(&self, g: usize) -> &Vector {
        &self.phi[g]
    }

    pub fn phi_mut(&mut self, g: usize) -> &mut Vector {
        &mut self.phi[g]
    }

    pub fn groups(&self) -> &[Vector] {
        &self.phi
    }

    pub fn is_finite(&self) -> bool {
        self.phi.iter().all(|p| p.iter().all(|v| v.is_finite()))
    }
}
