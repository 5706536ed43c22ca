//! Net currents across coarse mesh faces.
//!
//! Fine face currents are area-integrated into the coarse face they lie on.
//! Currents are signed along the positive axis direction.

use std::sync::Arc;

use crate::coarse::CoarseMesh;
use crate::error::{TransportResult, invalid};
use crate::mesh::AXES;

/// Per coarse face, per group, area-integrated net current.
#[derive(Clone, Debug)]
pub struct CurrentTally {
    coarse: Arc<CoarseMesh>,
    groups: usize,
    /// Faces normal to each axis, group-major.
    data: [Vec<f64>; AXES],
}

impl CurrentTally {
    pub fn new(coarse: Arc<CoarseMesh>, groups: usize) -> Self {
        let data = std::array::from_fn(|axis| vec![0.0; groups * face_count(&coarse, axis)]);
        Self {
            coarse,
            groups,
            data,
        }
    }

    pub fn coarse_mesh(&self) -> &CoarseMesh {
        &self.coarse
    }

    pub fn number_groups(&self) -> usize {
        self.groups
    }

    /// Whether fine edge `e` along `axis` lies on a coarse face.
    pub fn is_tallied_edge(&self, axis: usize, e: usize) -> bool {
        self.coarse.coarse_edge(axis, e).is_some()
    }

    /// Add the current density crossing a fine face.
    ///
    /// `fine` holds fine cell indices on the transverse axes and the fine
    /// edge index along `axis`. Faces interior to a coarse cell are ignored.
    pub fn tally(&mut self, axis: usize, fine: [usize; AXES], group: usize, current: f64) {
        let Some(edge) = self.coarse.coarse_edge(axis, fine[axis]) else {
            return;
        };
        let fine_mesh = self.coarse.fine_mesh();
        let mut coarse = [0; AXES];
        let mut area = 1.0;
        for d in 0..AXES {
            if d == axis {
                coarse[d] = edge;
            } else {
                coarse[d] = self.coarse.coarse_index(d, fine[d]);
                area *= fine_mesh.width(d, fine[d]);
            }
        }
        let index = self.index(axis, coarse, group);
        self.data[axis][index] += current * area;
    }

    /// Average current density on a coarse face (`coarse[axis]` is the edge).
    pub fn current(&self, axis: usize, coarse: [usize; AXES], group: usize) -> f64 {
        let mesh = self.coarse.coarse_mesh();
        let area: f64 = (0..AXES)
            .filter(|&d| d != axis)
            .map(|d| mesh.width(d, coarse[d]))
            .product();
        self.data[axis][self.index(axis, coarse, group)] / area
    }

    pub fn reset(&mut self) {
        self.data.iter_mut().for_each(|d| d.fill(0.0));
    }

    pub fn reset_group(&mut self, group: usize) {
        for axis in 0..AXES {
            let n = face_count(&self.coarse, axis);
            self.data[axis][group * n..(group + 1) * n].fill(0.0);
        }
    }

    /// Add another partial tally over the same coarse mesh.
    pub fn merge(&mut self, other: &CurrentTally) -> TransportResult<()> {
        if other.groups != self.groups
            || self.data.iter().zip(&other.data).any(|(a, b)| a.len() != b.len())
        {
            return Err(invalid("cannot merge tallies over different meshes"));
        }
        for (mine, theirs) in self.data.iter_mut().zip(&other.data) {
            mine.iter_mut().zip(theirs).for_each(|(a, b)| *a += b);
        }
        Ok(())
    }

    fn index(&self, axis: usize, coarse: [usize; AXES], group: usize) -> usize {
        let mesh = self.coarse.coarse_mesh();
        let mut n = [0; AXES];
        for (d, nd) in n.iter_mut().enumerate() {
            *nd = mesh.number_cells_axis(d) + usize::from(d == axis);
        }
        let local = coarse[0] + n[0] * (coarse[1] + n[1] * coarse[2]);
        group * face_count(&self.coarse, axis) + local
    }
}

fn face_count(coarse: &CoarseMesh, axis: usize) -> usize {
    let mesh = coarse.coarse_mesh();
    (0..AXES)
        .map(|d| mesh.number_cells_axis(d) + usize::from(d == axis))
        .product()
}
