//! Coarse mesh built by grouping fine cells.

use std::sync::Arc;

use crate::error::{TransportResult, invalid};
use crate::mesh::{AXES, CartesianMesh};

/// Fine cell to coarse cell map and the aggregated coarse volumes.
#[derive(Clone, Debug)]
pub struct CoarseMeshMapping {
    cell_map: Vec<usize>,
    coarse_volumes: Vec<f64>,
}

impl CoarseMeshMapping {
    pub fn coarse_cell(&self, fine_cell: usize) -> usize {
        self.cell_map[fine_cell]
    }

    pub fn cell_map(&self) -> &[usize] {
        &self.cell_map
    }

    pub fn coarse_volume(&self, coarse_cell: usize) -> f64 {
        self.coarse_volumes[coarse_cell]
    }

    pub fn number_coarse_cells(&self) -> usize {
        self.coarse_volumes.len()
    }
}

/// Every `level` fine cells per axis form one coarse cell; the last coarse
/// cell along an axis takes the remainder.
#[derive(Clone, Debug)]
pub struct CoarseMesh {
    level: usize,
    fine: Arc<CartesianMesh>,
    coarse: CartesianMesh,
    mapping: CoarseMeshMapping,
    /// Per axis: fine cell index to coarse cell index.
    fine_to_coarse: [Vec<usize>; AXES],
    /// Per axis: fine edge index to coarse edge index, if the edges coincide.
    coarse_edges: [Vec<Option<usize>>; AXES],
}

impl CoarseMesh {
    pub fn new(fine: Arc<CartesianMesh>, level: usize) -> TransportResult<Self> {
        if level == 0 {
            return Err(invalid("coarse mesh level must be positive"));
        }

        let mut widths: [Vec<f64>; AXES] = Default::default();
        let mut fine_to_coarse: [Vec<usize>; AXES] = Default::default();
        let mut coarse_edges: [Vec<Option<usize>>; AXES] = Default::default();
        for d in 0..AXES {
            let n = fine.number_cells_axis(d);
            let nc = n.div_ceil(level);
            let mut w = vec![0.0; nc];
            for (i, &h) in fine.widths(d).iter().enumerate() {
                w[i / level] += h;
            }
            widths[d] = w;
            fine_to_coarse[d] = (0..n).map(|i| i / level).collect();
            coarse_edges[d] = (0..=n)
                .map(|e| {
                    if e == n {
                        Some(nc)
                    } else if e % level == 0 {
                        Some(e / level)
                    } else {
                        None
                    }
                })
                .collect();
        }

        let number_coarse: usize = widths.iter().map(Vec::len).product();
        let [wx, wy, wz] = widths;
        let identity: Vec<usize> = (0..number_coarse).collect();
        let coarse = match fine.dimension() {
            1 => CartesianMesh::new_1d(wx, identity)?,
            2 => CartesianMesh::new_2d(wx, wy, identity)?,
            _ => CartesianMesh::new_3d(wx, wy, wz, identity)?,
        };

        let mut cell_map = Vec::with_capacity(fine.number_cells());
        let mut coarse_volumes = vec![0.0; number_coarse];
        for cell in 0..fine.number_cells() {
            let c = fine.cell_coords(cell);
            let cc = coarse.cell_index([
                fine_to_coarse[0][c[0]],
                fine_to_coarse[1][c[1]],
                fine_to_coarse[2][c[2]],
            ]);
            cell_map.push(cc);
            coarse_volumes[cc] += fine.volume(cell);
        }

        Ok(Self {
            level,
            fine,
            coarse,
            mapping: CoarseMeshMapping {
                cell_map,
                coarse_volumes,
            },
            fine_to_coarse,
            coarse_edges,
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn fine_mesh(&self) -> &CartesianMesh {
        &self.fine
    }

    pub fn coarse_mesh(&self) -> &CartesianMesh {
        &self.coarse
    }

    pub fn mapping(&self) -> &CoarseMeshMapping {
        &self.mapping
    }

    pub fn number_coarse_cells(&self) -> usize {
        self.mapping.number_coarse_cells()
    }

    /// Coarse index of fine index `i` along `axis`.
    pub fn coarse_index(&self, axis: usize, i: usize) -> usize {
        self.fine_to_coarse[axis][i]
    }

    /// Coarse edge lying on fine edge `e` along `axis`, if any.
    pub fn coarse_edge(&self, axis: usize, e: usize) -> Option<usize> {
        self.coarse_edges[axis].get(e).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_cell_is_smaller() {
        let fine = Arc::new(CartesianMesh::new_1d(vec![1.0; 5], vec![0; 5]).unwrap());
        let cm = CoarseMesh::new(fine, 2).unwrap();
        assert_eq!(cm.number_coarse_cells(), 3);
        assert_eq!(cm.coarse_mesh().widths(0), &[2.0, 2.0, 1.0]);
        assert_eq!(cm.mapping().cell_map(), &[0, 0, 1, 1, 2]);
        assert_eq!(cm.mapping().coarse_volume(2), 1.0);
        assert_eq!(cm.coarse_edge(0, 0), Some(0));
        assert_eq!(cm.coarse_edge(0, 1), None);
        assert_eq!(cm.coarse_edge(0, 4), Some(2));
        assert_eq!(cm.coarse_edge(0, 5), Some(3));
    }

    #[test]
    fn level_one_reproduces_fine_mesh() {
        let fine =
            Arc::new(CartesianMesh::new_2d(vec![0.5, 1.5], vec![1.0, 2.0], vec![0, 1, 2, 3]).unwrap());
        let cm = CoarseMesh::new(Arc::clone(&fine), 1).unwrap();
        assert_eq!(cm.number_coarse_cells(), 4);
        for c in 0..4 {
            assert_eq!(cm.mapping().coarse_cell(c), c);
            assert!((cm.mapping().coarse_volume(c) - fine.volume(c)).abs() < 1e-15);
        }
        assert_eq!(cm.coarse_mesh().dimension(), 2);
    }

    #[test]
    fn zero_level_rejected() {
        let fine = Arc::new(CartesianMesh::uniform_1d(4, 4.0, 0).unwrap());
        assert!(CoarseMesh::new(fine, 0).is_err());
    }
}
