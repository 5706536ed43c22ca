//! Orthogonal Cartesian meshes and boundary conditions.
//!
//! Cells are ordered `i + nx * (j + ny * k)`. Unused axes of 1-D and 2-D
//! meshes carry a single cell of unit width, so volumes and face areas are
//! always products of three widths.

use crate::error::{TransportResult, invalid};

/// Axis count of a Cartesian mesh.
pub const AXES: usize = 3;

/// Cell widths along one axis, split into regions of equal-width fine cells.
#[derive(Clone, Debug)]
pub struct AxisRegions {
    /// Region edges, strictly increasing (`regions + 1` entries).
    pub edges: Vec<f64>,
    /// Fine cells per region.
    pub counts: Vec<usize>,
}

impl AxisRegions {
    pub fn new(edges: Vec<f64>, counts: Vec<usize>) -> Self {
        Self { edges, counts }
    }

    /// Fine widths and the region each fine cell belongs to.
    fn subdivide(&self) -> TransportResult<(Vec<f64>, Vec<usize>)> {
        if self.edges.len() != self.counts.len() + 1 || self.counts.is_empty() {
            return Err(invalid(format!(
                "{} region edges given for {} regions",
                self.edges.len(),
                self.counts.len()
            )));
        }
        let mut widths = Vec::new();
        let mut regions = Vec::new();
        for (r, &count) in self.counts.iter().enumerate() {
            let span = self.edges[r + 1] - self.edges[r];
            if count == 0 || !(span > 0.0) {
                return Err(invalid(format!(
                    "region {r} needs a positive width and cell count"
                )));
            }
            let w = span / count as f64;
            widths.extend(std::iter::repeat_n(w, count));
            regions.extend(std::iter::repeat_n(r, count));
        }
        Ok((widths, regions))
    }
}

/// Orthogonal 1-D, 2-D or 3-D mesh with a material index per cell.
#[derive(Clone, Debug)]
pub struct CartesianMesh {
    dimension: usize,
    widths: [Vec<f64>; AXES],
    material_map: Vec<usize>,
}

impl CartesianMesh {
    fn build(
        dimension: usize,
        widths: [Vec<f64>; AXES],
        material_map: Vec<usize>,
    ) -> TransportResult<Self> {
        for (axis, w) in widths.iter().enumerate() {
            if w.is_empty() {
                return Err(invalid(format!("axis {axis} has no cells")));
            }
            if let Some(bad) = w.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
                return Err(invalid(format!("axis {axis} has a non-positive width {bad}")));
            }
        }
        let cells: usize = widths.iter().map(Vec::len).product();
        if material_map.len() != cells {
            return Err(invalid(format!(
                "material map has {} entries for {cells} cells",
                material_map.len()
            )));
        }
        Ok(Self {
            dimension,
            widths,
            material_map,
        })
    }

    pub fn new_1d(dx: Vec<f64>, material_map: Vec<usize>) -> TransportResult<Self> {
        Self::build(1, [dx, vec![1.0], vec![1.0]], material_map)
    }

    pub fn new_2d(dx: Vec<f64>, dy: Vec<f64>, material_map: Vec<usize>) -> TransportResult<Self> {
        Self::build(2, [dx, dy, vec![1.0]], material_map)
    }

    pub fn new_3d(
        dx: Vec<f64>,
        dy: Vec<f64>,
        dz: Vec<f64>,
        material_map: Vec<usize>,
    ) -> TransportResult<Self> {
        Self::build(3, [dx, dy, dz], material_map)
    }

    /// `n` equal cells of width `width / n`, all of one material.
    pub fn uniform_1d(n: usize, width: f64, material: usize) -> TransportResult<Self> {
        if n == 0 {
            return Err(invalid("uniform mesh needs at least one cell"));
        }
        Self::new_1d(vec![width / n as f64; n], vec![material; n])
    }

    /// Mesh built from coarse regions, each subdivided into equal fine cells.
    ///
    /// `region_materials` is indexed like cells, over regions instead.
    pub fn from_regions(axes: &[AxisRegions], region_materials: &[usize]) -> TransportResult<Self> {
        if axes.is_empty() || axes.len() > AXES {
            return Err(invalid(format!("{} axes given, expected 1 to 3", axes.len())));
        }
        let mut widths: [Vec<f64>; AXES] = [vec![1.0], vec![1.0], vec![1.0]];
        let mut regions: [Vec<usize>; AXES] = [vec![0], vec![0], vec![0]];
        let mut region_counts = [1usize; AXES];
        for (d, axis) in axes.iter().enumerate() {
            let (w, r) = axis.subdivide()?;
            widths[d] = w;
            regions[d] = r;
            region_counts[d] = axis.counts.len();
        }
        let total_regions: usize = region_counts.iter().product();
        if region_materials.len() != total_regions {
            return Err(invalid(format!(
                "{} region materials given for {total_regions} regions",
                region_materials.len()
            )));
        }

        let mut material_map = Vec::new();
        for k in 0..widths[2].len() {
            for j in 0..widths[1].len() {
                for i in 0..widths[0].len() {
                    let r = regions[0][i]
                        + region_counts[0] * (regions[1][j] + region_counts[1] * regions[2][k]);
                    material_map.push(region_materials[r]);
                }
            }
        }
        Self::build(axes.len(), widths, material_map)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn number_cells(&self) -> usize {
        self.material_map.len()
    }

    pub fn number_cells_axis(&self, axis: usize) -> usize {
        self.widths[axis].len()
    }

    pub fn widths(&self, axis: usize) -> &[f64] {
        &self.widths[axis]
    }

    pub fn width(&self, axis: usize, i: usize) -> f64 {
        self.widths[axis][i]
    }

    pub fn cell_index(&self, coords: [usize; AXES]) -> usize {
        coords[0] + self.widths[0].len() * (coords[1] + self.widths[1].len() * coords[2])
    }

    pub fn cell_coords(&self, cell: usize) -> [usize; AXES] {
        let nx = self.widths[0].len();
        let ny = self.widths[1].len();
        [cell % nx, (cell / nx) % ny, cell / (nx * ny)]
    }

    pub fn volume(&self, cell: usize) -> f64 {
        let c = self.cell_coords(cell);
        (0..AXES).map(|d| self.widths[d][c[d]]).product()
    }

    /// Area of the cell faces normal to `axis`.
    pub fn face_area(&self, axis: usize, cell: usize) -> f64 {
        let c = self.cell_coords(cell);
        (0..AXES)
            .filter(|&d| d != axis)
            .map(|d| self.widths[d][c[d]])
            .product()
    }

    pub fn material_index(&self, cell: usize) -> usize {
        self.material_map[cell]
    }

    pub fn material_map(&self) -> &[usize] {
        &self.material_map
    }

    /// Neighbor across the low (`high == false`) or high face along `axis`.
    pub fn neighbor(&self, cell: usize, axis: usize, high: bool) -> Option<usize> {
        let mut c = self.cell_coords(cell);
        if high {
            if c[axis] + 1 >= self.widths[axis].len() {
                return None;
            }
            c[axis] += 1;
        } else {
            if c[axis] == 0 {
                return None;
            }
            c[axis] -= 1;
        }
        Some(self.cell_index(c))
    }
}

/// Domain side; `West`/`East` bound the x axis, and so on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    West,
    East,
    South,
    North,
    Bottom,
    Top,
}

impl Side {
    pub fn new(axis: usize, high: bool) -> Self {
        match (axis, high) {
            (0, false) => Side::West,
            (0, true) => Side::East,
            (1, false) => Side::South,
            (1, true) => Side::North,
            (_, false) => Side::Bottom,
            (_, true) => Side::Top,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoundaryCondition {
    /// Zero incoming partial current (Marshak).
    #[default]
    Vacuum,
    /// Zero net current.
    Reflective,
}

/// Boundary condition on each of the six domain sides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Boundaries {
    sides: [BoundaryCondition; 6],
}

impl Boundaries {
    pub fn uniform(bc: BoundaryCondition) -> Self {
        Self { sides: [bc; 6] }
    }

    pub fn with_side(mut self, side: Side, bc: BoundaryCondition) -> Self {
        self.sides[side.index()] = bc;
        self
    }

    pub fn get(&self, side: Side) -> BoundaryCondition {
        self.sides[side.index()]
    }
}

/// Coupling coefficient between two cell centers, `2 Di Dn / (Di hn + Dn hi)`.
pub fn coupling(d_i: f64, h_i: f64, d_n: f64, h_n: f64) -> f64 {
    let den = d_i * h_n + d_n * h_i;
    if den > 0.0 { 2.0 * d_i * d_n / den } else { 0.0 }
}

/// Coupling coefficient between a cell center and its boundary face.
pub fn boundary_coupling(bc: BoundaryCondition, d: f64, h: f64) -> f64 {
    match bc {
        BoundaryCondition::Vacuum => 2.0 * d / (h + 4.0 * d),
        BoundaryCondition::Reflective => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_subdivide_into_fine_cells() {
        let x = AxisRegions::new(vec![0.0, 1.0, 3.0], vec![2, 4]);
        let y = AxisRegions::new(vec![0.0, 2.0], vec![2]);
        let mesh = CartesianMesh::from_regions(&[x, y], &[7, 9]).unwrap();
        assert_eq!(mesh.dimension(), 2);
        assert_eq!(mesh.number_cells(), 12);
        assert_eq!(mesh.widths(0), &[0.5, 0.5, 0.5, 0.5, 0.5, 0.5]);
        assert_eq!(mesh.material_index(mesh.cell_index([1, 1, 0])), 7);
        assert_eq!(mesh.material_index(mesh.cell_index([2, 0, 0])), 9);
        assert!((mesh.volume(0) - 0.5).abs() < 1e-15);
        assert!((mesh.face_area(0, 0) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn coordinates_round_trip_and_neighbors() {
        let mesh =
            CartesianMesh::new_3d(vec![1.0; 3], vec![1.0; 2], vec![1.0; 2], vec![0; 12]).unwrap();
        let c = mesh.cell_index([2, 1, 1]);
        assert_eq!(mesh.cell_coords(c), [2, 1, 1]);
        assert_eq!(mesh.neighbor(c, 0, true), None);
        assert_eq!(mesh.neighbor(c, 0, false), Some(mesh.cell_index([1, 1, 1])));
        assert_eq!(mesh.neighbor(c, 2, false), Some(mesh.cell_index([2, 1, 0])));
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(CartesianMesh::new_1d(vec![1.0, 0.0], vec![0, 0]).is_err());
        assert!(CartesianMesh::new_1d(vec![1.0], vec![0, 0]).is_err());
        assert!(CartesianMesh::uniform_1d(0, 1.0, 0).is_err());
    }

    #[test]
    fn coupling_of_identical_cells_is_d_over_h() {
        assert!((coupling(2.0, 0.5, 2.0, 0.5) - 4.0).abs() < 1e-14);
        assert_eq!(boundary_coupling(BoundaryCondition::Reflective, 1.0, 1.0), 0.0);
        assert!((boundary_coupling(BoundaryCondition::Vacuum, 1.0, 2.0) - 1.0 / 3.0).abs() < 1e-15);
    }
}
