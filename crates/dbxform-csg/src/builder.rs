//! Incremental construction of a discretized mesh on a sampling lattice.

use std::collections::HashMap;
use std::sync::Arc;

use dbxform_core::{
    ArrayData, CellArray, CellKind, Dataset, MeshStructure, Result, TypedArray, GHOST_ZONES_ARRAY,
};

use crate::grid::SampleGrid;

/// A discretized CSG domain: the mesh plus the source zone of each cell.
#[derive(Debug)]
pub struct Discretized {
    pub mesh: Dataset,
    pub zone_map: Vec<usize>,
}

impl Discretized {
    /// Whether the mesh carries a ghost-zone flag array.
    #[must_use]
    pub fn has_ghost_zones(&self) -> bool {
        self.mesh.cell_data().get(GHOST_ZONES_ARRAY).is_some()
    }
}

/// Hexahedron corner offsets, in standard hexahedron winding.
const HEX_CORNERS: [[u64; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Accumulates cells whose corners sit on lattice nodes of a [`SampleGrid`].
///
/// One grid cell spans `scale` lattice steps, so adaptive refinement can
/// place nodes between the grid's own nodes. Nodes shared by several cells
/// are stored once.
pub struct MeshBuilder<'g> {
    grid: &'g SampleGrid,
    scale: u64,
    lookup: HashMap<[u64; 3], usize>,
    coords: Vec<f64>,
    cells: CellArray,
    zone_map: Vec<usize>,
    ghosts: Option<Vec<u8>>,
}

impl<'g> MeshBuilder<'g> {
    pub fn new(grid: &'g SampleGrid, scale: u64) -> Self {
        Self {
            grid,
            scale: scale.max(1),
            lookup: HashMap::new(),
            coords: Vec::new(),
            cells: CellArray::new(),
            zone_map: Vec::new(),
            ghosts: None,
        }
    }

    /// Records a ghost flag for every cell.
    #[must_use]
    pub fn with_ghosts(mut self) -> Self {
        self.ghosts = Some(Vec::new());
        self
    }

    fn node(&mut self, lattice: [u64; 3]) -> usize {
        if let Some(&i) = self.lookup.get(&lattice) {
            return i;
        }
        let p = self.grid.lattice_point(lattice, self.scale);
        let i = self.coords.len() / 3;
        self.coords.extend_from_slice(&[p.x, p.y, p.z]);
        self.lookup.insert(lattice, i);
        i
    }

    fn record(&mut self, zone: usize, ghost: bool) {
        self.zone_map.push(zone);
        if let Some(ghosts) = &mut self.ghosts {
            ghosts.push(u8::from(ghost));
        }
    }

    /// Adds an axis-aligned hexahedron with lower corner `lo` and edge `size`,
    /// both in lattice steps.
    pub fn add_hex(&mut self, lo: [u64; 3], size: u64, zone: usize, ghost: bool) {
        let mut ids = [0_usize; 8];
        for (id, corner) in ids.iter_mut().zip(HEX_CORNERS) {
            *id = self.node([
                lo[0] + corner[0] * size,
                lo[1] + corner[1] * size,
                lo[2] + corner[2] * size,
            ]);
        }
        self.cells.push(CellKind::Hexahedron, &ids);
        self.record(zone, ghost);
    }

    /// Adds a quadrilateral through four lattice nodes, in order.
    pub fn add_quad(&mut self, corners: [[u64; 3]; 4], zone: usize, ghost: bool) {
        let ids = corners.map(|c| self.node(c));
        self.cells.push(CellKind::Quad, &ids);
        self.record(zone, ghost);
    }

    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Builds the mesh: polydata for surfaces, an unstructured grid otherwise.
    pub fn finish(self, surface: bool) -> Result<Discretized> {
        let points = Arc::new(TypedArray::new(
            Some("points".to_string()),
            3,
            ArrayData::Float64(self.coords),
        )?);
        let structure = if surface {
            MeshStructure::PolyData {
                points,
                cells: self.cells,
            }
        } else {
            MeshStructure::Unstructured {
                points,
                cells: self.cells,
            }
        };
        let mut mesh = Dataset::new(structure);
        if let Some(ghosts) = self.ghosts {
            let flags = TypedArray::new(
                Some(GHOST_ZONES_ARRAY.to_string()),
                1,
                ArrayData::UInt8(ghosts),
            )?;
            mesh.cell_data_mut().add(Arc::new(flags));
        }
        Ok(Discretized {
            mesh,
            zone_map: self.zone_map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbxform_core::{Bounds, DVec3};

    fn grid() -> SampleGrid {
        SampleGrid::from_tolerance(&Bounds::new(DVec3::ZERO, DVec3::splat(2.0)), 0.5).unwrap()
    }

    #[test]
    fn test_shared_nodes_are_merged() {
        let grid = grid();
        let mut builder = MeshBuilder::new(&grid, 1);
        builder.add_hex([0, 0, 0], 1, 0, false);
        builder.add_hex([1, 0, 0], 1, 0, false);
        let out = builder.finish(false).unwrap();
        assert_eq!(out.mesh.num_cells(), 2);
        assert_eq!(out.mesh.num_points(), 12);
        assert_eq!(out.zone_map, vec![0, 0]);
        assert!(!out.has_ghost_zones());
        assert!(out.mesh.validate().is_ok());
    }

    #[test]
    fn test_hex_corner_positions() {
        let grid = grid();
        let mut builder = MeshBuilder::new(&grid, 2);
        builder.add_hex([2, 0, 0], 1, 3, false);
        let out = builder.finish(false).unwrap();
        let points = out.mesh.structure().points().unwrap();
        // Half-cell hex starting one grid cell in along x.
        assert_eq!(points.tuple(0), Some(vec![1.0, 0.0, 0.0]));
        assert_eq!(points.tuple(6), Some(vec![1.5, 0.5, 0.5]));
        assert_eq!(out.zone_map, vec![3]);
    }

    #[test]
    fn test_ghost_flags_and_surface() {
        let grid = grid();
        let mut builder = MeshBuilder::new(&grid, 1).with_ghosts();
        builder.add_quad([[0, 0, 0], [1, 0, 0], [1, 1, 0], [0, 1, 0]], 1, false);
        builder.add_quad([[0, 0, 1], [1, 0, 1], [1, 1, 1], [0, 1, 1]], 1, true);
        let out = builder.finish(true).unwrap();
        assert!(matches!(out.mesh.structure(), MeshStructure::PolyData { .. }));
        let flags = out.mesh.cell_data().get(GHOST_ZONES_ARRAY).unwrap();
        assert_eq!(flags.data(), &ArrayData::UInt8(vec![0, 1]));
        assert!(out.mesh.validate().is_ok());
    }
}
