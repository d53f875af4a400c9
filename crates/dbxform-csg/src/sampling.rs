//! Zone selection and the uniform-grid strategies.

#![allow(clippy::cast_possible_truncation)]

use dbxform_core::{CsgMesh, Result};
use glam::DVec3;

use crate::builder::{Discretized, MeshBuilder};
use crate::grid::{IndexBox, SampleGrid};

/// Which zones of a CSG mesh a discretization covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneSelector {
    /// A single zone.
    One(usize),
    /// Every zone; a point belongs to the first zone whose region holds it.
    All,
}

impl ZoneSelector {
    /// Returns true if the selector names zones that exist in `csg`.
    #[must_use]
    pub fn is_valid_for(self, csg: &CsgMesh) -> bool {
        match self {
            Self::One(zone) => zone < csg.num_zones(),
            Self::All => csg.num_zones() > 0,
        }
    }

    /// Zone that owns a sample, given the per-boundary inside test at it.
    pub fn classify(self, csg: &CsgMesh, inside: &impl Fn(usize) -> bool) -> Option<usize> {
        match self {
            Self::One(zone) => csg
                .zone_region(zone)
                .is_some_and(|r| csg.classify(r, inside))
                .then_some(zone),
            Self::All => (0..csg.num_zones())
                .find(|&z| csg.zone_region(z).is_some_and(|r| csg.classify(r, inside))),
        }
    }

    /// Zone that owns point `p`.
    #[must_use]
    pub fn locate(self, csg: &CsgMesh, p: DVec3) -> Option<usize> {
        self.classify(csg, &|b| csg.boundaries()[b].contains(p))
    }

    /// Signed implicit value of the selected region at `p`, negative inside.
    #[must_use]
    pub fn implicit_value(self, csg: &CsgMesh, p: DVec3) -> f64 {
        let value = |z: usize| {
            csg.zone_region(z)
                .map_or(f64::INFINITY, |r| csg.implicit_value(r, p))
        };
        match self {
            Self::One(zone) => value(zone),
            Self::All => (0..csg.num_zones()).map(value).fold(f64::INFINITY, f64::min),
        }
    }
}

fn lattice(cell: [usize; 3]) -> [u64; 3] {
    cell.map(|c| c as u64)
}

/// Fills every grid cell whose center lies in the selection with a hexahedron.
pub fn uniform(csg: &CsgMesh, selector: ZoneSelector, tolerance: f64) -> Result<Option<Discretized>> {
    let Some(grid) = SampleGrid::from_tolerance(&csg.bounds(), tolerance) else {
        return Ok(None);
    };
    let mut builder = MeshBuilder::new(&grid, 1);
    for cell in IndexBox::whole(grid.dims()).cells() {
        if let Some(zone) = selector.locate(csg, grid.cell_center(cell)) {
            builder.add_hex(lattice(cell), 1, zone, false);
        }
    }
    log::debug!(
        "uniform discretization: {:?} grid, {} cells",
        grid.dims(),
        builder.num_cells()
    );
    builder.finish(false).map(Some)
}

/// Face quads of a unit cell, outward winding, with the neighbor each faces.
const FACES: [([[u64; 3]; 4], [i64; 3]); 6] = [
    ([[0, 0, 0], [0, 0, 1], [0, 1, 1], [0, 1, 0]], [-1, 0, 0]),
    ([[1, 0, 0], [1, 1, 0], [1, 1, 1], [1, 0, 1]], [1, 0, 0]),
    ([[0, 0, 0], [1, 0, 0], [1, 0, 1], [0, 0, 1]], [0, -1, 0]),
    ([[0, 1, 0], [0, 1, 1], [1, 1, 1], [1, 1, 0]], [0, 1, 0]),
    ([[0, 0, 0], [0, 1, 0], [1, 1, 0], [1, 0, 0]], [0, 0, -1]),
    ([[0, 0, 1], [1, 0, 1], [1, 1, 1], [0, 1, 1]], [0, 0, 1]),
];

fn neighbor(cell: [usize; 3], step: [i64; 3], dims: [usize; 3]) -> Option<[usize; 3]> {
    let mut out = [0_usize; 3];
    for a in 0..3 {
        let n = cell[a].checked_add_signed(step[a] as isize)?;
        if n >= dims[a] {
            return None;
        }
        out[a] = n;
    }
    Some(out)
}

/// Extracts the boundary surface of the selection as quads.
///
/// A face is emitted wherever a selected cell meets a cell of another zone,
/// an unselected cell, or the edge of the grid. Interiors are not filled.
pub fn boundary_surface(
    csg: &CsgMesh,
    selector: ZoneSelector,
    tolerance: f64,
) -> Result<Option<Discretized>> {
    let Some(grid) = SampleGrid::from_tolerance(&csg.bounds(), tolerance) else {
        return Ok(None);
    };
    let dims = grid.dims();
    let owners: Vec<Option<usize>> = IndexBox::whole(dims)
        .cells()
        .map(|cell| selector.locate(csg, grid.cell_center(cell)))
        .collect();

    let mut builder = MeshBuilder::new(&grid, 1);
    for cell in IndexBox::whole(dims).cells() {
        let Some(zone) = owners[grid.linear_index(cell)] else {
            continue;
        };
        let lo = lattice(cell);
        for (quad, step) in FACES {
            let across = neighbor(cell, step, dims).and_then(|n| owners[grid.linear_index(n)]);
            if across != Some(zone) {
                let corners = quad.map(|c| [lo[0] + c[0], lo[1] + c[1], lo[2] + c[2]]);
                builder.add_quad(corners, zone, false);
            }
        }
    }
    builder.finish(true).map(Some)
}
