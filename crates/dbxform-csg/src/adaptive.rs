//! Flatness-driven adaptive sampling.
//!
//! The region's bounding box is covered by a coarse grid, and each coarse
//! cell is refined as an octree down to the nominal tolerance. A cell is
//! split only while its corners and center disagree on which zone owns
//! them and the implicit surface through it is not yet flat.

#![allow(clippy::cast_precision_loss)]

use dbxform_core::{CsgMesh, DiscretizationRequest, ParallelContext, Result};
use glam::DVec3;

use crate::builder::{Discretized, MeshBuilder};
use crate::grid::{IndexBox, SampleGrid};
use crate::sampling::ZoneSelector;

/// Octree depth below each coarse cell.
pub const ADAPTIVE_LEVELS: u32 = 3;

const CORNERS: [[u64; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

struct Refiner<'a> {
    csg: &'a CsgMesh,
    selector: ZoneSelector,
    grid: &'a SampleGrid,
    scale: u64,
    flat_tolerance: f64,
}

impl Refiner<'_> {
    fn corner(&self, lo: [u64; 3], size: u64, offset: [u64; 3]) -> DVec3 {
        self.grid.lattice_point(
            [
                lo[0] + offset[0] * size,
                lo[1] + offset[1] * size,
                lo[2] + offset[2] * size,
            ],
            self.scale,
        )
    }

    fn is_flat(&self, corners: &[DVec3; 8], center: DVec3) -> bool {
        let values = corners.map(|p| self.selector.implicit_value(self.csg, p));
        let at_center = self.selector.implicit_value(self.csg, center);
        let mean = values.iter().sum::<f64>() / 8.0;
        let magnitude = values
            .iter()
            .fold(at_center.abs(), |m, v| m.max(v.abs()));
        if !magnitude.is_finite() || magnitude == 0.0 {
            return true;
        }
        (at_center - mean).abs() <= self.flat_tolerance * magnitude
    }

    fn refine(&self, builder: &mut MeshBuilder<'_>, lo: [u64; 3], size: u64) {
        let corners = CORNERS.map(|c| self.corner(lo, size, c));
        let center = (corners[0] + corners[6]) * 0.5;
        let owner = self.selector.locate(self.csg, center);

        let mixed = corners
            .iter()
            .any(|&p| self.selector.locate(self.csg, p) != owner);
        if size > 1 && mixed && !self.is_flat(&corners, center) {
            let half = size / 2;
            for c in CORNERS {
                let child = [lo[0] + c[0] * half, lo[1] + c[1] * half, lo[2] + c[2] * half];
                self.refine(builder, child, half);
            }
        } else if let Some(zone) = owner {
            builder.add_hex(lo, size, zone, false);
        }
    }
}

/// Samples the selection adaptively.
///
/// Coarse cells are dealt out round-robin by linear index, and this rank
/// only refines the cells it is dealt. A lone process refines them all.
pub fn adaptive(
    csg: &CsgMesh,
    selector: ZoneSelector,
    request: &DiscretizationRequest,
    parallel: ParallelContext,
) -> Result<Option<Discretized>> {
    let scale = 1_u64 << ADAPTIVE_LEVELS;
    let coarse = request.tolerance * scale as f64;
    let Some(grid) = SampleGrid::from_tolerance(&csg.bounds(), coarse) else {
        return Ok(None);
    };
    let refiner = Refiner {
        csg,
        selector,
        grid: &grid,
        scale,
        flat_tolerance: request.flat_tolerance,
    };
    let mut builder = MeshBuilder::new(&grid, scale);
    let size = parallel.size.max(1);
    for (index, cell) in IndexBox::whole(grid.dims()).cells().enumerate() {
        if index % size != parallel.rank {
            continue;
        }
        let lo = cell.map(|c| c as u64 * scale);
        refiner.refine(&mut builder, lo, scale);
    }
    log::debug!(
        "adaptive discretization on rank {}/{}: {:?} coarse grid, {} cells",
        parallel.rank,
        size,
        grid.dims(),
        builder.num_cells()
    );
    builder.finish(false).map(Some)
}
