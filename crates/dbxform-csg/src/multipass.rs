//! Domain-partitioned multi-pass sampling.
//!
//! The first pass classifies the cell centers of this rank's block (plus a
//! one-cell halo) against every boundary once, packing the results into a
//! fixed-width bitfield per cell. Later passes discretize individual zones
//! from those bits without evaluating a quadric again.

use std::sync::Arc;

use dbxform_core::{CsgMesh, DiscretizationRequest, ParallelContext, Result};

use crate::builder::{Discretized, MeshBuilder};
use crate::decompose::{rank_block, rectilinear_decomposition};
use crate::grid::{IndexBox, SampleGrid};
use crate::sampling::ZoneSelector;

const BITFIELD_WORDS: usize = 2;

/// Most boundaries a multi-pass bitfield can hold.
pub const MAX_MULTIPASS_BOUNDARIES: usize = 64 * BITFIELD_WORDS;

type Bitfield = [u64; BITFIELD_WORDS];

fn bit(bits: &Bitfield, b: usize) -> bool {
    (bits[b / 64] >> (b % 64)) & 1 == 1
}

/// Boundary classification of one rank's block of the sampling grid.
#[derive(Debug)]
pub struct CsgPartition {
    source: Arc<CsgMesh>,
    request: DiscretizationRequest,
    parallel: ParallelContext,
    grid: SampleGrid,
    owned: IndexBox,
    local: IndexBox,
    cell_bits: Vec<Bitfield>,
}

impl CsgPartition {
    /// Classifies this rank's block.
    ///
    /// Returns `None` when the mesh has more boundaries than the bitfield
    /// holds or the request yields no usable grid.
    pub fn build(
        source: Arc<CsgMesh>,
        request: &DiscretizationRequest,
        parallel: ParallelContext,
    ) -> Option<Self> {
        let boundaries = source.boundaries();
        if boundaries.len() > MAX_MULTIPASS_BOUNDARIES {
            log::debug!(
                "multi-pass partition: {} boundaries exceed the {MAX_MULTIPASS_BOUNDARIES}-bit field",
                boundaries.len()
            );
            return None;
        }
        let grid = SampleGrid::from_tolerance(&source.bounds(), request.tolerance)?;
        let parts = rectilinear_decomposition(grid.dims(), parallel.size);
        let (owned, local) = rank_block(grid.dims(), parts, parallel.rank);

        let cell_bits = local
            .cells()
            .map(|cell| {
                let center = grid.cell_center(cell);
                let mut bits = [0_u64; BITFIELD_WORDS];
                for (b, quadric) in boundaries.iter().enumerate() {
                    if quadric.contains(center) {
                        bits[b / 64] |= 1 << (b % 64);
                    }
                }
                bits
            })
            .collect();
        log::debug!(
            "multi-pass partition for rank {}/{}: {parts:?} blocks, local cells {:?}..{:?}",
            parallel.rank,
            parallel.size,
            local.lo,
            local.hi
        );

        Some(Self {
            source,
            request: *request,
            parallel,
            grid,
            owned,
            local,
            cell_bits,
        })
    }

    /// Returns true if this partition was built from an equal mesh with the
    /// same request on the same rank layout.
    #[must_use]
    pub fn is_valid_for(
        &self,
        source: &CsgMesh,
        request: &DiscretizationRequest,
        parallel: ParallelContext,
    ) -> bool {
        self.request.is_compatible(request)
            && self.parallel == parallel
            && *self.source == *source
    }

    /// Cells this rank owns.
    #[must_use]
    pub fn owned(&self) -> IndexBox {
        self.owned
    }

    /// Owned cells plus the halo.
    #[must_use]
    pub fn local(&self) -> IndexBox {
        self.local
    }

    /// Discretizes the selection over the local block.
    ///
    /// Halo cells are flagged as ghosts when running on more than one rank.
    pub fn discretize(&self, selector: ZoneSelector) -> Result<Discretized> {
        let mut builder = MeshBuilder::new(&self.grid, 1);
        if self.parallel.size > 1 {
            builder = builder.with_ghosts();
        }
        for (cell, bits) in self.local.cells().zip(&self.cell_bits) {
            if let Some(zone) = selector.classify(&self.source, &|b| bit(bits, b)) {
                let ghost = !self.owned.contains(cell);
                builder.add_hex(cell.map(|c| c as u64), 1, zone, ghost);
            }
        }
        builder.finish(false)
    }
}
