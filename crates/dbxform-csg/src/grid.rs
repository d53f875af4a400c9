//! Uniform sampling lattice over a CSG bounding box.

#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use dbxform_core::Bounds;
use glam::DVec3;

/// Largest number of cells a sampling grid may have.
pub const MAX_SAMPLE_CELLS: usize = 1 << 24;

/// Half-open box of cell indices, `lo[a] <= i < hi[a]` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBox {
    pub lo: [usize; 3],
    pub hi: [usize; 3],
}

impl IndexBox {
    /// The box covering `dims` cells from the origin.
    pub fn whole(dims: [usize; 3]) -> Self {
        Self {
            lo: [0; 3],
            hi: dims,
        }
    }

    #[must_use]
    pub fn contains(&self, cell: [usize; 3]) -> bool {
        (0..3).all(|a| self.lo[a] <= cell[a] && cell[a] < self.hi[a])
    }

    /// Number of cells in the box.
    #[must_use]
    pub fn len(&self) -> usize {
        (0..3).map(|a| self.hi[a].saturating_sub(self.lo[a])).product()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates cells with X fastest.
    pub fn cells(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let b = *self;
        (b.lo[2]..b.hi[2]).flat_map(move |k| {
            (b.lo[1]..b.hi[1]).flat_map(move |j| (b.lo[0]..b.hi[0]).map(move |i| [i, j, k]))
        })
    }
}

/// A uniform grid of cells covering a bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleGrid {
    origin: DVec3,
    spacing: DVec3,
    dims: [usize; 3],
    cell_size: f64,
}

impl SampleGrid {
    /// Builds the grid whose nominal cell size is `tolerance` times the
    /// longest extent of `bounds`.
    ///
    /// Each axis gets enough cells to keep its spacing at or below the
    /// nominal size, and the spacing is then stretched to fit the bounds
    /// exactly. Returns `None` for invalid bounds, a non-positive tolerance
    /// or a grid over [`MAX_SAMPLE_CELLS`].
    pub fn from_tolerance(bounds: &Bounds, tolerance: f64) -> Option<Self> {
        if !bounds.is_valid() || !tolerance.is_finite() || tolerance <= 0.0 {
            return None;
        }
        let cell_size = tolerance * bounds.longest_extent();
        if cell_size <= 0.0 {
            return None;
        }
        let extents = bounds.extents();
        let mut dims = [1_usize; 3];
        for a in 0..3 {
            let n = (extents[a] / cell_size - 1e-9).ceil();
            if n > MAX_SAMPLE_CELLS as f64 {
                return None;
            }
            dims[a] = (n as usize).max(1);
        }
        if dims.iter().try_fold(1_usize, |acc, &d| acc.checked_mul(d))? > MAX_SAMPLE_CELLS {
            return None;
        }
        let spacing = DVec3::new(
            extents.x / dims[0] as f64,
            extents.y / dims[1] as f64,
            extents.z / dims[2] as f64,
        );
        Some(Self {
            origin: bounds.min,
            spacing,
            dims,
            cell_size,
        })
    }

    /// Cells per axis.
    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Nominal cell size derived from the tolerance.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    #[must_use]
    pub fn spacing(&self) -> DVec3 {
        self.spacing
    }

    #[must_use]
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.dims.iter().product()
    }

    /// Position of a lattice node, where one cell spans `scale` lattice steps.
    #[must_use]
    pub fn lattice_point(&self, lattice: [u64; 3], scale: u64) -> DVec3 {
        let s = scale as f64;
        self.origin
            + DVec3::new(
                lattice[0] as f64 / s,
                lattice[1] as f64 / s,
                lattice[2] as f64 / s,
            ) * self.spacing
    }

    /// Center of cell `(i, j, k)`.
    #[must_use]
    pub fn cell_center(&self, cell: [usize; 3]) -> DVec3 {
        self.origin
            + (DVec3::new(cell[0] as f64, cell[1] as f64, cell[2] as f64) + 0.5) * self.spacing
    }

    /// Linear index of a cell, X fastest.
    #[must_use]
    pub fn linear_index(&self, cell: [usize; 3]) -> usize {
        cell[0] + self.dims[0] * (cell[1] + self.dims[1] * cell[2])
    }
}
