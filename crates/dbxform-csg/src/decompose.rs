//! Rectilinear decomposition of a cell grid across parallel ranks.

#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::grid::IndexBox;

fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut f = 2;
    while f * f <= n {
        while n % f == 0 {
            factors.push(f);
            n /= f;
        }
        f += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Splits `dims` cells into `parts` blocks, returning the block count per axis.
///
/// Prime factors of `parts` are assigned largest first, each to the axis
/// that currently has the most cells per block. An axis is skipped while a
/// split would leave its blocks less than two cells wide, unless no axis
/// can take the factor that way. Ties go to the lowest axis index.
#[must_use]
pub fn rectilinear_decomposition(dims: [usize; 3], parts: usize) -> [usize; 3] {
    let mut counts = [1_usize; 3];
    let mut factors = prime_factors(parts.max(1));
    factors.sort_unstable_by(|a, b| b.cmp(a));

    for f in factors {
        let mut order = [0_usize, 1, 2];
        // Stable: equal widths keep axis order.
        order.sort_by(|&a, &b| {
            let wa = dims[a] as f64 / counts[a] as f64;
            let wb = dims[b] as f64 / counts[b] as f64;
            wb.total_cmp(&wa)
        });
        let axis = order
            .iter()
            .copied()
            .find(|&a| dims[a] / (counts[a] * f) >= 2)
            .unwrap_or(order[0]);
        counts[axis] *= f;
    }
    counts
}

/// Cell ranges owned by `rank`, and the same ranges grown by a one-cell halo.
///
/// Block boundaries are `round(n * i / count)` on each axis; the halo is
/// clamped to the grid.
#[must_use]
pub fn rank_block(dims: [usize; 3], parts: [usize; 3], rank: usize) -> (IndexBox, IndexBox) {
    let index = [
        rank % parts[0],
        (rank / parts[0]) % parts[1],
        rank / (parts[0] * parts[1]),
    ];
    let mut owned = IndexBox::whole(dims);
    let mut halo = IndexBox::whole(dims);
    for a in 0..3 {
        let n = dims[a] as f64;
        let c = parts[a] as f64;
        let start = (n * index[a] as f64 / c).round() as usize;
        let end = ((n * (index[a] + 1) as f64 / c).round() as usize).min(dims[a]);
        let start = start.min(end);
        owned.lo[a] = start;
        owned.hi[a] = end;
        halo.lo[a] = start.saturating_sub(1);
        halo.hi[a] = (end + 1).min(dims[a]);
    }
    (owned, halo)
}
