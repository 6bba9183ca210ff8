//! Block decomposition of a global grid into ghost-padded rank tiles.
//!
//! The inverse of assembly: split a grid into `parts[0] x parts[1] x parts[2]`
//! blocks and cut each block's padded local array out of a global field.
//! Used to produce fixtures, and handy for checking a pipeline end to end.

use crate::combine_error::CombineError;
use crate::rank::RankId;
use crate::tile::{Shape3, TileDescriptor};
use ndarray::{Array3, ArrayView3, s};

/// How ghost cells of a cut tile are filled.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GhostFill {
    /// Every ghost cell holds this value.
    Constant(f64),
    /// Ghost cells hold the neighbouring ranks' data, as a halo exchange
    /// would leave them; cells outside the global grid hold `outside`.
    Neighbours { outside: f64 },
}

/// Split `global_shape` into `parts` blocks per axis.
///
/// Block sizes differ by at most one cell; the first `n % parts` blocks get
/// the extra cell. Ranks are numbered row-major over the block grid
/// (`k + parts[2] * (j + parts[1] * i)`).
///
/// # Errors
/// `Config` if a part count is zero or exceeds the axis extent.
pub fn block_decomposition(
    global_shape: Shape3,
    parts: Shape3,
    ghost_width: usize,
) -> Result<Vec<(RankId, TileDescriptor)>, CombineError> {
    for a in 0..3 {
        if parts[a] == 0 || parts[a] > global_shape[a] {
            return Err(CombineError::Config(format!(
                "cannot split extent {} on axis {a} into {} part(s)",
                global_shape[a], parts[a]
            )));
        }
    }
    let splits: Vec<Vec<(usize, usize)>> = (0..3)
        .map(|a| split_axis(global_shape[a], parts[a]))
        .collect();

    let mut tiles = Vec::with_capacity(parts.iter().product());
    for (i, &(lo0, n0)) in splits[0].iter().enumerate() {
        for (j, &(lo1, n1)) in splits[1].iter().enumerate() {
            for (k, &(lo2, n2)) in splits[2].iter().enumerate() {
                let rank = RankId::new((k + parts[2] * (j + parts[1] * i)).to_string());
                let descriptor = TileDescriptor::new(
                    &rank,
                    [n0, n1, n2],
                    ghost_width,
                    [lo0, lo1, lo2],
                    global_shape,
                )?;
                tiles.push((rank, descriptor));
            }
        }
    }
    Ok(tiles)
}

/// `(offset, len)` of each part of an axis of extent `n`.
fn split_axis(n: usize, parts: usize) -> Vec<(usize, usize)> {
    let base = n / parts;
    let extra = n % parts;
    let mut offset = 0;
    (0..parts)
        .map(|p| {
            let len = base + usize::from(p < extra);
            let out = (offset, len);
            offset += len;
            out
        })
        .collect()
}

/// Cut the padded local buffer (row-major) of `descriptor` out of `global`.
///
/// # Errors
/// `ShapeMismatch` if `global` does not have the descriptor's global shape.
pub fn pad_tile(
    rank: &RankId,
    global: ArrayView3<'_, f64>,
    descriptor: &TileDescriptor,
    fill: GhostFill,
) -> Result<Vec<f64>, CombineError> {
    let shape = global.shape();
    if shape != &descriptor.global_shape()[..] {
        return Err(CombineError::ShapeMismatch {
            rank: rank.clone(),
            expected: descriptor.global_shape().to_vec(),
            found: shape.to_vec(),
        });
    }
    let g = descriptor.ghost_width();
    let padded = match fill {
        GhostFill::Constant(value) => {
            let inner = descriptor.interior_window();
            let dst = descriptor.global_window();
            let mut a = Array3::from_elem(descriptor.padded_shape(), value);
            a.slice_mut(s![inner.axis(0), inner.axis(1), inner.axis(2)])
                .assign(&global.slice(s![dst.axis(0), dst.axis(1), dst.axis(2)]));
            a
        }
        GhostFill::Neighbours { outside } => {
            let lo = descriptor.global_offset();
            Array3::from_shape_fn(descriptor.padded_shape(), |(i, j, k)| {
                let cell = [i, j, k];
                let mut at = [0usize; 3];
                for a in 0..3 {
                    // global = lo + local - g, computed without going negative
                    match (lo[a] + cell[a]).checked_sub(g) {
                        Some(v) if v < descriptor.global_shape()[a] => at[a] = v,
                        _ => return outside,
                    }
                }
                global[at]
            })
        }
    };
    Ok(padded.into_raw_vec())
}
