//! Grid assembly: copy ghost-stripped tile interiors into a global array.
//!
//! Assembly is split in two phases:
//! 1. [`TilePlan::new`] validates the decomposition analytically (shapes,
//!    overlaps, coverage) from tile metadata alone;
//! 2. a [`FieldFold`] takes the raw tile buffers of one field in plan order
//!    and copies each interior into a zeroed [`GlobalField`] as soon as it
//!    arrives, so a buffer can be dropped before the next one is read.
//!
//! A plan only depends on metadata, so one plan serves every field of a run.

pub mod plan;

pub use plan::{PlannedTile, TilePlan};

use crate::combine_error::CombineError;
use crate::field::GlobalField;
use crate::rank::RankId;
use crate::tile::{Shape3, TileDescriptor};
use ndarray::{Array3, ArrayView3, s};

/// Copies tile interiors into the global grid described by a [`TilePlan`].
#[derive(Clone, Copy, Debug)]
pub struct GridAssembler<'p> {
    plan: &'p TilePlan,
    parallel_copy: bool,
}

impl<'p> GridAssembler<'p> {
    pub fn new(plan: &'p TilePlan) -> Self {
        GridAssembler {
            plan,
            parallel_copy: false,
        }
    }

    /// Copy the axis-0 planes of each tile in parallel (needs the `rayon`
    /// feature; ignored otherwise).
    pub fn with_parallel_copy(mut self, parallel: bool) -> Self {
        self.parallel_copy = parallel;
        self
    }

    #[inline]
    pub fn plan(&self) -> &'p TilePlan {
        self.plan
    }

    /// Start a field: a zeroed global array waiting for the plan's tiles.
    pub fn begin(&self) -> FieldFold<'p> {
        FieldFold {
            plan: self.plan,
            parallel_copy: self.parallel_copy,
            field: GlobalField::zeros(self.plan.global_shape()),
            next: 0,
        }
    }

    /// Assemble one field from buffers already in memory.
    ///
    /// `buffers[i]` is the padded, row-major raw buffer of
    /// `plan.tiles()[i]`.
    ///
    /// # Errors
    /// - `Config` if the number of buffers differs from the number of tiles,
    /// - `BufferSizeMismatch` if a buffer's length is not the tile's padded
    ///   length.
    pub fn assemble_field<B>(&self, buffers: &[B]) -> Result<GlobalField, CombineError>
    where
        B: AsRef<[f64]>,
    {
        if buffers.len() != self.plan.len() {
            return Err(CombineError::Config(format!(
                "expected {} tile buffers, got {}",
                self.plan.len(),
                buffers.len()
            )));
        }
        let mut fold = self.begin();
        for raw in buffers {
            fold.push(raw.as_ref())?;
        }
        fold.finish()
    }
}

/// One field under assembly.
///
/// Buffers are pushed in plan order and copied immediately. The global array
/// is only handed out by [`finish`](Self::finish) once every tile has been
/// copied; a fold dropped on error takes its partial field with it.
#[derive(Debug)]
pub struct FieldFold<'p> {
    plan: &'p TilePlan,
    parallel_copy: bool,
    field: GlobalField,
    next: usize,
}

impl<'p> FieldFold<'p> {
    /// Tile whose buffer [`push`](Self::push) expects next.
    pub fn next_tile(&self) -> Option<&'p PlannedTile> {
        self.plan.tiles().get(self.next)
    }

    /// Copy the interior of the next tile's padded buffer.
    ///
    /// # Errors
    /// `BufferSizeMismatch` if `raw` is not the tile's padded length,
    /// `Config` if every tile was already pushed.
    pub fn push(&mut self, raw: &[f64]) -> Result<(), CombineError> {
        let tile = self.next_tile().ok_or_else(|| {
            CombineError::Config(format!("all {} tile buffers already copied", self.plan.len()))
        })?;
        let src = padded_view(&tile.rank, &tile.descriptor, raw)?;
        copy_tile(&tile.descriptor, src, self.field.array_mut(), self.parallel_copy);
        log::trace!("copied rank `{}`", tile.rank);
        self.next += 1;
        Ok(())
    }

    /// The assembled field.
    ///
    /// # Errors
    /// `Config` if some tile was never pushed.
    pub fn finish(self) -> Result<GlobalField, CombineError> {
        if self.next != self.plan.len() {
            return Err(CombineError::Config(format!(
                "only {} of {} tile buffers copied",
                self.next,
                self.plan.len()
            )));
        }
        Ok(self.field)
    }
}

/// Validate and assemble in one call.
///
/// `tiles` may come in any order; they are processed in ascending rank order.
///
/// # Errors
/// Every error of [`TilePlan::new`] and [`GridAssembler::assemble_field`].
pub fn assemble<I>(global_shape: Shape3, tiles: I) -> Result<GlobalField, CombineError>
where
    I: IntoIterator<Item = (RankId, TileDescriptor, Vec<f64>)>,
{
    let (meta, mut raw): (Vec<_>, Vec<_>) = tiles
        .into_iter()
        .map(|(rank, descriptor, buffer)| ((rank.clone(), descriptor), (rank, buffer)))
        .unzip();
    let plan = TilePlan::new(global_shape, meta)?;
    raw.sort_by(|a, b| a.0.cmp(&b.0));
    let mut fold = GridAssembler::new(&plan).begin();
    for (_, buffer) in raw {
        fold.push(&buffer)?;
    }
    fold.finish()
}

fn padded_view<'a>(
    rank: &RankId,
    descriptor: &TileDescriptor,
    raw: &'a [f64],
) -> Result<ArrayView3<'a, f64>, CombineError> {
    let expected = descriptor.padded_len();
    if raw.len() != expected {
        return Err(CombineError::BufferSizeMismatch {
            rank: rank.clone(),
            expected,
            found: raw.len(),
        });
    }
    ArrayView3::from_shape(descriptor.padded_shape(), raw).map_err(|e| {
        CombineError::MalformedMetadata {
            rank: rank.clone(),
            reason: e.to_string(),
        }
    })
}

/// Assign the ghost-stripped interior of `src` to the tile's global window.
///
/// In parallel mode each axis-0 plane of the window is one task; windows are
/// disjoint, so every cell still has one writer.
fn copy_tile(
    descriptor: &TileDescriptor,
    src: ArrayView3<'_, f64>,
    out: &mut Array3<f64>,
    parallel: bool,
) {
    let inner = descriptor.interior_window();
    let dst = descriptor.global_window();
    let src = src.slice(s![inner.axis(0), inner.axis(1), inner.axis(2)]);
    let mut dst = out.slice_mut(s![dst.axis(0), dst.axis(1), dst.axis(2)]);

    #[cfg(feature = "rayon")]
    if parallel {
        use ndarray::Axis;
        use ndarray::parallel::prelude::*;

        dst.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(src.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut plane, from)| plane.assign(&from));
        return;
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    dst.assign(&src);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Padded buffer with `interior` inside and `ghost` in the margin.
    fn filled(d: &TileDescriptor, interior: f64, ghost: f64) -> Vec<f64> {
        let w = d.interior_window();
        let mut a = Array3::from_elem(d.padded_shape(), ghost);
        a.slice_mut(s![w.axis(0), w.axis(1), w.axis(2)]).fill(interior);
        a.into_raw_vec()
    }

    fn two_rank_tiles() -> Vec<(RankId, TileDescriptor, Vec<f64>)> {
        let g = [4, 2, 2];
        [("0", [0, 0, 0], 1.0), ("1", [2, 0, 0], 2.0)]
            .into_iter()
            .map(|(r, offset, v)| {
                let rank = RankId::from(r);
                let d = TileDescriptor::new(&rank, [2, 2, 2], 1, offset, g).unwrap();
                let raw = filled(&d, v, 9.0);
                (rank, d, raw)
            })
            .collect()
    }

    #[test]
    fn two_ranks_with_ghosts() {
        let field = assemble([4, 2, 2], two_rank_tiles()).unwrap();
        for ((i, _, _), &v) in field.view().indexed_iter() {
            assert_eq!(v, if i < 2 { 1.0 } else { 2.0 });
        }
        assert!(field.view().iter().all(|&v| v != 9.0));
    }

    #[test]
    fn buffer_of_wrong_length_is_rejected() {
        let mut tiles = two_rank_tiles();
        tiles[1].2.pop();
        let err = assemble([4, 2, 2], tiles).unwrap_err();
        assert_eq!(
            err,
            CombineError::BufferSizeMismatch {
                rank: RankId::from("1"),
                expected: 64,
                found: 63,
            }
        );
    }

    #[test]
    fn parallel_and_serial_copies_agree() {
        let g = [5, 3, 4];
        let tiles = [(0usize, 2usize), (2, 3)].into_iter().enumerate().map(|(n, (lo, len))| {
            let rank = RankId::from(n.to_string());
            let d = TileDescriptor::new(&rank, [len, 3, 4], 2, [lo, 0, 0], g).unwrap();
            (rank, d)
        });
        let plan = TilePlan::new(g, tiles).unwrap();
        let buffers: Vec<Vec<f64>> = plan
            .tiles()
            .iter()
            .enumerate()
            .map(|(n, t)| {
                (0..t.descriptor.padded_len())
                    .map(|v| v as f64 + 1000.0 * n as f64)
                    .collect()
            })
            .collect();
        let serial = GridAssembler::new(&plan).assemble_field(&buffers).unwrap();
        let parallel = GridAssembler::new(&plan)
            .with_parallel_copy(true)
            .assemble_field(&buffers)
            .unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn buffer_count_must_match_plan() {
        let g = [2, 1, 1];
        let rank = RankId::from("0");
        let d = TileDescriptor::new(&rank, [2, 1, 1], 0, [0, 0, 0], g).unwrap();
        let plan = TilePlan::new(g, [(rank, d)]).unwrap();
        let none: Vec<Vec<f64>> = Vec::new();
        assert!(matches!(
            GridAssembler::new(&plan).assemble_field(&none),
            Err(CombineError::Config(_))
        ));
    }

    #[test]
    fn fold_copies_each_buffer_as_it_arrives() {
        let tiles = two_rank_tiles();
        let plan = TilePlan::new(
            [4, 2, 2],
            tiles.iter().map(|(r, d, _)| (r.clone(), *d)),
        )
        .unwrap();
        let mut fold = GridAssembler::new(&plan).begin();
        assert_eq!(fold.next_tile().map(|t| t.rank.as_str()), Some("0"));
        fold.push(&tiles[0].2).unwrap();
        assert_eq!(fold.next_tile().map(|t| t.rank.as_str()), Some("1"));
        fold.push(&tiles[1].2).unwrap();
        assert!(fold.next_tile().is_none());
        assert!(matches!(fold.push(&tiles[1].2), Err(CombineError::Config(_))));
        let field = fold.finish().unwrap();
        assert_eq!(field.get([3, 1, 1]), Some(2.0));
    }

    #[test]
    fn unfinished_fold_is_not_a_field() {
        let tiles = two_rank_tiles();
        let plan = TilePlan::new(
            [4, 2, 2],
            tiles.iter().map(|(r, d, _)| (r.clone(), *d)),
        )
        .unwrap();
        let mut fold = GridAssembler::new(&plan).with_parallel_copy(true).begin();
        fold.push(&tiles[0].2).unwrap();
        assert!(matches!(fold.finish(), Err(CombineError::Config(_))));
    }
}
