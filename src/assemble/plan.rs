//! TilePlan: analytic validation of a tile decomposition.
//!
//! Before any data is copied, the destination windows of all tiles are
//! checked against each other and against the global grid:
//!
//! 1. every tile declares the run's global shape,
//! 2. no two windows share a cell,
//! 3. the windows together cover every global cell.
//!
//! Since windows lie inside the grid and are pairwise disjoint, (3) holds
//! exactly when the window volumes sum to the grid volume. Only when that
//! test fails is a coverage mask built, to report where the hole is.

use crate::combine_error::CombineError;
use crate::debug_invariants::DebugInvariants;
use crate::rank::RankId;
use crate::tile::{MAX_CELLS, Region, Shape3, TileDescriptor};
use itertools::Itertools;
use ndarray::{Array3, s};

/// One tile of a validated plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedTile {
    pub rank: RankId,
    pub descriptor: TileDescriptor,
}

/// A validated partition of a global grid into rank tiles.
///
/// # Invariants
/// - Tiles are sorted by ascending [`RankId`] and ranks are unique.
/// - Every tile's global shape equals [`global_shape`](Self::global_shape).
/// - Tile windows are pairwise disjoint and cover the whole grid.
#[derive(Clone, Debug)]
pub struct TilePlan {
    global_shape: Shape3,
    tiles: Vec<PlannedTile>,
}

impl TilePlan {
    /// Validate a set of tiles against `global_shape`.
    ///
    /// # Errors
    /// - `DuplicateRank` if a rank appears twice,
    /// - `ShapeMismatch` if a tile declares another global shape,
    /// - `OverlappingTiles` naming the lower and higher rank of the first
    ///   overlapping pair (in rank order) and their shared box,
    /// - `IncompleteCoverage` with the bounding box of unwritten cells.
    pub fn new<I>(global_shape: Shape3, tiles: I) -> Result<Self, CombineError>
    where
        I: IntoIterator<Item = (RankId, TileDescriptor)>,
    {
        let tiles: Vec<PlannedTile> = tiles
            .into_iter()
            .map(|(rank, descriptor)| PlannedTile { rank, descriptor })
            .sorted_by(|a, b| a.rank.cmp(&b.rank))
            .collect();

        if let Some(dup) = tiles.iter().map(|t| &t.rank).duplicates().next() {
            return Err(CombineError::DuplicateRank(dup.clone()));
        }
        for tile in &tiles {
            if tile.descriptor.global_shape() != global_shape {
                return Err(CombineError::ShapeMismatch {
                    rank: tile.rank.clone(),
                    expected: global_shape.to_vec(),
                    found: tile.descriptor.global_shape().to_vec(),
                });
            }
        }

        check_disjoint(&tiles)?;

        let cells = Region::full(global_shape)
            .checked_volume()
            .filter(|&n| n <= MAX_CELLS)
            .ok_or_else(|| {
                CombineError::Config(format!("global grid {global_shape:?} is not addressable"))
            })?;
        let covered = tiles
            .iter()
            .try_fold(0usize, |acc, t| acc.checked_add(t.descriptor.global_window().volume()));
        if covered != Some(cells) {
            return Err(uncovered_error(global_shape, &tiles));
        }

        let plan = TilePlan {
            global_shape,
            tiles,
        };
        crate::debug_invariants!(plan.validate_invariants(), "TilePlan::new");
        Ok(plan)
    }

    #[inline]
    pub fn global_shape(&self) -> Shape3 {
        self.global_shape
    }

    /// Tiles in ascending rank order.
    #[inline]
    pub fn tiles(&self) -> &[PlannedTile] {
        &self.tiles
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Ranks in the order their buffers are expected.
    pub fn ranks(&self) -> impl Iterator<Item = &RankId> {
        self.tiles.iter().map(|t| &t.rank)
    }
}

impl DebugInvariants for TilePlan {
    fn validate_invariants(&self) -> Result<(), CombineError> {
        if let Some((a, b)) = self
            .tiles
            .iter()
            .tuple_windows()
            .find(|(a, b)| a.rank >= b.rank)
        {
            return Err(CombineError::Config(format!(
                "plan ranks out of order: `{}` before `{}`",
                a.rank, b.rank
            )));
        }
        for tile in &self.tiles {
            tile.descriptor.validate_invariants()?;
        }
        check_disjoint(&self.tiles)
    }
}

/// Sweep along axis 0: only windows whose axis-0 ranges overlap can
/// intersect, so after sorting by `lo[0]` each tile is compared with the
/// tiles that start before it ends.
fn check_disjoint(tiles: &[PlannedTile]) -> Result<(), CombineError> {
    let order: Vec<usize> = (0..tiles.len())
        .filter(|&i| !tiles[i].descriptor.global_window().is_empty())
        .sorted_by_key(|&i| (tiles[i].descriptor.global_window().lo[0], i))
        .collect();

    let mut first_hit: Option<(usize, usize, Region)> = None;
    for (pos, &i) in order.iter().enumerate() {
        let wi = tiles[i].descriptor.global_window();
        for &j in &order[pos + 1..] {
            let wj = tiles[j].descriptor.global_window();
            if wj.lo[0] >= wi.hi[0] {
                break;
            }
            if let Some(region) = wi.intersect(&wj) {
                let pair = (i.min(j), i.max(j), region);
                // report the pair that comes first in rank order
                if first_hit
                    .as_ref()
                    .is_none_or(|(a, b, _)| (pair.0, pair.1) < (*a, *b))
                {
                    first_hit = Some(pair);
                }
            }
        }
    }

    match first_hit {
        Some((a, b, region)) => Err(CombineError::OverlappingTiles {
            first: tiles[a].rank.clone(),
            second: tiles[b].rank.clone(),
            region,
        }),
        None => Ok(()),
    }
}

/// Build a coverage mask and describe the unwritten cells.
fn uncovered_error(global_shape: Shape3, tiles: &[PlannedTile]) -> CombineError {
    let mut covered = Array3::<bool>::from_elem(global_shape, false);
    for tile in tiles {
        let w = tile.descriptor.global_window();
        covered
            .slice_mut(s![w.axis(0), w.axis(1), w.axis(2)])
            .fill(true);
    }

    let mut lo = global_shape;
    let mut hi = [0usize; 3];
    let mut unwritten = 0usize;
    for ((i, j, k), &written) in covered.indexed_iter() {
        if written {
            continue;
        }
        unwritten += 1;
        for (a, v) in [i, j, k].into_iter().enumerate() {
            lo[a] = lo[a].min(v);
            hi[a] = hi[a].max(v + 1);
        }
    }
    CombineError::IncompleteCoverage {
        region: Region { lo, hi },
        unwritten,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(rank: &str, shape: Shape3, offset: Shape3, global: Shape3) -> (RankId, TileDescriptor) {
        let rank = RankId::from(rank);
        let d = TileDescriptor::new(&rank, shape, 1, offset, global).unwrap();
        (rank, d)
    }

    #[test]
    fn exact_partition_is_accepted_and_sorted() {
        let g = [4, 2, 2];
        let plan = TilePlan::new(
            g,
            [
                tile("10", [2, 2, 2], [2, 0, 0], g),
                tile("2", [2, 2, 2], [0, 0, 0], g),
            ],
        )
        .unwrap();
        let ranks: Vec<_> = plan.ranks().map(|r| r.to_string()).collect();
        assert_eq!(ranks, vec!["2", "10"]);
    }

    #[test]
    fn overlap_names_both_ranks_and_shared_box() {
        let g = [4, 4, 4];
        let err = TilePlan::new(
            g,
            [
                tile("0", [3, 4, 4], [0, 0, 0], g),
                tile("1", [2, 4, 4], [2, 0, 0], g),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            CombineError::OverlappingTiles {
                first: RankId::from("0"),
                second: RankId::from("1"),
                region: Region { lo: [2, 0, 0], hi: [3, 4, 4] },
            }
        );
    }

    #[test]
    fn overlap_is_found_past_non_overlapping_neighbours() {
        let g = [4, 4, 1];
        // rank 2 only collides with rank 0, which is not its sort neighbour
        let err = TilePlan::new(
            g,
            [
                tile("0", [4, 2, 1], [0, 0, 0], g),
                tile("1", [1, 2, 1], [0, 2, 0], g),
                tile("2", [1, 1, 1], [3, 1, 0], g),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, CombineError::OverlappingTiles { .. }));
    }

    #[test]
    fn gap_reports_bounding_box_of_missing_cells() {
        let g = [4, 4, 4];
        let err = TilePlan::new(
            g,
            [
                tile("0", [4, 4, 2], [0, 0, 2], g),
                tile("1", [4, 3, 2], [0, 1, 0], g),
                tile("2", [3, 1, 2], [1, 0, 0], g),
                tile("3", [1, 1, 1], [0, 0, 1], g),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            CombineError::IncompleteCoverage {
                region: Region { lo: [0, 0, 0], hi: [1, 1, 1] },
                unwritten: 1,
            }
        );
    }

    #[test]
    fn empty_plan_is_incomplete() {
        let err = TilePlan::new([2, 2, 2], Vec::new()).unwrap_err();
        assert_eq!(
            err,
            CombineError::IncompleteCoverage {
                region: Region::full([2, 2, 2]),
                unwritten: 8,
            }
        );
    }

    #[test]
    fn foreign_global_shape_is_rejected() {
        let err = TilePlan::new(
            [4, 2, 2],
            [
                tile("0", [2, 2, 2], [0, 0, 0], [4, 2, 2]),
                tile("1", [2, 2, 2], [2, 0, 0], [4, 2, 3]),
            ],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CombineError::ShapeMismatch { ref rank, .. } if rank.as_str() == "1"
        ));
    }

    #[test]
    fn duplicate_rank_is_rejected() {
        let g = [2, 1, 1];
        let err = TilePlan::new(
            g,
            [
                tile("0", [1, 1, 1], [0, 0, 0], g),
                tile("0", [1, 1, 1], [1, 0, 0], g),
            ],
        )
        .unwrap_err();
        assert_eq!(err, CombineError::DuplicateRank(RankId::from("0")));
    }

    #[test]
    fn unaddressable_grid_is_an_error_not_a_panic() {
        let huge = [1 << 22; 3];
        let err = TilePlan::new(huge, Vec::new()).unwrap_err();
        assert!(matches!(err, CombineError::Config(_)), "{err:?}");
    }
}
