//! TileDescriptor: how one rank's local tile maps into the global grid.
//!
//! A rank file stores its tile as a padded local array of shape
//! `local_shape + 2 * ghost_width` along each axis, together with the offset
//! of its first interior cell in the global index space. This module turns
//! the loosely typed metadata record read from a rank file
//! ([`TileMetadata`]) into a validated, immutable [`TileDescriptor`].
//!
//! # Invariants
//!
//! For every axis `a`:
//! - `global_shape[a] > 0`,
//! - `global_offset[a] + local_shape[a] <= global_shape[a]`.
//!
//! Negative values in the raw record are rejected before conversion to
//! `usize`.

use crate::combine_error::CombineError;
use crate::debug_invariants::DebugInvariants;
use crate::rank::RankId;
use std::fmt;
use std::ops::Range;

/// Extent along the three global axes, slowest-varying first.
pub type Shape3 = [usize; 3];

/// Largest number of `f64` cells one allocation can hold.
pub const MAX_CELLS: usize = isize::MAX as usize / std::mem::size_of::<f64>();

/// Half-open axis-aligned box `[lo, hi)` in global index space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub lo: Shape3,
    pub hi: Shape3,
}

impl Region {
    /// Box starting at `lo` with extent `shape`.
    #[inline]
    pub fn from_offset(lo: Shape3, shape: Shape3) -> Self {
        Region {
            lo,
            hi: [lo[0] + shape[0], lo[1] + shape[1], lo[2] + shape[2]],
        }
    }

    /// The box covering a whole grid of `shape`.
    #[inline]
    pub fn full(shape: Shape3) -> Self {
        Region::from_offset([0; 3], shape)
    }

    #[inline]
    pub fn shape(&self) -> Shape3 {
        [
            self.hi[0].saturating_sub(self.lo[0]),
            self.hi[1].saturating_sub(self.lo[1]),
            self.hi[2].saturating_sub(self.lo[2]),
        ]
    }

    /// Number of cells in the box.
    #[inline]
    pub fn volume(&self) -> usize {
        self.shape().iter().product()
    }

    /// Number of cells, `None` if it overflows `usize`.
    pub fn checked_volume(&self) -> Option<usize> {
        self.shape().iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    #[inline]
    pub fn contains(&self, cell: Shape3) -> bool {
        (0..3).all(|a| self.lo[a] <= cell[a] && cell[a] < self.hi[a])
    }

    /// Intersection of two boxes, `None` when they share no cell.
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let mut out = Region {
            lo: [0; 3],
            hi: [0; 3],
        };
        for a in 0..3 {
            out.lo[a] = self.lo[a].max(other.lo[a]);
            out.hi[a] = self.hi[a].min(other.hi[a]);
            if out.lo[a] >= out.hi[a] {
                return None;
            }
        }
        Some(out)
    }

    /// Index range along axis `a`.
    #[inline]
    pub fn axis(&self, a: usize) -> Range<usize> {
        self.lo[a]..self.hi[a]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..{}, {}..{}, {}..{}]",
            self.lo[0], self.hi[0], self.lo[1], self.hi[1], self.lo[2], self.hi[2]
        )
    }
}

/// Tile metadata exactly as stored in a rank file's `dims` group.
///
/// Values are signed because that is how the writing code stores them;
/// [`TileDescriptor::try_from_metadata`] rejects anything negative.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TileMetadata {
    pub n_0: i64,
    pub n_1: i64,
    pub n_2: i64,
    pub nl_0: i64,
    pub nl_1: i64,
    pub nl_2: i64,
    pub ng: i64,
    pub indx_lo_0: i64,
    pub indx_lo_1: i64,
    pub indx_lo_2: i64,
}

impl TileMetadata {
    /// Record describing `descriptor`, used when writing rank files.
    pub fn from_descriptor(descriptor: &TileDescriptor) -> Self {
        let [n_0, n_1, n_2] = descriptor.global_shape.map(|v| v as i64);
        let [nl_0, nl_1, nl_2] = descriptor.local_shape.map(|v| v as i64);
        let [indx_lo_0, indx_lo_1, indx_lo_2] = descriptor.global_offset.map(|v| v as i64);
        TileMetadata {
            n_0,
            n_1,
            n_2,
            nl_0,
            nl_1,
            nl_2,
            ng: descriptor.ghost_width as i64,
            indx_lo_0,
            indx_lo_1,
            indx_lo_2,
        }
    }
}

/// Validated placement of one rank tile in the global grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TileDescriptor {
    local_shape: Shape3,
    ghost_width: usize,
    global_offset: Shape3,
    global_shape: Shape3,
}

impl TileDescriptor {
    /// Typed constructor.
    ///
    /// # Errors
    /// `MalformedMetadata` if a global extent is zero or the tile does not fit
    /// inside the global grid.
    pub fn new(
        rank: &RankId,
        local_shape: Shape3,
        ghost_width: usize,
        global_offset: Shape3,
        global_shape: Shape3,
    ) -> Result<Self, CombineError> {
        let descriptor = TileDescriptor {
            local_shape,
            ghost_width,
            global_offset,
            global_shape,
        };
        descriptor.check(rank)?;
        descriptor
            .checked_padded_len()
            .filter(|&n| n <= MAX_CELLS)
            .ok_or_else(|| malformed(rank, "padded tile size is not addressable".to_string()))?;
        Ok(descriptor)
    }

    /// Validate a raw metadata record read from `rank`.
    ///
    /// # Errors
    /// `MalformedMetadata` if any value is negative, a global extent is zero,
    /// or the containment invariant is violated.
    pub fn try_from_metadata(rank: &RankId, meta: &TileMetadata) -> Result<Self, CombineError> {
        let global_shape = [
            non_negative(rank, "n_0", meta.n_0)?,
            non_negative(rank, "n_1", meta.n_1)?,
            non_negative(rank, "n_2", meta.n_2)?,
        ];
        let local_shape = [
            non_negative(rank, "nl_0", meta.nl_0)?,
            non_negative(rank, "nl_1", meta.nl_1)?,
            non_negative(rank, "nl_2", meta.nl_2)?,
        ];
        let ghost_width = non_negative(rank, "ng", meta.ng)?;
        let global_offset = [
            non_negative(rank, "indx_lo_0", meta.indx_lo_0)?,
            non_negative(rank, "indx_lo_1", meta.indx_lo_1)?,
            non_negative(rank, "indx_lo_2", meta.indx_lo_2)?,
        ];
        TileDescriptor::new(rank, local_shape, ghost_width, global_offset, global_shape)
    }

    #[inline]
    pub fn local_shape(&self) -> Shape3 {
        self.local_shape
    }

    #[inline]
    pub fn ghost_width(&self) -> usize {
        self.ghost_width
    }

    #[inline]
    pub fn global_offset(&self) -> Shape3 {
        self.global_offset
    }

    #[inline]
    pub fn global_shape(&self) -> Shape3 {
        self.global_shape
    }

    /// Shape of the stored array, ghosts included.
    #[inline]
    pub fn padded_shape(&self) -> Shape3 {
        self.local_shape.map(|n| n + 2 * self.ghost_width)
    }

    /// Number of values in the stored array.
    #[inline]
    pub fn padded_len(&self) -> usize {
        self.padded_shape().iter().product()
    }

    /// Cells this tile owns in the global grid.
    #[inline]
    pub fn global_window(&self) -> Region {
        Region::from_offset(self.global_offset, self.local_shape)
    }

    /// Ghost-stripped interior inside the padded local array.
    #[inline]
    pub fn interior_window(&self) -> Region {
        Region::from_offset([self.ghost_width; 3], self.local_shape)
    }

    fn checked_padded_len(&self) -> Option<usize> {
        self.local_shape.iter().try_fold(1usize, |acc, &n| {
            let padded = self.ghost_width.checked_mul(2)?.checked_add(n)?;
            acc.checked_mul(padded)
        })
    }

    fn check(&self, rank: &RankId) -> Result<(), CombineError> {
        Region::full(self.global_shape)
            .checked_volume()
            .filter(|&n| n <= MAX_CELLS)
            .ok_or_else(|| {
                malformed(
                    rank,
                    format!("global grid {:?} is not addressable", self.global_shape),
                )
            })?;
        for a in 0..3 {
            if self.global_shape[a] == 0 {
                return Err(malformed(rank, format!("global extent n_{a} is zero")));
            }
            let end = self.global_offset[a]
                .checked_add(self.local_shape[a])
                .ok_or_else(|| malformed(rank, format!("offset overflow on axis {a}")))?;
            if end > self.global_shape[a] {
                return Err(malformed(
                    rank,
                    format!(
                        "tile [{}..{end}) exceeds global extent {} on axis {a}",
                        self.global_offset[a], self.global_shape[a]
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl DebugInvariants for TileDescriptor {
    fn validate_invariants(&self) -> Result<(), CombineError> {
        self.check(&RankId::from("<unknown>"))
    }
}

fn non_negative(rank: &RankId, key: &str, value: i64) -> Result<usize, CombineError> {
    usize::try_from(value).map_err(|_| malformed(rank, format!("`{key}` is negative ({value})")))
}

fn malformed(rank: &RankId, reason: String) -> CombineError {
    CombineError::MalformedMetadata {
        rank: rank.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TileMetadata {
        TileMetadata {
            n_0: 8,
            n_1: 4,
            n_2: 4,
            nl_0: 4,
            nl_1: 4,
            nl_2: 4,
            ng: 2,
            indx_lo_0: 4,
            indx_lo_1: 0,
            indx_lo_2: 0,
        }
    }

    #[test]
    fn valid_metadata_round_trips() {
        let rank = RankId::from("1");
        let d = TileDescriptor::try_from_metadata(&rank, &meta()).unwrap();
        assert_eq!(d.local_shape(), [4, 4, 4]);
        assert_eq!(d.padded_shape(), [8, 8, 8]);
        assert_eq!(d.padded_len(), 512);
        assert_eq!(d.global_window(), Region { lo: [4, 0, 0], hi: [8, 4, 4] });
        assert_eq!(d.interior_window(), Region { lo: [2, 2, 2], hi: [6, 6, 6] });
        assert_eq!(TileMetadata::from_descriptor(&d), meta());
    }

    #[test]
    fn negative_values_are_rejected() {
        let rank = RankId::from("r");
        let patches: [fn(&mut TileMetadata); 4] = [
            |m| m.ng = -1,
            |m| m.nl_1 = -4,
            |m| m.indx_lo_2 = -1,
            |m| m.n_0 = -8,
        ];
        for patch in patches {
            let mut m = meta();
            patch(&mut m);
            let err = TileDescriptor::try_from_metadata(&rank, &m).unwrap_err();
            assert!(matches!(err, CombineError::MalformedMetadata { .. }), "{err}");
        }
    }

    #[test]
    fn tile_past_global_extent_is_rejected() {
        let mut m = meta();
        m.indx_lo_0 = 5;
        let err = TileDescriptor::try_from_metadata(&RankId::from("r"), &m).unwrap_err();
        match err {
            CombineError::MalformedMetadata { reason, .. } => assert!(reason.contains("axis 0")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_global_extent_is_rejected() {
        let mut m = meta();
        m.n_2 = 0;
        m.nl_2 = 0;
        assert!(TileDescriptor::try_from_metadata(&RankId::from("r"), &m).is_err());
    }

    #[test]
    fn unaddressable_global_grid_is_rejected() {
        let m = TileMetadata {
            n_0: 1 << 22,
            n_1: 1 << 22,
            n_2: 1 << 22,
            nl_0: 1,
            nl_1: 1,
            nl_2: 1,
            ..TileMetadata::default()
        };
        let err = TileDescriptor::try_from_metadata(&RankId::from("7"), &m).unwrap_err();
        assert!(
            matches!(err, CombineError::MalformedMetadata { ref rank, ref reason }
                if rank.as_str() == "7" && reason.contains("not addressable")),
            "{err:?}"
        );
    }

    #[test]
    fn unaddressable_padding_is_rejected() {
        let rank = RankId::from("0");
        let err = TileDescriptor::new(&rank, [1, 1, 1], usize::MAX / 4, [0; 3], [1, 1, 1]);
        assert!(matches!(err, Err(CombineError::MalformedMetadata { .. })));
    }

    #[test]
    fn checked_volume_detects_overflow() {
        assert_eq!(Region::full([2, 3, 4]).checked_volume(), Some(24));
        assert_eq!(Region::full([usize::MAX, 2, 1]).checked_volume(), None);
    }

    #[test]
    fn region_intersection() {
        let a = Region::from_offset([0, 0, 0], [2, 2, 2]);
        let b = Region::from_offset([1, 1, 1], [2, 2, 2]);
        let c = Region::from_offset([2, 0, 0], [2, 2, 2]);
        assert_eq!(a.intersect(&b), Some(Region { lo: [1, 1, 1], hi: [2, 2, 2] }));
        assert_eq!(a.intersect(&c), None);
        assert_eq!(a.to_string(), "[0..2, 0..2, 0..2]");
    }
}
