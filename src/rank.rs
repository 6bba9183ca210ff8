//! `RankId`: a stable, ordered handle for one rank's output file.
//!
//! Rank files are named by the simulation that wrote them, usually with an
//! embedded rank number (`0.nc`, `rank_12.json`, `fields.00003.nc`). Sorting
//! those names byte-wise puts `rank_10` before `rank_2`, so `RankId` orders
//! by *natural* order instead: maximal runs of ASCII digits compare by their
//! numeric value, everything else compares byte-wise.
//!
//! Ties between numerically equal runs (`007` vs `7`) fall back to the raw
//! name so that the order stays total and deterministic.

use std::cmp::Ordering;
use std::fmt;

/// Identifier of one rank source, usually a file name.
#[derive(Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RankId(String);

impl RankId {
    /// Wraps a rank name.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        RankId(name.into())
    }

    /// The raw name as handed to the rank source.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds rank ids for `0..n`, handy for in-memory sources.
    pub fn range(n: usize) -> Vec<RankId> {
        (0..n).map(|r| RankId(r.to_string())).collect()
    }
}

impl From<&str> for RankId {
    fn from(s: &str) -> Self {
        RankId::new(s)
    }
}

impl From<String> for RankId {
    fn from(s: String) -> Self {
        RankId(s)
    }
}

impl fmt::Debug for RankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RankId({})", self.0)
    }
}

impl fmt::Display for RankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for RankId {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for RankId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two names chunk by chunk, digits numerically.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.as_bytes(), b.as_bytes());
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (da, ra) = split_digits(a);
                let (db, rb) = split_digits(b);
                let ord = cmp_digit_runs(da, db);
                if ord != Ordering::Equal {
                    return ord;
                }
                a = ra;
                b = rb;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let n = s.iter().take_while(|c| c.is_ascii_digit()).count();
    s.split_at(n)
}

/// Numeric comparison of two digit runs of arbitrary length.
fn cmp_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let strip = |s: &'_ [u8]| -> usize { s.iter().take_while(|&&c| c == b'0').count() };
    let a = &a[strip(a)..];
    let b = &b[strip(b)..];
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
