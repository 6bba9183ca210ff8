//! Structural self-checks for validated tile types.
//!
//! [`TileDescriptor`](crate::tile::TileDescriptor) and
//! [`TilePlan`](crate::assemble::TilePlan) establish their invariants once, at
//! construction. In debug builds (or with the `check-invariants` feature)
//! `TilePlan::new` re-runs the full check over the plan and every descriptor
//! in it, and panics on a violation.

use crate::combine_error::CombineError;

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), CombineError>;

    /// Assert invariants in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "debug_assert_invariants");
    }
}

/// Run a fallible check and panic on error when invariant checking is
/// enabled. Compiles to nothing otherwise.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
