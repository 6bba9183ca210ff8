#![cfg_attr(docsrs, feature(doc_cfg))]
//! # tile-combine
//!
//! tile-combine reassembles the per-rank output of a domain-decomposed
//! simulation into global 3-D field arrays. Each rank file holds one
//! ghost-padded tile per field plus the metadata placing the tile in the
//! global grid; the crate strips the ghost layers, checks that the tiles
//! cover the grid exactly once, and writes one global array per field into a
//! single output container.
//!
//! ## Features
//! - Analytic validation of a decomposition (overlaps, gaps) before any data
//!   is read
//! - Serial and plane-parallel interior copies with identical results
//! - Per-field failure isolation with rank and field named in every error
//! - JSON rank files out of the box, netCDF behind the `netcdf` feature
//! - Block decomposition helpers for producing synthetic rank files
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! tile-combine = "0.1"
//! # features = ["netcdf"]
//! ```
//!
//! ```no_run
//! use tile_combine::prelude::*;
//! use std::path::Path;
//!
//! let source = JsonRankSource::new("fields");
//! let combiner = FieldCombiner::new(source, JsonSink::new(), CombineConfig::default());
//! let report = combiner.combine(Path::new("out"))?.into_result()?;
//! println!("wrote {:?}", report.written);
//! # Ok::<(), CombineError>(())
//! ```
//!
//! ## Determinism
//!
//! Ranks are processed in natural order of their identifiers and fields in
//! sorted order. Parallel reads and copies never change the assembled values
//! or the order of reported failures.

pub mod assemble;
pub mod cancel;
pub mod combine;
pub mod combine_error;
pub mod config;
pub mod debug_invariants;
pub mod decompose;
pub mod field;
pub mod io;
pub mod rank;
pub mod tile;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::assemble::{GridAssembler, TilePlan, assemble};
    pub use crate::cancel::CancellationToken;
    pub use crate::combine::{CombineReport, FieldCombiner};
    pub use crate::combine_error::{CombineError, FieldFailure};
    pub use crate::config::CombineConfig;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::decompose::{GhostFill, block_decomposition, pad_tile};
    pub use crate::field::{Axes, GlobalField};
    pub use crate::io::json::{JsonContainer, JsonRankSource, JsonSink, RankFile};
    pub use crate::io::memory::{MemoryRankSource, MemorySink};
    #[cfg(feature = "netcdf")]
    pub use crate::io::netcdf::{NetcdfRankSource, NetcdfSink};
    pub use crate::io::{OutputSink, RankSource};
    pub use crate::rank::RankId;
    pub use crate::tile::{Region, Shape3, TileDescriptor, TileMetadata};
}
