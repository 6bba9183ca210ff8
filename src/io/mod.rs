//! Rank sources and output sinks.
//!
//! The combination core never touches a file format directly. It reads tiles
//! through a [`RankSource`] and persists global fields through an
//! [`OutputSink`]. Backends:
//!
//! - [`json`]: JSON rank files with `dims`/`fields` groups and a JSON output
//!   container,
//! - [`memory`]: in-process source and sink,
//! - `netcdf` (feature `netcdf`): the simulation's native netCDF files.

pub mod json;
pub mod memory;
#[cfg(feature = "netcdf")]
pub mod netcdf;

use crate::combine_error::CombineError;
use crate::field::{Axes, GlobalField};
use crate::rank::RankId;
use crate::tile::{TileDescriptor, TileMetadata};
use std::fmt::Debug;
use std::path::Path;

/// Dimension names of combined output containers, one per global axis.
pub const OUTPUT_DIMS: [&str; 3] = ["nx", "ny", "nz"];

/// Supplies per-rank tile metadata and raw field data.
///
/// Implementations must be shareable across threads: field buffers of
/// different ranks may be read concurrently.
pub trait RankSource: Send + Sync {
    /// All rank identifiers, sorted ascending.
    fn list_ranks(&self) -> Result<Vec<RankId>, CombineError>;

    /// The raw `dims` record of a rank.
    fn read_metadata(&self, rank: &RankId) -> Result<TileMetadata, CombineError>;

    /// Coordinate axes stored with a rank.
    fn read_axes(&self, rank: &RankId) -> Result<Axes, CombineError>;

    /// The padded, row-major local buffer of one field.
    fn read_field(&self, rank: &RankId, name: &str) -> Result<Vec<f64>, CombineError>;

    /// Names of the fields stored with a rank.
    fn list_field_names(&self, rank: &RankId) -> Result<Vec<String>, CombineError>;

    /// Read and validate a rank's tile descriptor.
    fn read_descriptor(&self, rank: &RankId) -> Result<TileDescriptor, CombineError> {
        TileDescriptor::try_from_metadata(rank, &self.read_metadata(rank)?)
    }
}

/// Persists assembled fields into one output container.
pub trait OutputSink: Send {
    /// Handle to an opened or created container.
    type Handle: Clone + Debug + Send + Sync;

    /// Create the container at `target` with the given axes, or reuse it if
    /// it already exists. Existing data is left untouched.
    fn create_if_absent(
        &mut self,
        target: &Path,
        axes: &Axes,
    ) -> Result<Self::Handle, CombineError>;

    /// Store `field` under `name`.
    ///
    /// # Errors
    /// `DuplicateField` if `name` was already written through this sink.
    fn write_field(
        &mut self,
        handle: &Self::Handle,
        name: &str,
        field: GlobalField,
    ) -> Result<(), CombineError>;
}
