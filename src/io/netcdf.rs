//! netCDF rank files and output containers (feature `netcdf`).
//!
//! Rank files carry two groups: `dims` with one-element integer variables
//! (`n_0..2`, `nl_0..2`, `ng`, `indx_lo_0..2`) and the coordinate vectors
//! `x, y, z`, and `fields` with one padded variable per field. The combined
//! file declares the dimensions `nx, ny, nz`, a coordinate variable for each
//! and one `f64` variable per field over all three.
//!
//! Requires the system netCDF library.

use crate::combine_error::CombineError;
use crate::field::{Axes, GlobalField};
use crate::io::json::list_rank_files;
use crate::io::{OUTPUT_DIMS, OutputSink, RankSource};
use crate::rank::RankId;
use crate::tile::TileMetadata;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Extension of rank files read by [`NetcdfRankSource`] by default.
pub const DEFAULT_RANK_EXTENSION: &str = "nc";

const GROUP_DIMS: &str = "dims";
const GROUP_FIELDS: &str = "fields";

/// Reads `*.nc` rank files from one directory.
#[derive(Clone, Debug)]
pub struct NetcdfRankSource {
    dir: PathBuf,
    extension: String,
}

impl NetcdfRankSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        NetcdfRankSource {
            dir: dir.into(),
            extension: DEFAULT_RANK_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn open(&self, rank: &RankId) -> Result<netcdf::File, CombineError> {
        netcdf::open(self.dir.join(rank.as_str()))
            .map_err(|e| CombineError::rank_read(rank, None, e))
    }
}

fn group<'f>(
    file: &'f netcdf::File,
    rank: &RankId,
    name: &str,
) -> Result<netcdf::Group<'f>, CombineError> {
    file.group(name)
        .map_err(|e| CombineError::rank_read(rank, None, e))?
        .ok_or_else(|| CombineError::rank_read(rank, None, format!("missing group `{name}`")))
}

fn read_vec<T>(group: &netcdf::Group<'_>, rank: &RankId, name: &str) -> Result<Vec<T>, CombineError>
where
    T: netcdf::NcTypeDescriptor + Copy,
{
    let var = group
        .variable(name)
        .ok_or_else(|| CombineError::rank_read(rank, None, format!("missing variable `{name}`")))?;
    var.get_values::<T, _>(..)
        .map_err(|e| CombineError::rank_read(rank, None, format!("`{name}`: {e}")))
}

fn read_scalar(group: &netcdf::Group<'_>, rank: &RankId, name: &str) -> Result<i64, CombineError> {
    read_vec::<i64>(group, rank, name)?
        .first()
        .copied()
        .ok_or_else(|| CombineError::rank_read(rank, None, format!("`{name}` is empty")))
}

impl RankSource for NetcdfRankSource {
    fn list_ranks(&self) -> Result<Vec<RankId>, CombineError> {
        list_rank_files(&self.dir, &self.extension)
    }

    fn read_metadata(&self, rank: &RankId) -> Result<TileMetadata, CombineError> {
        let file = self.open(rank)?;
        let dims = group(&file, rank, GROUP_DIMS)?;
        let get = |name: &str| read_scalar(&dims, rank, name);
        Ok(TileMetadata {
            n_0: get("n_0")?,
            n_1: get("n_1")?,
            n_2: get("n_2")?,
            nl_0: get("nl_0")?,
            nl_1: get("nl_1")?,
            nl_2: get("nl_2")?,
            ng: get("ng")?,
            indx_lo_0: get("indx_lo_0")?,
            indx_lo_1: get("indx_lo_1")?,
            indx_lo_2: get("indx_lo_2")?,
        })
    }

    fn read_axes(&self, rank: &RankId) -> Result<Axes, CombineError> {
        let file = self.open(rank)?;
        let dims = group(&file, rank, GROUP_DIMS)?;
        Ok(Axes::new(
            read_vec(&dims, rank, "x")?,
            read_vec(&dims, rank, "y")?,
            read_vec(&dims, rank, "z")?,
        ))
    }

    fn read_field(&self, rank: &RankId, name: &str) -> Result<Vec<f64>, CombineError> {
        let file = self.open(rank).map_err(|e| e.with_field(name))?;
        let fields = group(&file, rank, GROUP_FIELDS).map_err(|e| e.with_field(name))?;
        read_vec::<f64>(&fields, rank, name).map_err(|e| e.with_field(name))
    }

    fn list_field_names(&self, rank: &RankId) -> Result<Vec<String>, CombineError> {
        let file = self.open(rank)?;
        let fields = group(&file, rank, GROUP_FIELDS)?;
        let mut names: Vec<String> = fields.variables().map(|v| v.name()).collect();
        names.sort();
        Ok(names)
    }
}

/// Output sink writing combined netCDF files.
#[derive(Debug, Default)]
pub struct NetcdfSink {
    written: BTreeSet<(PathBuf, String)>,
}

impl NetcdfSink {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sink_err(field: Option<&str>) -> impl Fn(netcdf::Error) -> CombineError + '_ {
    move |e| CombineError::sink_write(field, e)
}

impl OutputSink for NetcdfSink {
    type Handle = PathBuf;

    fn create_if_absent(&mut self, target: &Path, axes: &Axes) -> Result<PathBuf, CombineError> {
        if target.exists() {
            let file = netcdf::open(target).map_err(sink_err(None))?;
            let shape: Vec<Option<usize>> = OUTPUT_DIMS
                .iter()
                .map(|d| file.dimension(d).map(|dim| dim.len()))
                .collect();
            let expected: Vec<Option<usize>> = axes.shape().iter().map(|&n| Some(n)).collect();
            if shape != expected {
                return Err(CombineError::sink_write(
                    None,
                    format!(
                        "existing container {} has dimensions {shape:?}, run needs {:?}",
                        target.display(),
                        axes.shape()
                    ),
                ));
            }
            log::info!("reusing output container {}", target.display());
            return Ok(target.to_path_buf());
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CombineError::sink_write(None, e))?;
        }
        let mut file = netcdf::create(target).map_err(sink_err(None))?;
        for (dim, coords) in OUTPUT_DIMS.iter().zip([&axes.x, &axes.y, &axes.z]) {
            file.add_dimension(dim, coords.len()).map_err(sink_err(None))?;
            let mut var = file.add_variable::<f64>(dim, &[dim]).map_err(sink_err(None))?;
            var.put_values(coords, ..).map_err(sink_err(None))?;
        }
        log::info!("created output container {}", target.display());
        Ok(target.to_path_buf())
    }

    fn write_field(
        &mut self,
        handle: &PathBuf,
        name: &str,
        field: GlobalField,
    ) -> Result<(), CombineError> {
        let key = (handle.clone(), name.to_string());
        if self.written.contains(&key) {
            return Err(CombineError::DuplicateField(name.to_string()));
        }
        let mut file = netcdf::append(handle).map_err(sink_err(Some(name)))?;
        if file.variable(name).is_none() {
            file.add_variable::<f64>(name, &OUTPUT_DIMS)
                .map_err(sink_err(Some(name)))?;
        }
        let mut var = file
            .variable_mut(name)
            .ok_or_else(|| {
                CombineError::sink_write(Some(name), "variable vanished after creation")
            })?;
        var.put_values(&field.to_row_major_vec(), ..)
            .map_err(sink_err(Some(name)))?;
        self.written.insert(key);
        Ok(())
    }
}
