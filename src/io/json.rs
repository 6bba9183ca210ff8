//! JSON rank files and JSON output containers.
//!
//! A rank file mirrors the group layout the simulation writes:
//!
//! ```json
//! {
//!   "dims":   { "n_0": 8, "n_1": 4, "n_2": 4,
//!               "nl_0": 4, "nl_1": 4, "nl_2": 4, "ng": 1,
//!               "indx_lo_0": 0, "indx_lo_1": 0, "indx_lo_2": 0,
//!               "x": [..], "y": [..], "z": [..] },
//!   "fields": { "temperature": [ .. padded, row-major .. ] }
//! }
//! ```
//!
//! The output container holds the dimensions `nx, ny, nz`, one coordinate
//! variable per dimension and one `(nx, ny, nz)` variable per field.
//! Containers are rewritten through a temporary file and a rename, so a
//! reader never sees a half-written field.
//!
//! This is a fixture-scale format. [`JsonRankSource`] parses a rank file's
//! text once per request and skips other fields as unparsed [`RawValue`]s,
//! and [`JsonSink`] keeps each open container in memory and rewrites the
//! whole file per field. Production-size runs use the netCDF backend.

use crate::combine_error::CombineError;
use crate::field::{Axes, GlobalField};
use crate::io::{OUTPUT_DIMS, OutputSink, RankSource};
use crate::rank::RankId;
use crate::tile::{TileDescriptor, TileMetadata};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of rank files read by [`JsonRankSource`] by default.
pub const DEFAULT_RANK_EXTENSION: &str = "json";

/// The `dims` group of a rank file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DimsGroup {
    #[serde(flatten)]
    pub tile: TileMetadata,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

/// A complete rank file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RankFile {
    pub dims: DimsGroup,
    pub fields: BTreeMap<String, Vec<f64>>,
}

impl RankFile {
    /// Rank file without fields.
    pub fn new(descriptor: &TileDescriptor, axes: &Axes) -> Self {
        RankFile {
            dims: DimsGroup {
                tile: TileMetadata::from_descriptor(descriptor),
                x: axes.x.clone(),
                y: axes.y.clone(),
                z: axes.z.clone(),
            },
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, raw: Vec<f64>) -> Self {
        self.fields.insert(name.into(), raw);
        self
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), CombineError> {
        let path = path.as_ref();
        let bytes =
            serde_json::to_vec(self).map_err(|e| CombineError::sink_write(None, e))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CombineError::sink_write(None, e))?;
        }
        fs::write(path, bytes).map_err(|e| CombineError::sink_write(None, e))
    }
}

#[derive(Deserialize)]
struct DimsOnly {
    dims: DimsGroup,
}

#[derive(Deserialize)]
struct FieldsRaw {
    fields: BTreeMap<String, Box<RawValue>>,
}

/// Reads rank files from one directory.
#[derive(Clone, Debug)]
pub struct JsonRankSource {
    dir: PathBuf,
    extension: String,
}

impl JsonRankSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonRankSource {
            dir: dir.into(),
            extension: DEFAULT_RANK_EXTENSION.to_string(),
        }
    }

    /// Only files ending in `.{extension}` are treated as ranks.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, rank: &RankId) -> PathBuf {
        self.dir.join(rank.as_str())
    }

    fn read_text(&self, rank: &RankId) -> Result<String, CombineError> {
        fs::read_to_string(self.path_of(rank)).map_err(|e| CombineError::rank_read(rank, None, e))
    }

    fn dims(&self, rank: &RankId) -> Result<DimsGroup, CombineError> {
        let text = self.read_text(rank)?;
        serde_json::from_str::<DimsOnly>(&text)
            .map(|d| d.dims)
            .map_err(|e| CombineError::rank_read(rank, None, e))
    }

    fn raw_fields(&self, rank: &RankId) -> Result<BTreeMap<String, Box<RawValue>>, CombineError> {
        let text = self.read_text(rank)?;
        serde_json::from_str::<FieldsRaw>(&text)
            .map(|f| f.fields)
            .map_err(|e| CombineError::rank_read(rank, None, e))
    }
}

impl RankSource for JsonRankSource {
    fn list_ranks(&self) -> Result<Vec<RankId>, CombineError> {
        list_rank_files(&self.dir, &self.extension)
    }

    fn read_metadata(&self, rank: &RankId) -> Result<TileMetadata, CombineError> {
        Ok(self.dims(rank)?.tile)
    }

    fn read_axes(&self, rank: &RankId) -> Result<Axes, CombineError> {
        let dims = self.dims(rank)?;
        Ok(Axes::new(dims.x, dims.y, dims.z))
    }

    fn read_field(&self, rank: &RankId, name: &str) -> Result<Vec<f64>, CombineError> {
        let fields = self.raw_fields(rank).map_err(|e| e.with_field(name))?;
        let raw = fields
            .get(name)
            .ok_or_else(|| CombineError::rank_read(rank, Some(name), "field not present"))?;
        serde_json::from_str(raw.get()).map_err(|e| CombineError::rank_read(rank, Some(name), e))
    }

    fn list_field_names(&self, rank: &RankId) -> Result<Vec<String>, CombineError> {
        Ok(self.raw_fields(rank)?.into_keys().collect())
    }
}

/// Sorted rank file names in `dir` carrying `extension`.
///
/// Shared by the file-based sources.
pub(crate) fn list_rank_files(dir: &Path, extension: &str) -> Result<Vec<RankId>, CombineError> {
    let dir_rank = || RankId::new(dir.display().to_string());
    let suffix = format!(".{extension}");
    let mut ranks = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| CombineError::rank_read(&dir_rank(), None, e))? {
        let entry = entry.map_err(|e| CombineError::rank_read(&dir_rank(), None, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file && name.ends_with(&suffix) && !name.starts_with('.') {
            ranks.push(RankId::new(name));
        } else {
            log::debug!("skipping {} (not a .{extension} rank file)", name);
        }
    }
    if ranks.is_empty() {
        return Err(CombineError::NoRanks(dir.display().to_string()));
    }
    ranks.sort();
    Ok(ranks)
}

/// One variable of a [`JsonContainer`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonVariable {
    pub dimensions: Vec<String>,
    pub values: Vec<f64>,
}

/// The combined output container.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonContainer {
    pub dimensions: BTreeMap<String, usize>,
    pub variables: BTreeMap<String, JsonVariable>,
}

impl JsonContainer {
    /// Container holding only the dimensions and coordinate variables.
    pub fn with_axes(axes: &Axes) -> Self {
        let mut container = JsonContainer::default();
        for (dim, coords) in OUTPUT_DIMS.iter().zip([&axes.x, &axes.y, &axes.z]) {
            container.dimensions.insert(dim.to_string(), coords.len());
            container.variables.insert(
                dim.to_string(),
                JsonVariable {
                    dimensions: vec![dim.to_string()],
                    values: coords.clone(),
                },
            );
        }
        container
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, CombineError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| CombineError::sink_write(None, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CombineError::sink_write(None, format!("{}: {e}", path.display())))
    }

    /// Write through a sibling temporary file, then rename over `path`.
    fn save(&self, path: &Path) -> Result<(), CombineError> {
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec(self).map_err(|e| CombineError::sink_write(None, e))?;
        fs::write(&tmp, bytes).map_err(|e| CombineError::sink_write(None, e))?;
        fs::rename(&tmp, path).map_err(|e| CombineError::sink_write(None, e))
    }

    /// Grid shape declared by the container's dimensions.
    pub fn shape(&self) -> Option<[usize; 3]> {
        let mut shape = [0; 3];
        for (a, dim) in OUTPUT_DIMS.iter().enumerate() {
            shape[a] = *self.dimensions.get(*dim)?;
        }
        Some(shape)
    }

    pub fn axes(&self) -> Option<Axes> {
        let coords = |dim: &str| self.variables.get(dim).map(|v| v.values.clone());
        Some(Axes::new(coords("nx")?, coords("ny")?, coords("nz")?))
    }

    /// Names of all non-coordinate variables.
    pub fn field_names(&self) -> Vec<String> {
        self.variables
            .keys()
            .filter(|k| !OUTPUT_DIMS.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    /// Read a field back as a global array.
    pub fn field(&self, name: &str) -> Result<GlobalField, CombineError> {
        let var = self
            .variables
            .get(name)
            .ok_or_else(|| CombineError::sink_write(Some(name), "no such variable"))?;
        let shape = self
            .shape()
            .ok_or_else(|| CombineError::sink_write(Some(name), "container lacks dimensions"))?;
        GlobalField::from_shape_vec(shape, var.values.clone()).map_err(|e| e.with_field(name))
    }
}

/// Output sink writing [`JsonContainer`] files.
///
/// Containers opened or created by the sink stay cached, so a field write
/// serializes the container without reading it back from disk.
#[derive(Debug, Default)]
pub struct JsonSink {
    open: BTreeMap<PathBuf, JsonContainer>,
    written: BTreeSet<(PathBuf, String)>,
}

impl JsonSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for JsonSink {
    type Handle = PathBuf;

    fn create_if_absent(&mut self, target: &Path, axes: &Axes) -> Result<PathBuf, CombineError> {
        if target.exists() {
            let existing = JsonContainer::open(target)?;
            if existing.shape() != Some(axes.shape()) {
                return Err(CombineError::sink_write(
                    None,
                    format!(
                        "existing container {} has shape {:?}, run needs {:?}",
                        target.display(),
                        existing.shape(),
                        axes.shape()
                    ),
                ));
            }
            log::info!("reusing output container {}", target.display());
            self.open.insert(target.to_path_buf(), existing);
            return Ok(target.to_path_buf());
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| CombineError::sink_write(None, e))?;
        }
        let container = JsonContainer::with_axes(axes);
        container.save(target)?;
        log::info!("created output container {}", target.display());
        self.open.insert(target.to_path_buf(), container);
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
        let container = self.open.get_mut(handle).ok_or_else(|| {
            CombineError::sink_write(Some(name), format!("{} is not open", handle.display()))
        })?;
        if container.shape() != Some(field.shape()) {
            return Err(CombineError::sink_write(
                Some(name),
                format!(
                    "field shape {:?} does not match container {:?}",
                    field.shape(),
                    container.shape()
                ),
            ));
        }
        let previous = container.variables.insert(
            name.to_string(),
            JsonVariable {
                dimensions: OUTPUT_DIMS.iter().map(|d| d.to_string()).collect(),
                values: field.to_row_major_vec(),
            },
        );
        if let Err(e) = container.save(handle) {
            match previous {
                Some(old) => container.variables.insert(name.to_string(), old),
                None => container.variables.remove(name),
            };
            return Err(e.with_field(name));
        }
        self.written.insert(key);
        Ok(())
    }
}
