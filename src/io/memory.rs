//! In-process rank source and output sink.

use crate::combine_error::CombineError;
use crate::decompose::{GhostFill, pad_tile};
use crate::field::{Axes, GlobalField};
use crate::io::{OutputSink, RankSource};
use crate::rank::RankId;
use crate::tile::{TileDescriptor, TileMetadata};
use ndarray::ArrayView3;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Everything a rank file holds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryRank {
    pub metadata: TileMetadata,
    pub axes: Axes,
    pub fields: BTreeMap<String, Vec<f64>>,
}

/// Rank source backed by a map of [`MemoryRank`]s.
#[derive(Clone, Debug, Default)]
pub struct MemoryRankSource {
    ranks: BTreeMap<RankId, MemoryRank>,
}

impl MemoryRankSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a rank.
    pub fn insert(&mut self, rank: RankId, data: MemoryRank) {
        self.ranks.insert(rank, data);
    }

    /// Mutable access, e.g. to corrupt a rank in tests.
    pub fn rank_mut(&mut self, rank: &RankId) -> Option<&mut MemoryRank> {
        self.ranks.get_mut(rank)
    }

    /// Cut named global fields into the given tiles.
    ///
    /// # Errors
    /// `ShapeMismatch` if a field does not have the tiles' global shape.
    pub fn from_global_fields<'a, I>(
        tiles: &[(RankId, TileDescriptor)],
        axes: &Axes,
        fields: I,
        fill: GhostFill,
    ) -> Result<Self, CombineError>
    where
        I: IntoIterator<Item = (&'a str, ArrayView3<'a, f64>)>,
    {
        let fields: Vec<(&str, ArrayView3<'_, f64>)> = fields.into_iter().collect();
        let mut source = MemoryRankSource::new();
        for (rank, descriptor) in tiles {
            let mut data = MemoryRank {
                metadata: TileMetadata::from_descriptor(descriptor),
                axes: axes.clone(),
                fields: BTreeMap::new(),
            };
            for (name, global) in &fields {
                let raw = pad_tile(rank, global.view(), descriptor, fill)?;
                data.fields.insert(name.to_string(), raw);
            }
            source.insert(rank.clone(), data);
        }
        Ok(source)
    }

    fn get(&self, rank: &RankId) -> Result<&MemoryRank, CombineError> {
        self.ranks
            .get(rank)
            .ok_or_else(|| CombineError::rank_read(rank, None, "no such rank"))
    }
}

impl RankSource for MemoryRankSource {
    fn list_ranks(&self) -> Result<Vec<RankId>, CombineError> {
        Ok(self.ranks.keys().cloned().collect())
    }

    fn read_metadata(&self, rank: &RankId) -> Result<TileMetadata, CombineError> {
        Ok(self.get(rank)?.metadata.clone())
    }

    fn read_axes(&self, rank: &RankId) -> Result<Axes, CombineError> {
        Ok(self.get(rank)?.axes.clone())
    }

    fn read_field(&self, rank: &RankId, name: &str) -> Result<Vec<f64>, CombineError> {
        self.get(rank)?
            .fields
            .get(name)
            .cloned()
            .ok_or_else(|| CombineError::rank_read(rank, Some(name), "field not present"))
    }

    fn list_field_names(&self, rank: &RankId) -> Result<Vec<String>, CombineError> {
        Ok(self.get(rank)?.fields.keys().cloned().collect())
    }
}

/// One container held by a [`MemorySink`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryContainer {
    pub axes: Axes,
    pub fields: BTreeMap<String, GlobalField>,
}

/// Output sink that keeps containers in memory, keyed by target path.
#[derive(Debug, Default)]
pub struct MemorySink {
    containers: BTreeMap<PathBuf, MemoryContainer>,
    written: BTreeSet<(PathBuf, String)>,
    creates: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(&self, target: &Path) -> Option<&MemoryContainer> {
        self.containers.get(target)
    }

    /// Number of containers actually created (not reused).
    pub fn creates(&self) -> usize {
        self.creates
    }
}

impl OutputSink for MemorySink {
    type Handle = PathBuf;

    fn create_if_absent(&mut self, target: &Path, axes: &Axes) -> Result<PathBuf, CombineError> {
        if let Some(existing) = self.containers.get(target) {
            if existing.axes.shape() != axes.shape() {
                return Err(CombineError::sink_write(
                    None,
                    format!(
                        "existing container {} has shape {:?}, run needs {:?}",
                        target.display(),
                        existing.axes.shape(),
                        axes.shape()
                    ),
                ));
            }
        } else {
            self.containers.insert(
                target.to_path_buf(),
                MemoryContainer {
                    axes: axes.clone(),
                    fields: BTreeMap::new(),
                },
            );
            self.creates += 1;
        }
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
        let container = self
            .containers
            .get_mut(handle)
            .ok_or_else(|| CombineError::sink_write(Some(name), "container was never created"))?;
        if field.shape() != container.axes.shape() {
            return Err(CombineError::sink_write(
                Some(name),
                format!(
                    "field shape {:?} does not match container {:?}",
                    field.shape(),
                    container.axes.shape()
                ),
            ));
        }
        container.fields.insert(name.to_string(), field);
        self.written.insert(key);
        Ok(())
    }
}
