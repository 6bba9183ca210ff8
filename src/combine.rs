//! FieldCombiner: per-field assembly across all ranks of a run.
//!
//! # Steps
//! 1. Read axes and global shape from the first rank (in ascending
//!    [`RankId`] order) and create or reuse the output container.
//! 2. Discover field names from the first rank.
//! 3. Read every rank's tile metadata once and validate the decomposition
//!    into a [`TilePlan`]. A bad decomposition fails every field alike, so
//!    it aborts the run.
//! 4. For each field, stream the rank buffers into the global array (one
//!    batch of ranks in memory at a time) and hand it to the sink.
//!
//! Fields are independent: a failure while reading or assembling one field
//! is recorded in the [`CombineReport`] and the next field is attempted.
//! The sink sits behind a mutex, so writes are serialized even when fields
//! are assembled concurrently.

use crate::assemble::{GridAssembler, PlannedTile, TilePlan};
use crate::cancel::CancellationToken;
use crate::combine_error::{CombineError, FieldFailure};
use crate::config::CombineConfig;
use crate::field::GlobalField;
use crate::io::{OutputSink, RankSource};
use crate::rank::RankId;
use crate::tile::Shape3;
use itertools::Itertools;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Outcome of a combination run.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineReport {
    /// Output container that received the fields.
    pub target: PathBuf,
    /// Number of ranks combined.
    pub ranks: usize,
    pub global_shape: Shape3,
    /// Fields written successfully, in sorted order.
    pub written: Vec<String>,
    /// Fields that failed, in sorted order.
    pub failures: Vec<FieldFailure>,
}

impl CombineReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Err(FieldsFailed)` if any field failed.
    pub fn into_result(self) -> Result<Self, CombineError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(CombineError::FieldsFailed(self.failures))
        }
    }
}

/// Drives assembly for every field of a run.
pub struct FieldCombiner<S, O> {
    source: S,
    sink: Mutex<O>,
    config: CombineConfig,
    cancel: CancellationToken,
}

impl<S, O> FieldCombiner<S, O>
where
    S: RankSource,
    O: OutputSink,
{
    pub fn new(source: S, sink: O, config: CombineConfig) -> Self {
        FieldCombiner {
            source,
            sink: Mutex::new(sink),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally controlled cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &CombineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_parts(self) -> (S, O) {
        (self.source, self.sink.into_inner())
    }

    /// Combine every rank of the source into `out_dir/<output_name>`.
    pub fn combine(&self, out_dir: &Path) -> Result<CombineReport, CombineError> {
        let ranks = self.source.list_ranks()?;
        self.combine_ranks(&ranks, &out_dir.join(&self.config.output_name))
    }

    /// Combine the given ranks into the container at `target`.
    ///
    /// # Errors
    /// Run-level failures: empty or duplicate rank list, an unreadable first
    /// rank, axes that disagree with the global shape, container creation,
    /// an invalid decomposition, cancellation. Per-field failures are
    /// returned inside the report.
    pub fn combine_ranks(
        &self,
        ranks: &[RankId],
        target: &Path,
    ) -> Result<CombineReport, CombineError> {
        self.config.validate()?;
        let ranks: Vec<RankId> = ranks.iter().cloned().sorted().collect();
        if let Some(dup) = ranks.iter().duplicates().next() {
            return Err(CombineError::DuplicateRank(dup.clone()));
        }
        let first = ranks
            .first()
            .ok_or_else(|| CombineError::NoRanks(target.display().to_string()))?;
        self.check_cancelled()?;

        let first_tile = self.source.read_descriptor(first)?;
        let global_shape = first_tile.global_shape();
        let axes = self.source.read_axes(first)?;
        axes.check_shape(first, global_shape)?;
        log::info!(
            "combining {} rank(s) into {} (global shape {:?})",
            ranks.len(),
            target.display(),
            global_shape
        );
        let handle = self.sink.lock().create_if_absent(target, &axes)?;

        let (fields, mut failures) = self.select_fields(first)?;
        let plan = self.plan(&ranks, global_shape)?;

        let outcomes = self.run_fields(&plan, &handle, &fields);
        self.check_cancelled()?;

        let mut written = Vec::new();
        for (name, outcome) in fields.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => written.push(name),
                Err(error) => failures.push(FieldFailure { field: name, error }),
            }
        }
        failures.sort_by(|a, b| a.field.cmp(&b.field));
        for failure in &failures {
            log::error!("{failure}");
        }
        log::info!(
            "wrote {} field(s), {} failed",
            written.len(),
            failures.len()
        );

        Ok(CombineReport {
            target: target.to_path_buf(),
            ranks: ranks.len(),
            global_shape,
            written,
            failures,
        })
    }

    /// Sorted field names to process, and failures for filtered names the
    /// first rank does not have.
    fn select_fields(
        &self,
        first: &RankId,
    ) -> Result<(Vec<String>, Vec<FieldFailure>), CombineError> {
        let available: Vec<String> = self
            .source
            .list_field_names(first)?
            .into_iter()
            .sorted()
            .dedup()
            .collect();
        let Some(wanted) = &self.config.fields else {
            return Ok((available, Vec::new()));
        };
        let mut selected = Vec::new();
        let mut missing = Vec::new();
        for name in wanted.iter().sorted().dedup() {
            if available.binary_search(name).is_ok() {
                selected.push(name.clone());
            } else {
                missing.push(FieldFailure {
                    field: name.clone(),
                    error: CombineError::rank_read(first, Some(name.as_str()), "field not present"),
                });
            }
        }
        Ok((selected, missing))
    }

    /// Read every rank's descriptor and validate the decomposition.
    fn plan(&self, ranks: &[RankId], global_shape: Shape3) -> Result<TilePlan, CombineError> {
        let mut tiles = Vec::with_capacity(ranks.len());
        for rank in ranks {
            self.check_cancelled()?;
            let descriptor = self.source.read_descriptor(rank)?;
            log::debug!(
                "rank `{rank}`: local {:?} at {:?}, ghost width {}",
                descriptor.local_shape(),
                descriptor.global_offset(),
                descriptor.ghost_width()
            );
            tiles.push((rank.clone(), descriptor));
        }
        TilePlan::new(global_shape, tiles)
    }

    fn run_fields(
        &self,
        plan: &TilePlan,
        handle: &O::Handle,
        fields: &[String],
    ) -> Vec<Result<(), CombineError>> {
        #[cfg(feature = "rayon")]
        if self.config.parallel_fields {
            return fields
                .par_iter()
                .map(|name| self.combine_field(plan, handle, name))
                .collect();
        }
        let mut outcomes = Vec::with_capacity(fields.len());
        for name in fields {
            if self.cancel.is_cancelled() {
                break;
            }
            outcomes.push(self.combine_field(plan, handle, name));
        }
        outcomes
    }

    /// Read, assemble and write one field.
    fn combine_field(
        &self,
        plan: &TilePlan,
        handle: &O::Handle,
        name: &str,
    ) -> Result<(), CombineError> {
        self.check_cancelled()?;
        let field = self.assemble_field(plan, name)?;
        self.sink
            .lock()
            .write_field(handle, name, field)
            .map_err(|e| e.with_field(name))?;
        log::info!("wrote field `{name}`");
        Ok(())
    }

    /// Stream the ranks' buffers of `name` into one global field.
    ///
    /// Ranks are read in batches of [`read_batch`](Self::read_batch) and each
    /// batch is copied before the next is read, so at most one batch of
    /// padded tiles is held next to the global array. The first failing rank
    /// in plan order is reported, also when a batch is read concurrently.
    fn assemble_field(&self, plan: &TilePlan, name: &str) -> Result<GlobalField, CombineError> {
        let mut fold = GridAssembler::new(plan)
            .with_parallel_copy(self.config.parallel_copy)
            .begin();
        for batch in plan.tiles().chunks(self.read_batch()) {
            for raw in self.read_batch_buffers(batch, name)? {
                fold.push(&raw)?;
            }
        }
        fold.finish()
    }

    /// Number of ranks read together before their interiors are copied.
    fn read_batch(&self) -> usize {
        #[cfg(feature = "rayon")]
        if self.config.parallel_reads {
            return rayon::current_num_threads().max(1);
        }
        1
    }

    fn read_batch_buffers(
        &self,
        batch: &[PlannedTile],
        name: &str,
    ) -> Result<Vec<Vec<f64>>, CombineError> {
        let read = |tile: &PlannedTile| -> Result<Vec<f64>, CombineError> {
            self.check_cancelled()?;
            self.source
                .read_field(&tile.rank, name)
                .map_err(|e| e.with_field(name))
        };

        #[cfg(feature = "rayon")]
        if batch.len() > 1 {
            let results: Vec<Result<Vec<f64>, CombineError>> = batch.par_iter().map(read).collect();
            return results.into_iter().collect();
        }
        batch.iter().map(read).collect()
    }

    fn check_cancelled(&self) -> Result<(), CombineError> {
        if self.cancel.is_cancelled() {
            Err(CombineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
