//! CombineError: Unified error type for tile-combine public APIs
//!
//! Every fallible operation in the crate returns `Result<_, CombineError>`.
//! Variants carry the rank and/or field they concern so that a failed run
//! can be diagnosed from the message alone.

use crate::rank::RankId;
use crate::tile::Region;
use std::fmt;
use thiserror::Error;

/// Unified error type for tile combination.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CombineError {
    /// A rank's declared shape, offset or ghost width is inconsistent.
    #[error("malformed metadata in rank `{rank}`: {reason}")]
    MalformedMetadata { rank: RankId, reason: String },
    /// A rank disagrees with the run's established global shape.
    #[error("shape mismatch in rank `{rank}`: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        rank: RankId,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    /// A raw tile buffer does not match its padded local shape.
    #[error("buffer size mismatch in rank `{rank}`: expected {expected} values, found {found}")]
    BufferSizeMismatch {
        rank: RankId,
        expected: usize,
        found: usize,
    },
    /// Two tiles write the same global cells.
    #[error("tiles of ranks `{first}` and `{second}` overlap on {region}")]
    OverlappingTiles {
        first: RankId,
        second: RankId,
        region: Region,
    },
    /// Some global cells are written by no tile.
    #[error("incomplete coverage: {unwritten} cell(s) unwritten within {region}")]
    IncompleteCoverage { region: Region, unwritten: usize },
    /// The rank source failed to deliver metadata or data.
    #[error("failed to read rank `{rank}`{}: {reason}", field_suffix(.field))]
    RankReadFailure {
        rank: RankId,
        field: Option<String>,
        reason: String,
    },
    /// The output sink failed to persist a container or field.
    #[error("failed to write {}: {reason}", field_label(.field))]
    SinkWriteFailure {
        field: Option<String>,
        reason: String,
    },
    /// The same field was written twice into one output run.
    #[error("field `{0}` was already written to this output")]
    DuplicateField(String),
    /// A rank appeared twice in the rank list.
    #[error("rank `{0}` listed more than once")]
    DuplicateRank(RankId),
    /// No rank files were found.
    #[error("no rank files found in {0}")]
    NoRanks(String),
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// The run was cancelled before completion.
    #[error("combination cancelled")]
    Cancelled,
    /// One or more fields failed; the others may have been written.
    #[error("{} field(s) failed: {}", .0.len(), FailureList(.0))]
    FieldsFailed(Vec<FieldFailure>),
}

/// A failure attached to one field of a combination run.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFailure {
    pub field: String,
    pub error: CombineError,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field `{}`: {}", self.field, self.error)
    }
}

impl CombineError {
    /// Rank the error concerns, if any.
    pub fn rank(&self) -> Option<&RankId> {
        match self {
            CombineError::MalformedMetadata { rank, .. }
            | CombineError::ShapeMismatch { rank, .. }
            | CombineError::BufferSizeMismatch { rank, .. }
            | CombineError::RankReadFailure { rank, .. }
            | CombineError::DuplicateRank(rank) => Some(rank),
            CombineError::OverlappingTiles { second, .. } => Some(second),
            _ => None,
        }
    }

    /// Attach a field name to a rank read failure that lacks one.
    pub(crate) fn with_field(self, name: &str) -> Self {
        match self {
            CombineError::RankReadFailure {
                rank,
                field: None,
                reason,
            } => CombineError::RankReadFailure {
                rank,
                field: Some(name.to_string()),
                reason,
            },
            CombineError::SinkWriteFailure {
                field: None,
                reason,
            } => CombineError::SinkWriteFailure {
                field: Some(name.to_string()),
                reason,
            },
            other => other,
        }
    }

    pub(crate) fn rank_read(rank: &RankId, field: Option<&str>, reason: impl fmt::Display) -> Self {
        CombineError::RankReadFailure {
            rank: rank.clone(),
            field: field.map(str::to_string),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn sink_write(field: Option<&str>, reason: impl fmt::Display) -> Self {
        CombineError::SinkWriteFailure {
            field: field.map(str::to_string),
            reason: reason.to_string(),
        }
    }
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_deref()
        .map(|f| format!(" (field `{f}`)"))
        .unwrap_or_default()
}

fn field_label(field: &Option<String>) -> String {
    field
        .as_deref()
        .map(|f| format!("field `{f}`"))
        .unwrap_or_else(|| "output container".to_string())
}

struct FailureList<'a>(&'a [FieldFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}
