//! Error types for the transform engine.
//!
//! Every failure is raised synchronously at the point of misuse and is
//! meant to be surfaced to the caller, never retried. [`EngineError::kind`]
//! sorts variants into the three buckets callers branch on.

use crate::aggregation::Aggregation;
use crate::data::ColumnId;
use crate::field::Field;
use crate::filter::Operator;
use thiserror::Error;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested shape of the data or chart is contradictory or incomplete.
    Configuration,
    /// An operation ran in the wrong state (e.g. building a chart twice).
    Sequencing,
    /// The catalog has no implementation for the requested operation.
    Unsupported,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("expected exactly one grouping field, found {}: {:?}", .candidates.len(), .candidates)]
    AmbiguousGroupingKey { candidates: Vec<Field> },

    #[error("field `{0}` is not present in the source table")]
    MissingSourceColumn(Field),

    #[error("column `{0}` is not present in the working table")]
    UnknownColumn(ColumnId),

    #[error("column `{0}` already exists")]
    DuplicateColumn(ColumnId),

    #[error("column `{column}` has {found} rows, table has {expected}")]
    RaggedColumn {
        column: ColumnId,
        expected: usize,
        found: usize,
    },

    #[error("column `{column}` holds a value that is not a {expected}")]
    UnexpectedType {
        column: ColumnId,
        expected: &'static str,
    },

    #[error("`{0}` is reserved for a catalog field and cannot name a derived column")]
    ReservedColumnName(String),

    #[error("field `{0}` is aggregated but was never selected")]
    InactiveField(Field),

    #[error("value counts need exactly one selected field, found {0}")]
    ValueCountsArity(usize),

    #[error("invalid field `{field}` for reaction counts (reaction `{reaction}`)")]
    InvalidDerivation { field: Field, reaction: String },

    #[error("operator `{operator}` is not available for `{field}` filters")]
    InvalidOperator { field: Field, operator: Operator },

    #[error("cannot use `{value}` as a {expected} for `{field}` filters")]
    InvalidFilterValue {
        field: Field,
        value: String,
        expected: &'static str,
    },

    #[error("cannot compare `{left}` with `{right}`")]
    Incomparable { left: String, right: String },

    #[error("a chart needs at least two columns, found {0}")]
    NotEnoughColumns(usize),

    #[error("invalid axis combination: {0}")]
    InvalidAxes(String),

    #[error("moving average window must be at least {min}, got {window}")]
    InvalidWindow { window: usize, min: usize },

    #[error("chart has already been built")]
    ChartAlreadyBuilt,

    #[error("chart has not been built yet")]
    ChartNotBuilt,

    #[error("`{aggregation}` is not supported for `{field}`")]
    UnsupportedAggregation {
        field: Field,
        aggregation: Aggregation,
    },

    #[error("`{aggregation}` needs numeric values, column `{column}` is not numeric")]
    NonNumericAggregation {
        column: ColumnId,
        aggregation: Aggregation,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ChartAlreadyBuilt | EngineError::ChartNotBuilt => ErrorKind::Sequencing,
            EngineError::UnsupportedAggregation { .. }
            | EngineError::NonNumericAggregation { .. } => ErrorKind::Unsupported,
            _ => ErrorKind::Configuration,
        }
    }
}
