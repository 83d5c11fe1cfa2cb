// Aggregation registry: reductions applied per group during a group-by

use crate::data::{ColumnId, Value};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Aggregation {
    #[serde(rename = "sum")]
    Sum,
    #[serde(rename = "mean")]
    Mean,
    #[serde(rename = "nunique")]
    CountDistinct,
}

impl Aggregation {
    pub const ALL: [Aggregation; 3] = [Aggregation::Sum, Aggregation::Mean, Aggregation::CountDistinct];

    pub fn name(self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::CountDistinct => "nunique",
        }
    }

    /// Prefix composed onto a field's description (used in titles).
    pub fn description_prefix(self) -> &'static str {
        match self {
            Aggregation::Sum => "",
            Aggregation::Mean => "Average ",
            Aggregation::CountDistinct => "Unique ",
        }
    }

    /// Prefix composed onto a field's label (used on axes).
    pub fn label_prefix(self) -> &'static str {
        match self {
            Aggregation::Sum => "Number of ",
            Aggregation::Mean => "Avg. ",
            Aggregation::CountDistinct => "Unique ",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Aggregation::ALL
            .iter()
            .copied()
            .find(|agg| agg.name() == s)
            .ok_or_else(|| format!("unknown aggregation '{}'", s))
    }
}

/// Reduce one group's cells. Nulls are skipped, as a dataframe would.
pub fn aggregate(
    aggregation: Aggregation,
    column: &ColumnId,
    values: &[&Value],
) -> Result<Value, EngineError> {
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();

    match aggregation {
        Aggregation::Sum => {
            require_numeric(aggregation, column, &present)?;
            if present.iter().all(|v| v.as_i64().is_some()) {
                Ok(Value::Int(present.iter().filter_map(|v| v.as_i64()).sum()))
            } else {
                Ok(Value::Float(present.iter().filter_map(|v| v.as_f64()).sum()))
            }
        }
        Aggregation::Mean => {
            require_numeric(aggregation, column, &present)?;
            if present.is_empty() {
                return Ok(Value::Null);
            }
            let total: f64 = present.iter().filter_map(|v| v.as_f64()).sum();
            Ok(Value::Float(total / present.len() as f64))
        }
        Aggregation::CountDistinct => {
            let mut sorted = present;
            sorted.sort_by(|a, b| a.total_cmp(b));
            sorted.dedup_by(|a, b| a.total_cmp(*b) == Ordering::Equal);
            Ok(Value::Int(sorted.len() as i64))
        }
    }
}

fn require_numeric(
    aggregation: Aggregation,
    column: &ColumnId,
    values: &[&Value],
) -> Result<(), EngineError> {
    if values.iter().all(|v| v.is_numeric()) {
        Ok(())
    } else {
        Err(EngineError::NonNumericAggregation {
            column: column.clone(),
            aggregation,
        })
    }
}
