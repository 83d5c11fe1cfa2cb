// Filter operators and the filter catalog (allowed operators and value coercion per field)

use crate::data::Value;
use crate::error::EngineError;
use crate::field::Field;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Leq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Geq,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "before")]
    Before,
    #[serde(rename = "during")]
    During,
    #[serde(rename = "after")]
    After,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::Lt,
        Operator::Leq,
        Operator::Gt,
        Operator::Geq,
        Operator::Eq,
        Operator::Before,
        Operator::During,
        Operator::After,
        Operator::In,
        Operator::NotIn,
    ];

    /// Machine form, as accepted by the DSL and serde.
    pub fn token(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Leq => "<=",
            Operator::Gt => ">",
            Operator::Geq => ">=",
            Operator::Eq => "=",
            Operator::Before => "before",
            Operator::During => "during",
            Operator::After => "after",
            Operator::In => "in",
            Operator::NotIn => "not in",
        }
    }

    /// Human form, as rendered into chart titles.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Leq => "≤",
            Operator::Gt => ">",
            Operator::Geq => "≥",
            Operator::Eq => "=",
            Operator::Before => "before",
            Operator::During => "during",
            Operator::After => "after",
            Operator::In => "∈",
            Operator::NotIn => "∉",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.token() == s)
            .ok_or_else(|| format!("unknown operator '{}'", s))
    }
}

/// Right-hand side of a filter: one value, or a set for membership tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    List(Vec<Value>),
    Scalar(Value),
}

impl FilterValue {
    /// Blank form input: null, an empty string or an empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::List(items) => items.is_empty(),
            FilterValue::Scalar(Value::Null) => true,
            FilterValue::Scalar(Value::Str(s)) => s.trim().is_empty(),
            FilterValue::Scalar(_) => false,
        }
    }

    fn items(&self) -> &[Value] {
        match self {
            FilterValue::List(items) => items,
            FilterValue::Scalar(value) => std::slice::from_ref(value),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Scalar(value) => write!(f, "{}", value),
            FilterValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for FilterValue {
            fn from(value: $ty) -> Self {
                FilterValue::Scalar(value.into())
            }
        })*
    };
}

scalar_from!(i64, f64, &str, String, NaiveDate, Value);

impl<T: Into<Value>> From<Vec<T>> for FilterValue {
    fn from(items: Vec<T>) -> Self {
        FilterValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Evaluate `cell <operator> value` for one row.
///
/// Nulls never satisfy a comparison. Ordering a value against one of a
/// different family (a name against a number) is a configuration error.
pub fn matches(operator: Operator, cell: &Value, value: &FilterValue) -> Result<bool, EngineError> {
    let accept: fn(Ordering) -> bool = match operator {
        Operator::In => return Ok(contains(value, cell)),
        Operator::NotIn => return Ok(!contains(value, cell)),
        Operator::Lt | Operator::Before => |o| o == Ordering::Less,
        Operator::Leq => |o| o != Ordering::Greater,
        Operator::Gt | Operator::After => |o| o == Ordering::Greater,
        Operator::Geq => |o| o != Ordering::Less,
        Operator::Eq | Operator::During => |o| o == Ordering::Equal,
    };

    let FilterValue::Scalar(rhs) = value else {
        return Err(EngineError::Incomparable {
            left: cell.to_string(),
            right: value.to_string(),
        });
    };

    if cell.is_null() || rhs.is_null() {
        return Ok(false);
    }

    let ordering = match cell.compare(rhs) {
        Some(ordering) => ordering,
        None if matches!(operator, Operator::Eq | Operator::During) => return Ok(false),
        None => {
            return Err(EngineError::Incomparable {
                left: cell.to_string(),
                right: rhs.to_string(),
            })
        }
    };

    Ok(accept(ordering))
}

fn contains(value: &FilterValue, cell: &Value) -> bool {
    value
        .items()
        .iter()
        .any(|item| cell.compare(item) == Some(Ordering::Equal))
}

/// Fields a caller can filter on through the form, each with its own
/// operator set and value coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Date,
    Author,
    ChannelName,
    Hour,
    ReactionCount,
}

const STANDARD_OPERATORS: &[Operator] = &[
    Operator::Lt,
    Operator::Leq,
    Operator::Gt,
    Operator::Geq,
    Operator::Eq,
];
const TEMPORAL_OPERATORS: &[Operator] = &[Operator::Before, Operator::During, Operator::After];
const MEMBERSHIP_OPERATORS: &[Operator] = &[Operator::In, Operator::NotIn];

impl FilterKind {
    pub const ALL: [FilterKind; 5] = [
        FilterKind::Date,
        FilterKind::Author,
        FilterKind::ChannelName,
        FilterKind::Hour,
        FilterKind::ReactionCount,
    ];

    pub fn for_field(field: Field) -> Option<Self> {
        FilterKind::ALL.iter().copied().find(|kind| kind.field() == field)
    }

    pub fn field(self) -> Field {
        match self {
            FilterKind::Date => Field::Date,
            FilterKind::Author => Field::Author,
            FilterKind::ChannelName => Field::ChannelName,
            FilterKind::Hour => Field::Hour,
            FilterKind::ReactionCount => Field::ReactionCount,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FilterKind::Date => "Date",
            FilterKind::Author => "Author",
            FilterKind::ChannelName => "Channel Name",
            FilterKind::Hour => "Hour",
            FilterKind::ReactionCount => "Reaction Count",
        }
    }

    pub fn operators(self) -> &'static [Operator] {
        match self {
            FilterKind::Date => TEMPORAL_OPERATORS,
            FilterKind::Author | FilterKind::ChannelName => MEMBERSHIP_OPERATORS,
            FilterKind::Hour | FilterKind::ReactionCount => STANDARD_OPERATORS,
        }
    }

    pub fn default_operator(self) -> Operator {
        match self {
            FilterKind::Date => Operator::Before,
            FilterKind::Author | FilterKind::ChannelName => Operator::In,
            FilterKind::Hour | FilterKind::ReactionCount => Operator::Geq,
        }
    }

    /// Coerce a raw value into the type the table holds for this field.
    pub fn post_process(self, value: FilterValue) -> Result<FilterValue, EngineError> {
        match self {
            FilterKind::Date => map_items(value, |v| self.to_date(v)),
            FilterKind::Hour | FilterKind::ReactionCount => map_items(value, |v| self.to_integer(v)),
            FilterKind::Author | FilterKind::ChannelName => {
                let items = match value {
                    FilterValue::Scalar(v) => vec![v],
                    FilterValue::List(items) => items,
                };
                let items = items
                    .into_iter()
                    .map(|v| match v {
                        Value::Str(_) => Ok(v),
                        other => Err(self.invalid(&other, "name")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FilterValue::List(items))
            }
        }
    }

    fn to_date(self, value: Value) -> Result<Value, EngineError> {
        match value {
            Value::Date(_) => Ok(value),
            Value::Timestamp(ts) => Ok(Value::Date(ts.date_naive())),
            Value::Str(ref s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .or_else(|_| DateTime::parse_from_rfc3339(s.trim()).map(|ts| ts.date_naive()))
                .map(Value::Date)
                .map_err(|_| self.invalid(&value, "date")),
            other => Err(self.invalid(&other, "date")),
        }
    }

    fn to_integer(self, value: Value) -> Result<Value, EngineError> {
        match value {
            Value::Int(_) => Ok(value),
            Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
            Value::Str(ref s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.invalid(&value, "whole number")),
            other => Err(self.invalid(&other, "whole number")),
        }
    }

    fn invalid(self, value: &Value, expected: &'static str) -> EngineError {
        EngineError::InvalidFilterValue {
            field: self.field(),
            value: value.to_string(),
            expected,
        }
    }
}

fn map_items(
    value: FilterValue,
    mut convert: impl FnMut(Value) -> Result<Value, EngineError>,
) -> Result<FilterValue, EngineError> {
    match value {
        FilterValue::Scalar(v) => Ok(FilterValue::Scalar(convert(v)?)),
        FilterValue::List(items) => Ok(FilterValue::List(
            items.into_iter().map(convert).collect::<Result<_, _>>()?,
        )),
    }
}

/// A (field, operator, value) filter as configured by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub field: Field,
    pub operator: Operator,
    pub value: FilterValue,
}

impl FilterGroup {
    pub fn new(field: Field, operator: Operator, value: impl Into<FilterValue>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
        }
    }

    /// Validate the operator and coerce the value through the filter catalog.
    /// Fields outside the catalog pass through unchanged.
    pub fn post_process(self) -> Result<Self, EngineError> {
        let Some(kind) = FilterKind::for_field(self.field) else {
            return Ok(self);
        };
        if !kind.operators().contains(&self.operator) {
            return Err(EngineError::InvalidOperator {
                field: self.field,
                operator: self.operator,
            });
        }
        Ok(Self {
            value: kind.post_process(self.value)?,
            ..self
        })
    }
}
