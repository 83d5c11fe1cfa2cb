// Field catalog: every attribute a pipeline can reference

use crate::aggregation::Aggregation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification flags for a field. A field may be several at once
/// (e.g. `hour` is both temporal and categorical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldKind {
    pub numerical: bool,
    pub categorical: bool,
    pub temporal: bool,
}

impl FieldKind {
    const CATEGORICAL: Self = Self { numerical: false, categorical: true, temporal: false };
    const NUMERICAL: Self = Self { numerical: true, categorical: false, temporal: false };
    const TEMPORAL: Self = Self { numerical: false, categorical: true, temporal: true };
    const INTERNAL: Self = Self { numerical: false, categorical: false, temporal: false };
}

/// Closed set of queryable attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Author,
    ChannelName,
    Count,
    Date,
    Day,
    Hour,
    ReactionCount,
    SceneEnd,
    WordCount,
    // Internal: canonical source columns that are never charted directly
    Datetime,
    Reactions,
}

/// Static catalog entry for a field.
struct FieldInfo {
    description: &'static str,
    label: Option<&'static str>,
    kind: FieldKind,
    aggregations: &'static [Aggregation],
}

const DISTINCT: &[Aggregation] = &[Aggregation::CountDistinct];
const NUMERIC: &[Aggregation] = &[Aggregation::Sum, Aggregation::Mean];
// Constant and boolean columns only make sense summed
const TRIVIAL: &[Aggregation] = &[Aggregation::Sum];

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Author,
        Field::ChannelName,
        Field::Count,
        Field::Date,
        Field::Day,
        Field::Hour,
        Field::ReactionCount,
        Field::SceneEnd,
        Field::WordCount,
        Field::Datetime,
        Field::Reactions,
    ];

    fn info(self) -> FieldInfo {
        match self {
            Field::Author => FieldInfo {
                description: "Users",
                label: None,
                kind: FieldKind::CATEGORICAL,
                aggregations: DISTINCT,
            },
            Field::ChannelName => FieldInfo {
                description: "Channels",
                label: None,
                kind: FieldKind::CATEGORICAL,
                aggregations: DISTINCT,
            },
            Field::Count => FieldInfo {
                description: "Messages",
                label: None,
                kind: FieldKind::NUMERICAL,
                aggregations: TRIVIAL,
            },
            Field::Date => FieldInfo {
                description: "Day",
                label: Some("Date"),
                kind: FieldKind::TEMPORAL,
                aggregations: DISTINCT,
            },
            Field::Day => FieldInfo {
                description: "Day of Month",
                label: None,
                kind: FieldKind::TEMPORAL,
                aggregations: DISTINCT,
            },
            Field::Hour => FieldInfo {
                description: "Hour of Day",
                label: None,
                kind: FieldKind::TEMPORAL,
                aggregations: DISTINCT,
            },
            Field::ReactionCount => FieldInfo {
                description: "Number of Reactions",
                label: Some("Reactions"),
                kind: FieldKind::NUMERICAL,
                aggregations: NUMERIC,
            },
            Field::SceneEnd => FieldInfo {
                description: "Scene Ends",
                label: Some("Scenes"),
                kind: FieldKind::NUMERICAL,
                aggregations: TRIVIAL,
            },
            Field::WordCount => FieldInfo {
                description: "Word Count",
                label: Some("Words"),
                kind: FieldKind::NUMERICAL,
                aggregations: NUMERIC,
            },
            Field::Datetime => FieldInfo {
                description: "Time",
                label: None,
                kind: FieldKind::INTERNAL,
                aggregations: &[],
            },
            Field::Reactions => FieldInfo {
                description: "Reaction Breakdown",
                label: None,
                kind: FieldKind::INTERNAL,
                aggregations: &[],
            },
        }
    }

    /// Column name used in tables, the DSL and serialized payloads.
    pub fn name(self) -> &'static str {
        match self {
            Field::Author => "author",
            Field::ChannelName => "channel_name",
            Field::Count => "count",
            Field::Date => "date",
            Field::Day => "day",
            Field::Hour => "hour",
            Field::ReactionCount => "reaction_count",
            Field::SceneEnd => "scene_end",
            Field::WordCount => "word_count",
            Field::Datetime => "datetime",
            Field::Reactions => "reactions",
        }
    }

    /// Long form used in chart titles.
    pub fn description(self) -> &'static str {
        self.info().description
    }

    /// Short form used on axes. Defaults to the description.
    pub fn label(self) -> &'static str {
        let info = self.info();
        info.label.unwrap_or(info.description)
    }

    pub fn kind(self) -> FieldKind {
        self.info().kind
    }

    pub fn is_numerical(self) -> bool {
        self.kind().numerical
    }

    pub fn is_categorical(self) -> bool {
        self.kind().categorical
    }

    pub fn is_temporal(self) -> bool {
        self.kind().temporal
    }

    /// Aggregations that are meaningful for this field, most natural first.
    pub fn aggregations(self) -> &'static [Aggregation] {
        self.info().aggregations
    }

    pub fn supports(self, aggregation: Aggregation) -> bool {
        self.aggregations().contains(&aggregation)
    }

    pub fn default_aggregation(self) -> Option<Aggregation> {
        self.aggregations().first().copied()
    }

    /// Whether the synthesizer can compute this field from canonical columns.
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            Field::Hour | Field::Day | Field::Date | Field::Count | Field::ReactionCount
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField(pub String);

impl fmt::Display for UnknownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown field '{}'", self.0)
    }
}

impl std::error::Error for UnknownField {}

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.name() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}
