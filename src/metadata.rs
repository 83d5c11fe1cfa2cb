// Metadata tracker: the one place chart text (axis labels, titles) is derived

use crate::aggregation::Aggregation;
use crate::data::ColumnId;
use crate::error::EngineError;
use crate::field::Field;
use crate::filter::FilterGroup;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Display text for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMetadata {
    /// Long form, used in titles.
    pub description: String,
    /// Short form, used on axes.
    pub label: String,
}

impl FieldMetadata {
    pub fn for_field(field: Field) -> Self {
        Self {
            description: field.description().to_string(),
            label: field.label().to_string(),
        }
    }
}

/// Axis labels and title for a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotLabels {
    pub labels: BTreeMap<ColumnId, String>,
    pub title: String,
}

/// Per-column display text plus the rendered filter clauses.
///
/// Catalog fields start from their catalog defaults and are only stored once
/// a transformation rewrites them. Derived columns (cumulative results) must
/// be recorded explicitly before they can be queried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: BTreeMap<ColumnId, FieldMetadata>,
    filters: Vec<String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current display text for a column.
    pub fn entry(&self, id: &ColumnId) -> Result<FieldMetadata, EngineError> {
        if let Some(entry) = self.entries.get(id) {
            return Ok(entry.clone());
        }
        match id {
            ColumnId::Field(field) => Ok(FieldMetadata::for_field(*field)),
            _ => Err(EngineError::UnknownColumn(id.clone())),
        }
    }

    fn entry_mut(&mut self, field: Field) -> &mut FieldMetadata {
        self.entries
            .entry(ColumnId::Field(field))
            .or_insert_with(|| FieldMetadata::for_field(field))
    }

    /// Prefix the field's current text with the aggregation's prefixes.
    /// Repeated aggregations compose.
    pub fn apply_aggregation(&mut self, field: Field, aggregation: Aggregation) {
        let entry = self.entry_mut(field);
        entry.description = format!("{}{}", aggregation.description_prefix(), entry.description);
        entry.label = format!("{}{}", aggregation.label_prefix(), entry.label);
        debug!(field = %field, aggregation = %aggregation, label = %entry.label, "relabelled");
    }

    /// Record text for a cumulative column derived from `field`.
    pub fn apply_cumulative(&mut self, field: Field, result: ColumnId) {
        let base = FieldMetadata::for_field(field);
        let entry = FieldMetadata {
            description: format!("Cumulative {}", base.description),
            label: format!("Number of {}", base.label),
        };
        debug!(column = %result, label = %entry.label, "recorded cumulative column");
        self.entries.insert(result, entry);
    }

    /// Relabel the reaction-count column for a single reaction.
    pub fn apply_reaction(&mut self, reaction: &str) {
        let entry = self.entry_mut(Field::ReactionCount);
        entry.description = format!("Number of {} Reactions", reaction);
        entry.label = format!("{} Reactions", reaction);
    }

    /// Append a rendered filter clause, e.g. `Hour of Day ≥ 9`.
    pub fn add_filter(&mut self, filter: &FilterGroup) {
        let clause = format!(
            "{} {} {}",
            filter.field.label(),
            filter.operator.symbol(),
            filter.value
        );
        debug!(%clause, "recorded filter");
        self.filters.push(clause);
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Filter clauses joined in application order, parenthesised, or empty.
    pub fn filters_description(&self) -> String {
        if self.filters.is_empty() {
            String::new()
        } else {
            format!("({})", self.filters.join(", "))
        }
    }

    pub fn labels_and_title(&self, x: &ColumnId, y: &ColumnId) -> Result<PlotLabels, EngineError> {
        let x_meta = self.entry(x)?;
        let y_meta = self.entry(y)?;

        let title = format!(
            "{} by {} {}",
            y_meta.description,
            x_meta.description,
            self.filters_description()
        )
        .trim_end()
        .to_string();

        let mut labels = BTreeMap::new();
        labels.insert(x.clone(), x_meta.label);
        labels.insert(y.clone(), y_meta.label);

        Ok(PlotLabels { labels, title })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.filters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Operator;

    #[test]
    fn test_mean_prefixes() {
        let mut meta = Metadata::new();
        meta.apply_aggregation(Field::WordCount, Aggregation::Mean);
        let entry = meta.entry(&Field::WordCount.into()).unwrap();
        assert_eq!(entry.label, "Avg. Words");
        assert_eq!(entry.description, "Average Word Count");
    }

    #[test]
    fn test_count_distinct_prefixes() {
        let mut meta = Metadata::new();
        meta.apply_aggregation(Field::Author, Aggregation::CountDistinct);
        assert_eq!(meta.entry(&Field::Author.into()).unwrap().label, "Unique Users");
    }

    #[test]
    fn test_aggregations_compose() {
        let mut meta = Metadata::new();
        meta.apply_aggregation(Field::Count, Aggregation::Sum);
        meta.apply_aggregation(Field::Count, Aggregation::Mean);
        let entry = meta.entry(&Field::Count.into()).unwrap();
        assert_eq!(entry.label, "Avg. Number of Messages");
        assert_eq!(entry.description, "Average Messages");
    }

    #[test]
    fn test_cumulative_entry() {
        let mut meta = Metadata::new();
        meta.apply_cumulative(Field::WordCount, ColumnId::Cumulative(Field::WordCount));
        let entry = meta.entry(&ColumnId::Cumulative(Field::WordCount)).unwrap();
        assert_eq!(entry.description, "Cumulative Word Count");
        assert_eq!(entry.label, "Number of Words");

        let unknown = meta.entry(&ColumnId::Alias("total".to_string()));
        assert!(matches!(unknown, Err(EngineError::UnknownColumn(_))));
    }

    #[test]
    fn test_filter_clauses_in_order() {
        let mut meta = Metadata::new();
        meta.add_filter(&FilterGroup::new(Field::Hour, Operator::Geq, 9_i64));
        meta.add_filter(&FilterGroup::new(Field::Author, Operator::In, vec!["A", "B"]));
        assert_eq!(meta.filters_description(), "(Hour of Day ≥ 9, Users ∈ [A, B])");
    }

    #[test]
    fn test_labels_and_title() {
        let mut meta = Metadata::new();
        meta.apply_aggregation(Field::Count, Aggregation::Sum);
        let plot = meta
            .labels_and_title(&Field::Author.into(), &Field::Count.into())
            .unwrap();
        assert_eq!(plot.title, "Messages by Users");
        assert_eq!(plot.labels[&ColumnId::Field(Field::Count)], "Number of Messages");
        assert_eq!(plot.labels[&ColumnId::Field(Field::Author)], "Users");

        meta.add_filter(&FilterGroup::new(Field::Hour, Operator::Geq, 9_i64));
        let plot = meta
            .labels_and_title(&Field::Author.into(), &Field::Count.into())
            .unwrap();
        assert_eq!(plot.title, "Messages by Users (Hour of Day ≥ 9)");
    }

    #[test]
    fn test_reaction_entry() {
        let mut meta = Metadata::new();
        meta.apply_reaction("heart");
        let entry = meta.entry(&Field::ReactionCount.into()).unwrap();
        assert_eq!(entry.label, "heart Reactions");
        assert_eq!(entry.description, "Number of heart Reactions");
    }
}
