// Transform pipeline over the working event table

use crate::aggregation::{aggregate, Aggregation};
use crate::data::{Column, ColumnId, Table, Value};
use crate::derive;
use crate::error::EngineError;
use crate::field::Field;
use crate::filter::{self, FilterGroup, FilterValue, Operator};
use crate::metadata::Metadata;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Working copy of an event table plus the fields referenced so far.
///
/// The source table is shared read-only; every operation mutates the
/// private working copy, and [`Pipeline::reset`] restores it.
#[derive(Debug, Clone)]
pub struct Pipeline {
    original: Arc<Table>,
    table: Table,
    fields: Vec<Field>,
    // Columns computed from a field (cumulative results), with their source
    derived: Vec<(ColumnId, Field)>,
    metadata: Metadata,
}

impl Pipeline {
    pub fn new(table: impl Into<Arc<Table>>) -> Self {
        let original = table.into();
        Self {
            table: (*original).clone(),
            original,
            fields: Vec::new(),
            derived: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn original(&self) -> &Table {
        &self.original
    }

    /// Active fields, in reference order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn activate(&mut self, field: Field) {
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }

    /// Reference a field, deriving its column if needed.
    pub fn add_field(&mut self, field: Field) -> Result<&mut Self, EngineError> {
        derive::ensure(&mut self.table, field)?;
        self.activate(field);
        debug!(field = %field, active = ?self.fields, "added field");
        Ok(self)
    }

    /// Reference the reaction-count field restricted to one named reaction.
    pub fn add_reaction_field(&mut self, field: Field, reaction: &str) -> Result<&mut Self, EngineError> {
        if field != Field::ReactionCount {
            return Err(EngineError::InvalidDerivation {
                field,
                reaction: reaction.to_string(),
            });
        }
        derive::ensure_reaction(&mut self.table, reaction)?;
        self.metadata.apply_reaction(reaction);
        self.activate(field);
        debug!(reaction, "added reaction field");
        Ok(self)
    }

    /// Keep the rows where `row[field] <operator> value` holds.
    pub fn filter(
        &mut self,
        operator: Operator,
        field: Field,
        value: impl Into<FilterValue>,
    ) -> Result<&mut Self, EngineError> {
        let group = FilterGroup::new(field, operator, value);
        derive::ensure(&mut self.table, field)?;

        let column = self.table.require(&field.into())?;
        let keep = column
            .values
            .iter()
            .map(|cell| filter::matches(operator, cell, &group.value))
            .collect::<Result<Vec<_>, _>>()?;

        let before = self.table.len();
        self.table.retain_rows(&keep);
        debug!(field = %field, %operator, value = %group.value, before, after = self.table.len(), "filtered");

        self.metadata.add_filter(&group);
        Ok(self)
    }

    /// Group by the single active field missing from `aggregations` and
    /// reduce every other active field with its aggregation.
    ///
    /// Rows with a null key are dropped. Groups come out in ascending key order.
    pub fn group_by_multiple(
        &mut self,
        aggregations: &BTreeMap<Field, Aggregation>,
    ) -> Result<&mut Self, EngineError> {
        let candidates: Vec<Field> = self
            .fields
            .iter()
            .copied()
            .filter(|f| !aggregations.contains_key(f))
            .collect();
        if candidates.len() != 1 {
            return Err(EngineError::AmbiguousGroupingKey { candidates });
        }
        let key = candidates[0];

        for (&field, &aggregation) in aggregations {
            if !self.fields.contains(&field) {
                return Err(EngineError::InactiveField(field));
            }
            if !field.supports(aggregation) {
                return Err(EngineError::UnsupportedAggregation { field, aggregation });
            }
        }

        // 1. Project onto the active fields
        let ids: Vec<ColumnId> = self.fields.iter().map(|&f| ColumnId::Field(f)).collect();
        let projected = self.table.select(&ids)?;

        // 2. Bucket row indices by key
        let key_values = &projected.require(&key.into())?.values;
        let groups = sorted_groups(key_values);

        // 3. Reduce each column per bucket
        let mut columns = Vec::with_capacity(projected.width());
        for column in projected.columns() {
            let values: Vec<Value> = match column.id.as_field().and_then(|f| aggregations.get(&f)) {
                None => groups.iter().map(|rows| key_values[rows[0]].clone()).collect(),
                Some(&aggregation) => groups
                    .iter()
                    .map(|rows| {
                        let cells: Vec<&Value> = rows.iter().map(|&r| &column.values[r]).collect();
                        aggregate(aggregation, &column.id, &cells)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            };
            columns.push(Column::new(column.id.clone(), values));
        }

        self.table = Table::from_columns(columns)?;
        self.derived.clear();
        for (&field, &aggregation) in aggregations {
            self.metadata.apply_aggregation(field, aggregation);
        }

        debug!(key = %key, ?aggregations, groups = groups.len(), "grouped");
        Ok(self)
    }

    /// Aggregate every active field except the key with one aggregation.
    /// The key defaults to the first active field.
    pub fn group_by(
        &mut self,
        aggregation: Aggregation,
        field: Option<Field>,
    ) -> Result<&mut Self, EngineError> {
        let key = match field.or_else(|| self.fields.first().copied()) {
            Some(key) => key,
            None => return Err(EngineError::AmbiguousGroupingKey { candidates: vec![] }),
        };
        let aggregations: BTreeMap<Field, Aggregation> = self
            .fields
            .iter()
            .filter(|&&f| f != key)
            .map(|&f| (f, aggregation))
            .collect();
        self.group_by_multiple(&aggregations)
    }

    /// Replace the table with (value, count) pairs for the one active field,
    /// most frequent first.
    pub fn value_counts(&mut self) -> Result<&mut Self, EngineError> {
        let [field] = self.fields[..] else {
            return Err(EngineError::ValueCountsArity(self.fields.len()));
        };

        let key_values = &self.table.require(&field.into())?.values;
        let mut counts: Vec<(Value, i64)> = sorted_groups(key_values)
            .into_iter()
            .map(|rows| (key_values[rows[0]].clone(), rows.len() as i64))
            .collect();
        // Stable: equal counts keep ascending key order
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        let (keys, totals): (Vec<Value>, Vec<Value>) =
            counts.into_iter().map(|(k, n)| (k, Value::Int(n))).unzip();
        self.table = Table::from_columns(vec![
            Column::new(field, keys),
            Column::new(Field::Count, totals),
        ])?;

        self.fields.push(Field::Count);
        self.derived.clear();
        self.metadata.apply_aggregation(Field::Count, Aggregation::Sum);

        debug!(field = %field, distinct = self.table.len(), "counted values");
        Ok(self)
    }

    /// Stable sort by one column. Nulls go last in either direction.
    pub fn sort(&mut self, column: &ColumnId, ascending: bool) -> Result<&mut Self, EngineError> {
        let values = &self.table.require(column)?.values;
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| {
            let (left, right) = (&values[a], &values[b]);
            match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ if ascending => left.total_cmp(right),
                _ => right.total_cmp(left),
            }
        });
        self.table.reorder_rows(&order);
        debug!(%column, ascending, "sorted");
        Ok(self)
    }

    /// Insert a running total of `field` right after it.
    ///
    /// Numeric columns get their running sum; anything else gets the 1-based
    /// row position. The result is named `cumulative_<field>` unless `result`
    /// supplies another name, which must not collide with a catalog field.
    pub fn cumulative(&mut self, field: Field, result: Option<String>) -> Result<&mut Self, EngineError> {
        let id = match result {
            None => ColumnId::Cumulative(field),
            Some(name) => match ColumnId::parse(&name) {
                ColumnId::Field(_) => return Err(EngineError::ReservedColumnName(name)),
                other => other,
            },
        };

        derive::ensure(&mut self.table, field)?;
        let source_id = ColumnId::Field(field);
        let position = self
            .table
            .position(&source_id)
            .ok_or_else(|| EngineError::UnknownColumn(source_id.clone()))?;
        let source = &self.table.columns()[position];

        let values = if source.is_numeric() {
            running_sum(&source.values)
        } else {
            (1..=source.values.len() as i64).map(Value::Int).collect()
        };

        self.table.insert_column(position + 1, Column::new(id.clone(), values))?;
        self.metadata.apply_cumulative(field, id.clone());
        debug!(field = %field, column = %id, "added cumulative column");
        self.derived.push((id, field));
        Ok(self)
    }

    /// Columns a chart can bind to: each active field followed by the columns
    /// derived from it, then derived columns whose source is not active.
    pub fn chart_columns(&self) -> Vec<ColumnId> {
        let mut ids = Vec::new();
        for &field in &self.fields {
            ids.push(ColumnId::Field(field));
            ids.extend(
                self.derived
                    .iter()
                    .filter(|(_, source)| *source == field)
                    .map(|(id, _)| id.clone()),
            );
        }
        ids.extend(
            self.derived
                .iter()
                .filter(|(_, source)| !self.fields.contains(source))
                .map(|(id, _)| id.clone()),
        );
        ids.retain(|id| self.table.contains(id));
        ids
    }

    /// Back to the state right after construction.
    pub fn reset(&mut self) -> &mut Self {
        self.table = (*self.original).clone();
        self.fields.clear();
        self.derived.clear();
        self.metadata.clear();
        debug!("pipeline reset");
        self
    }
}

/// Row indices grouped by equal key, groups in ascending key order.
/// Null keys are left out.
fn sorted_groups(keys: &[Value]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..keys.len()).filter(|&i| !keys[i].is_null()).collect();
    order.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]));

    let mut groups: Vec<Vec<usize>> = Vec::new();
    for idx in order {
        match groups.last_mut() {
            Some(group) if keys[group[0]].total_cmp(&keys[idx]) == Ordering::Equal => {
                group.push(idx)
            }
            _ => groups.push(vec![idx]),
        }
    }
    groups
}

fn running_sum(values: &[Value]) -> Vec<Value> {
    let integral = values.iter().all(|v| v.is_null() || v.as_i64().is_some());
    let mut int_total = 0_i64;
    let mut float_total = 0.0_f64;

    values
        .iter()
        .map(|v| {
            if v.is_null() {
                Value::Null
            } else if integral {
                int_total += v.as_i64().unwrap_or(0);
                Value::Int(int_total)
            } else {
                float_total += v.as_f64().unwrap_or(0.0);
                Value::Float(float_total)
            }
        })
        .collect()
}
