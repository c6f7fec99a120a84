//! Group-by discovery and partitioning
//!
//! Finds candidate group-by fields for a set of objects, ranks the distinct
//! values of a field, and evaluates a block once per selected value. A field
//! on another object is reached through at most one declared relationship.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tally_warehouse::{FieldRef, FieldType, Record, Schema, Warehouse};

use crate::block::{MetricBlock, evaluate_block_where};
use crate::error::{AnalyticsError, Result};
use crate::timerange::TimeWindow;
use crate::timeseries::{GroupedSeries, SeriesGroup};

/// Default number of values shown for a group-by field
pub const DEFAULT_GROUP_VALUE_LIMIT: usize = 50;

/// Default cap on selected group values
pub const DEFAULT_MAX_SELECTIONS: usize = 10;

/// A distinct value and how many rows carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupValue {
    /// The value
    pub value: String,
    /// Number of rows
    pub count: usize,
}

/// A group-by field and the values picked for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBySpec {
    /// Field to group by
    pub field: FieldRef,
    /// Selected values, in selection order
    #[serde(default)]
    pub selected_values: Vec<String>,
    /// Whether the field was added automatically rather than by the user
    #[serde(default)]
    pub auto_added_field: bool,
    /// Selection cap
    #[serde(default = "default_max_selections")]
    pub max_selections: usize,
}

fn default_max_selections() -> usize {
    DEFAULT_MAX_SELECTIONS
}

impl GroupBySpec {
    /// Group by a field with nothing selected
    pub fn new(field: FieldRef) -> Self {
        Self {
            field,
            selected_values: Vec::new(),
            auto_added_field: false,
            max_selections: DEFAULT_MAX_SELECTIONS,
        }
    }

    /// Set the selection cap
    pub fn with_max_selections(mut self, max: usize) -> Self {
        self.max_selections = max;
        self
    }

    /// Whether a value is selected
    pub fn is_selected(&self, value: &str) -> bool {
        self.selected_values.iter().any(|v| v == value)
    }

    /// Select a value; returns `false` if it was already selected
    pub fn select(&mut self, value: impl Into<String>) -> Result<bool> {
        let value = value.into();
        if self.is_selected(&value) {
            return Ok(false);
        }
        if self.selected_values.len() >= self.max_selections {
            return Err(AnalyticsError::SelectionLimit {
                max: self.max_selections,
            });
        }
        self.selected_values.push(value);
        Ok(true)
    }

    /// Deselect a value; returns `false` if it was not selected
    pub fn deselect(&mut self, value: &str) -> bool {
        let before = self.selected_values.len();
        self.selected_values.retain(|v| v != value);
        self.selected_values.len() != before
    }

    /// Flip a value's selection; returns whether it is now selected
    pub fn toggle(&mut self, value: &str) -> Result<bool> {
        if self.deselect(value) {
            Ok(false)
        } else {
            self.select(value)
        }
    }
}

/// String and enum fields of every selected object
///
/// Objects are visited in selection order, fields in declaration order.
/// Unknown or repeated objects are skipped.
pub fn get_available_group_fields(selected_objects: &[String], schema: &Schema) -> Vec<FieldRef> {
    let mut seen: Vec<&str> = Vec::new();
    let mut fields = Vec::new();

    for name in selected_objects {
        if seen.contains(&name.as_str()) {
            continue;
        }
        seen.push(name);

        let Some(object) = schema.object(name) else {
            continue;
        };
        fields.extend(
            object
                .fields
                .iter()
                .filter(|f| f.field_type == FieldType::String)
                .map(|f| FieldRef::new(&object.name, &f.name)),
        );
    }

    fields
}

/// Ranked distinct values of a field
///
/// With a `primary_object` other than the field's own object and a
/// relationship between the two, each primary row counts once for every
/// distinct value among its linked rows. Otherwise the field's own object
/// is scanned. Sorted by count descending then value, at most `limit`.
pub fn get_group_values(
    warehouse: &Warehouse,
    schema: &Schema,
    field: &FieldRef,
    limit: usize,
    primary_object: Option<&str>,
) -> Vec<GroupValue> {
    if schema.field(field).is_none() {
        tracing::warn!(field = %field, "unresolved group-by field");
        return Vec::new();
    }

    let keys = primary_object
        .filter(|p| *p != field.object)
        .and_then(|p| row_keys(warehouse, schema, field, p))
        .or_else(|| row_keys(warehouse, schema, field, &field.object))
        .unwrap_or_default();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in &keys {
        for value in row {
            *counts.entry(value.as_str()).or_default() += 1;
        }
    }

    let mut values: Vec<GroupValue> = counts
        .into_iter()
        .map(|(value, count)| GroupValue {
            value: value.to_string(),
            count,
        })
        .collect();
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));

    tracing::debug!(
        field = %field,
        primary = ?primary_object,
        distinct = values.len(),
        limit,
        "scanned group values"
    );

    values.truncate(limit);
    values
}

/// Evaluate a block once per selected group value
///
/// The group field may live on the block's object or one relationship
/// away. Groups follow selection order; a value absent from the data gets
/// an empty result.
pub fn evaluate_grouped(
    block: &MetricBlock,
    window: &TimeWindow,
    group_by: &GroupBySpec,
    warehouse: &Warehouse,
    schema: &Schema,
) -> GroupedSeries {
    let keys = block
        .source
        .as_ref()
        .and_then(|s| row_keys(warehouse, schema, &group_by.field, &s.object));

    let Some(keys) = keys else {
        tracing::warn!(
            block = %block.id,
            field = %group_by.field,
            "group-by field is not reachable from the block's object"
        );
        let groups = group_by
            .selected_values
            .iter()
            .map(|v| SeriesGroup::new(v, None, None))
            .collect();
        return GroupedSeries::from_groups(groups);
    };

    let groups = group_by
        .selected_values
        .iter()
        .map(|value| {
            let result = evaluate_block_where(block, window, warehouse, schema, |i, _| {
                keys.get(i).is_some_and(|row| row.contains(value))
            });
            SeriesGroup::new(value, result.value, result.series)
        })
        .collect();

    GroupedSeries::from_groups(groups)
}

/// Group keys for every row of `object`, in record order
///
/// `None` when `field` is neither on `object` nor one relationship away.
fn row_keys(
    warehouse: &Warehouse,
    schema: &Schema,
    field: &FieldRef,
    object: &str,
) -> Option<Vec<Vec<String>>> {
    schema.field(field)?;
    let rows = warehouse.records(object);

    if object == field.object {
        return Some(rows.iter().map(|r| own_key(r, &field.field)).collect());
    }

    let relationship = schema.relationship_between(object, &field.object)?;
    let key_field = relationship.key_field();
    let linked = warehouse.records(&field.object);

    // Index the field's rows by the value that rows of `object` will look up
    let primary_holds_key = relationship.key_holder() == object;
    let lookup_field = if primary_holds_key { "id" } else { key_field.as_str() };
    let mut index: HashMap<String, Vec<&Record>> = HashMap::new();
    for record in linked {
        if let Some(v) = record.get(lookup_field).filter(|v| !v.is_blank()) {
            index.entry(v.key()).or_default().push(record);
        }
    }

    let probe_field = if primary_holds_key { key_field.as_str() } else { "id" };
    let keys = rows
        .iter()
        .map(|row| {
            let mut values: Vec<String> = Vec::new();
            let matches = row
                .get(probe_field)
                .filter(|v| !v.is_blank())
                .and_then(|v| index.get(&v.key()));
            for record in matches.into_iter().flatten() {
                for value in own_key(record, &field.field) {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
            }
            values
        })
        .collect();

    Some(keys)
}

fn own_key(record: &Record, field: &str) -> Vec<String> {
    record
        .get(field)
        .filter(|v| !v.is_blank())
        .map(|v| vec![v.key()])
        .unwrap_or_default()
}
