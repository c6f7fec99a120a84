//! Block evaluation
//!
//! A block is one aggregation: a source object/field, an operator, a
//! temporal type, and block-local filters. Evaluating a block yields both a
//! scalar for the whole window and a per-bucket series, so a KPI tile and a
//! chart can share one pass over the records.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_warehouse::{Record, Schema, Warehouse};

use crate::error::{AnalyticsError, Result};
use crate::filter::{FilterCondition, FilterLogic, evaluate};
use crate::timerange::{TimeWindow, bucket_index, bucketize};
use crate::timeseries::{Series, SeriesPoint};

/// Aggregation operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationOp {
    /// Arithmetic sum of numeric values
    Sum,
    /// Mean of numeric values
    Avg,
    /// Number of records
    Count,
    /// Number of unique non-empty values
    DistinctCount,
    /// Middle numeric value
    Median,
    /// Most frequent numeric value
    Mode,
}

impl AggregationOp {
    /// Parse operator from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "avg" | "average" | "mean" => Ok(Self::Avg),
            "count" => Ok(Self::Count),
            "distinct_count" | "count_distinct" | "distinct" => Ok(Self::DistinctCount),
            "median" => Ok(Self::Median),
            "mode" => Ok(Self::Mode),
            _ => Err(AnalyticsError::InvalidAggregation(s.to_string())),
        }
    }

    /// Whether the operator reads a field value (everything but `count`)
    pub fn needs_field(&self) -> bool {
        !matches!(self, Self::Count)
    }

    /// Whether the result counts things rather than measuring them
    pub fn is_count(&self) -> bool {
        matches!(self, Self::Count | Self::DistinctCount)
    }
}

/// Temporal shape of a block's aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    /// Aggregate each bucket, and the whole window for the scalar
    #[default]
    SumOverPeriod,
    /// Aggregate each bucket; the scalar is the mean of bucket values
    AverageOverPeriod,
    /// Value of the most recent record
    Latest,
    /// Value of the earliest record
    First,
}

impl AggregationType {
    /// Parse type from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sum_over_period" | "total" => Ok(Self::SumOverPeriod),
            "average_over_period" | "average" => Ok(Self::AverageOverPeriod),
            "latest" | "last" => Ok(Self::Latest),
            "first" | "earliest" => Ok(Self::First),
            _ => Err(AnalyticsError::InvalidAggregation(s.to_string())),
        }
    }
}

/// Where a block reads its records from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSource {
    /// Object whose records are aggregated
    pub object: String,
    /// Field to aggregate; may be omitted for `count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl BlockSource {
    /// Source reading a field
    pub fn field(object: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            field: Some(field.into()),
        }
    }

    /// Source counting an object's records
    pub fn object(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            field: None,
        }
    }
}

/// One aggregation definition inside a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBlock {
    /// Identifier, unique within a formula
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Source object/field
    #[serde(default)]
    pub source: Option<BlockSource>,
    /// Aggregation operator
    pub op: AggregationOp,
    /// Temporal type
    #[serde(rename = "type", default)]
    pub aggregation: AggregationType,
    /// Block-local filters, all of which must match
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
}

impl MetricBlock {
    /// Create a `sum_over_period` block
    pub fn new(id: impl Into<String>, source: BlockSource, op: AggregationOp) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            source: Some(source),
            op,
            aggregation: AggregationType::SumOverPeriod,
            filters: Vec::new(),
        }
    }

    /// Set the display name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the temporal type
    pub fn with_type(mut self, aggregation: AggregationType) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Add a block-local filter
    pub fn with_filter(mut self, condition: FilterCondition) -> Self {
        self.filters.push(condition);
        self
    }
}

/// Result of evaluating one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockResult {
    /// Block identifier
    pub block_id: String,
    /// Scalar summarizing the whole window
    pub value: Option<f64>,
    /// One point per bucket; `None` when there is no data or no time axis
    pub series: Option<Series>,
}

impl BlockResult {
    /// A "no data" result
    pub fn empty(block_id: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            value: None,
            series: None,
        }
    }
}

/// Evaluate a block over a window
///
/// Never fails: a missing source, unresolved object or field, or an empty
/// object yields `{ value: None, series: None }`.
pub fn evaluate_block(
    block: &MetricBlock,
    window: &TimeWindow,
    warehouse: &Warehouse,
    schema: &Schema,
) -> BlockResult {
    evaluate_block_where(block, window, warehouse, schema, |_, _| true)
}

/// Evaluate a block over the records that also satisfy `keep`
///
/// `keep` receives each record's position in its object array.
pub(crate) fn evaluate_block_where<F>(
    block: &MetricBlock,
    window: &TimeWindow,
    warehouse: &Warehouse,
    schema: &Schema,
    keep: F,
) -> BlockResult
where
    F: Fn(usize, &Record) -> bool,
{
    let Some(source) = &block.source else {
        tracing::debug!(block = %block.id, "block has no source");
        return BlockResult::empty(&block.id);
    };

    let Some(object) = schema.object(&source.object) else {
        tracing::warn!(block = %block.id, object = %source.object, "unresolved block object");
        return BlockResult::empty(&block.id);
    };

    let field = match (&source.field, block.op.needs_field()) {
        (_, false) => None,
        (Some(name), true) if object.field(name).is_some() => Some(name.as_str()),
        (name, true) => {
            tracing::warn!(
                block = %block.id,
                object = %source.object,
                field = ?name,
                "unresolved block field"
            );
            return BlockResult::empty(&block.id);
        }
    };

    let records = warehouse.records(&object.name);
    if records.is_empty() {
        return BlockResult::empty(&block.id);
    }

    let matched: Vec<&Record> = records
        .iter()
        .enumerate()
        .filter(|(i, r)| {
            evaluate(&block.filters, FilterLogic::And, &object.name, r, schema) && keep(*i, r)
        })
        .map(|(_, r)| r)
        .collect();

    let agg = Aggregator {
        op: block.op,
        field,
    };

    let result = match object.timestamp() {
        Some(ts) => evaluate_timed(block, &agg, ts, window, &matched),
        None => evaluate_timeless(block, &agg, &matched),
    };

    tracing::debug!(
        block = %block.id,
        object = %object.name,
        records = records.len(),
        matched = matched.len(),
        value = ?result.value,
        "evaluated block"
    );

    result
}

fn evaluate_timeless(block: &MetricBlock, agg: &Aggregator<'_>, records: &[&Record]) -> BlockResult {
    let value = match block.aggregation {
        AggregationType::SumOverPeriod | AggregationType::AverageOverPeriod => {
            agg.aggregate(records)
        }
        AggregationType::Latest => records.last().and_then(|r| agg.aggregate(&[*r])),
        AggregationType::First => records.first().and_then(|r| agg.aggregate(&[*r])),
    };

    BlockResult {
        block_id: block.id.clone(),
        value,
        series: None,
    }
}

fn evaluate_timed(
    block: &MetricBlock,
    agg: &Aggregator<'_>,
    timestamp_field: &str,
    window: &TimeWindow,
    records: &[&Record],
) -> BlockResult {
    let buckets = bucketize(window);
    let mut per_bucket: Vec<Vec<(DateTime<Utc>, &Record)>> = vec![Vec::new(); buckets.len()];
    let mut in_window: Vec<(DateTime<Utc>, &Record)> = Vec::new();

    for record in records {
        let Some(t) = record.get(timestamp_field).and_then(|v| v.as_date()) else {
            continue;
        };
        if let Some(idx) = bucket_index(t, window, &buckets) {
            per_bucket[idx].push((t, record));
            in_window.push((t, record));
        }
    }

    let bucket_value = |entries: &[(DateTime<Utc>, &Record)]| match block.aggregation {
        AggregationType::SumOverPeriod | AggregationType::AverageOverPeriod => {
            let rows: Vec<&Record> = entries.iter().map(|(_, r)| *r).collect();
            agg.aggregate(&rows)
        }
        AggregationType::Latest => latest(entries).and_then(|r| agg.aggregate(&[r])),
        AggregationType::First => first(entries).and_then(|r| agg.aggregate(&[r])),
    };

    let points: Vec<SeriesPoint> = buckets
        .iter()
        .zip(&per_bucket)
        .map(|(bucket, entries)| SeriesPoint::new(bucket, bucket_value(entries)))
        .collect();
    let series = Series::from_points(points);

    let value = match block.aggregation {
        AggregationType::AverageOverPeriod => mean(series.values()),
        _ => bucket_value(&in_window),
    };

    BlockResult {
        block_id: block.id.clone(),
        value,
        series: Some(series),
    }
}

/// Record with the greatest timestamp; on ties the later record wins
fn latest<'a>(entries: &[(DateTime<Utc>, &'a Record)]) -> Option<&'a Record> {
    let mut best: Option<(DateTime<Utc>, &Record)> = None;
    for &(t, r) in entries {
        if best.is_none_or(|(bt, _)| t >= bt) {
            best = Some((t, r));
        }
    }
    best.map(|(_, r)| r)
}

/// Record with the smallest timestamp; on ties the earlier record wins
fn first<'a>(entries: &[(DateTime<Utc>, &'a Record)]) -> Option<&'a Record> {
    let mut best: Option<(DateTime<Utc>, &Record)> = None;
    for &(t, r) in entries {
        if best.is_none_or(|(bt, _)| t < bt) {
            best = Some((t, r));
        }
    }
    best.map(|(_, r)| r)
}

/// Applies one operator to a set of records
struct Aggregator<'a> {
    op: AggregationOp,
    field: Option<&'a str>,
}

impl Aggregator<'_> {
    /// `sum`, `count` and `distinct_count` of an empty set are 0; the
    /// other operators are undefined (`None`)
    fn aggregate(&self, records: &[&Record]) -> Option<f64> {
        match self.op {
            AggregationOp::Count => Some(records.len() as f64),
            AggregationOp::DistinctCount => {
                let field = self.field?;
                let distinct: HashSet<String> = records
                    .iter()
                    .filter_map(|r| r.get(field))
                    .filter(|v| !v.is_blank())
                    .map(|v| v.key())
                    .collect();
                Some(distinct.len() as f64)
            }
            AggregationOp::Sum => Some(self.numbers(records).sum()),
            AggregationOp::Avg => mean(self.numbers(records)),
            AggregationOp::Median => median(self.numbers(records).collect()),
            AggregationOp::Mode => mode(self.numbers(records)),
        }
    }

    fn numbers<'r>(&'r self, records: &'r [&'r Record]) -> impl Iterator<Item = f64> + 'r {
        records
            .iter()
            .filter_map(move |r| self.field.and_then(|f| r.get(f)).and_then(|v| v.as_f64()))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Most frequent value; ties go to the value seen first
fn mode(values: impl Iterator<Item = f64>) -> Option<f64> {
    // (count, first position) per value, keyed by bit pattern with -0.0 folded into 0.0
    let mut counts: HashMap<u64, (usize, usize, f64)> = HashMap::new();
    for (pos, v) in values.enumerate() {
        let v = if v == 0.0 { 0.0 } else { v };
        counts.entry(v.to_bits()).or_insert((0, pos, v)).0 += 1;
    }

    counts
        .into_values()
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, _, v)| v)
}
