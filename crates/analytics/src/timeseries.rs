//! Time series data types
//!
//! Per-bucket results of a block or formula, plus grouped breakdowns.
//! Points are keyed by bucket index so series from different sources can
//! be aligned without relying on array position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timerange::Bucket;

/// A single data point in a time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket index within the window
    pub index: usize,
    /// Bucket label (e.g. `2024-01`, `2024-Q1`)
    pub date: String,
    /// Bucket start
    pub start: DateTime<Utc>,
    /// The aggregated value; `None` when undefined for the bucket
    pub value: Option<f64>,
}

impl SeriesPoint {
    /// Create a point for a bucket
    pub fn new(bucket: &Bucket, value: Option<f64>) -> Self {
        Self {
            index: bucket.index,
            date: bucket.label.clone(),
            start: bucket.start,
            value,
        }
    }

    /// Same bucket, different value
    pub fn with_value(&self, value: Option<f64>) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }
}

/// Ordered per-bucket values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Data points, one per bucket
    pub points: Vec<SeriesPoint>,
}

impl Series {
    /// Create a series from points
    pub fn from_points(points: Vec<SeriesPoint>) -> Self {
        Self { points }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Point for a bucket index
    pub fn get(&self, index: usize) -> Option<&SeriesPoint> {
        self.points.iter().find(|p| p.index == index)
    }

    /// Value of a bucket index, if present and defined
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(|p| p.value)
    }

    /// The first point's value
    pub fn first_value(&self) -> Option<f64> {
        self.points.first().and_then(|p| p.value)
    }

    /// Defined values in bucket order
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().filter_map(|p| p.value)
    }

    /// Sum of defined values, `None` when no bucket has a value
    pub fn total(&self) -> Option<f64> {
        let mut values = self.values().peekable();
        values.peek()?;
        Some(values.sum())
    }

    /// Summary statistics over defined values
    pub fn stats(&self) -> Option<SeriesStats> {
        let values: Vec<f64> = self.values().collect();
        if values.is_empty() {
            return None;
        }

        let total: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = total / values.len() as f64;

        Some(SeriesStats {
            total,
            min,
            max,
            avg,
        })
    }
}

/// Statistics for a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    /// Sum of values
    pub total: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Mean value
    pub avg: f64,
}

/// Block results partitioned by group-by value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupedSeries {
    /// One entry per selected group value, in selection order
    pub groups: Vec<SeriesGroup>,
}

impl GroupedSeries {
    /// Create from groups
    pub fn from_groups(groups: Vec<SeriesGroup>) -> Self {
        Self { groups }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Look up a group by value
    pub fn group(&self, value: &str) -> Option<&SeriesGroup> {
        self.groups.iter().find(|g| g.value == value)
    }
}

/// A single group in a breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesGroup {
    /// The group-by value (e.g. "paid", "US")
    pub value: String,
    /// Scalar for this group
    pub total: Option<f64>,
    /// Per-bucket values for this group
    pub series: Option<Series>,
}

impl SeriesGroup {
    /// Create a new group
    pub fn new(value: impl Into<String>, total: Option<f64>, series: Option<Series>) -> Self {
        Self {
            value: value.into(),
            total,
            series,
        }
    }
}
