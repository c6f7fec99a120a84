//! Tally Analytics Engine
//!
//! Metric computation over an in-memory, schema-described warehouse.
//!
//! # Overview
//!
//! - **Filters**: typed conditions combined with AND/OR
//! - **Time ranges**: range parsing, windows, calendar-aligned buckets
//! - **Blocks**: one aggregation producing a scalar and a per-bucket series
//! - **Comparisons**: previous period, previous year, period start
//! - **Formulas**: blocks combined by a calculation
//! - **Grouping**: group-by field discovery, ranked values, grouped series
//! - **Engine**: memoization keyed on the request and warehouse version
//!
//! Computation never fails. Unresolved fields, empty objects, and undefined
//! arithmetic produce `None` values instead of errors; only parsing and
//! group-by selection return [`AnalyticsError`].
//!
//! # Usage
//!
//! ```ignore
//! use tally_analytics::{
//!     AggregationOp, BlockSource, Granularity, MetricBlock, MetricFormula, FormulaRequest,
//!     MetricsEngine, TimeRange,
//! };
//!
//! let block = MetricBlock::new("revenue", BlockSource::field("payments", "amount"), AggregationOp::Sum);
//! let request = FormulaRequest::new(
//!     MetricFormula::new(vec![block]),
//!     TimeRange::parse("30d")?,
//!     Granularity::Day,
//! );
//!
//! let engine = MetricsEngine::new(schema, Default::default());
//! let result = engine.compute(&request, &warehouse);
//! ```

pub mod block;
pub mod comparison;
pub mod engine;
pub mod error;
pub mod filter;
pub mod formula;
pub mod grouping;
pub mod timerange;
pub mod timeseries;

#[cfg(test)]
mod comparison_test;
#[cfg(test)]
mod filter_test;
#[cfg(test)]
mod timeseries_test;

// Re-exports for convenience
pub use block::{
    AggregationOp, AggregationType, BlockResult, BlockSource, MetricBlock, evaluate_block,
};
pub use comparison::{ComparisonMode, ComparisonResult, compare, compare_with};
pub use engine::{DEFAULT_CACHE_CAPACITY, EngineOptions, MetricsEngine};
pub use error::{AnalyticsError, Result};
pub use filter::{
    ConditionValue, FilterCondition, FilterLogic, FilterSet, Operator, Scalar, evaluate,
};
pub use formula::{
    Calculation, CombinedResult, FormulaRequest, FormulaResult, MetricFormula, UnitType,
    compute_formula,
};
pub use grouping::{
    DEFAULT_GROUP_VALUE_LIMIT, DEFAULT_MAX_SELECTIONS, GroupBySpec, GroupValue, evaluate_grouped,
    get_available_group_fields, get_group_values,
};
pub use timerange::{Bucket, Granularity, MAX_BUCKETS, TimeRange, TimeWindow, bucketize};
pub use timeseries::{GroupedSeries, Series, SeriesGroup, SeriesPoint, SeriesStats};
