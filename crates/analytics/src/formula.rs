//! Formula composition
//!
//! A formula is one or more blocks plus a calculation that combines their
//! results. Every block is evaluated independently; with a single block the
//! combined result is that block's result, otherwise the calculation is
//! applied to scalars and, bucket by bucket, to the series.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_warehouse::{FieldRef, Schema, Warehouse};

use crate::block::{BlockResult, MetricBlock, evaluate_block_where};
use crate::comparison::{ComparisonMode, ComparisonResult, compare_with};
use crate::filter::FilterSet;
use crate::timerange::{Granularity, TimeRange, TimeWindow};
use crate::timeseries::{Series, SeriesPoint};

/// How block results combine into the formula result
///
/// Operands name blocks by id; an omitted id means the first (or second)
/// block in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Calculation {
    /// The first block's result, unchanged
    #[default]
    Identity,
    /// `numerator / denominator`
    Ratio {
        #[serde(default)]
        numerator: Option<String>,
        #[serde(default)]
        denominator: Option<String>,
    },
    /// `minuend - subtrahend`
    Difference {
        #[serde(default)]
        minuend: Option<String>,
        #[serde(default)]
        subtrahend: Option<String>,
    },
    /// Sum of every block
    Sum,
}

impl Calculation {
    /// Ratio of the first block over the second
    pub fn ratio() -> Self {
        Self::Ratio {
            numerator: None,
            denominator: None,
        }
    }

    /// First block minus the second
    pub fn difference() -> Self {
        Self::Difference {
            minuend: None,
            subtrahend: None,
        }
    }

    /// Block positions this calculation reads, `None` for an unknown id
    fn operands(&self, blocks: &[MetricBlock]) -> Vec<Option<usize>> {
        let find = |id: &Option<String>, default: usize| match id {
            Some(id) => blocks.iter().position(|b| &b.id == id),
            None => (default < blocks.len()).then_some(default),
        };

        match self {
            Self::Identity => vec![find(&None, 0)],
            Self::Ratio {
                numerator,
                denominator,
            } => vec![find(numerator, 0), find(denominator, 1)],
            Self::Difference {
                minuend,
                subtrahend,
            } => vec![find(minuend, 0), find(subtrahend, 1)],
            Self::Sum => (0..blocks.len()).map(Some).collect(),
        }
    }

    /// Combine operand values; every operand must be defined
    fn apply(&self, values: &[f64]) -> Option<f64> {
        let value = match self {
            Self::Identity => *values.first()?,
            Self::Ratio { .. } => {
                let [numerator, denominator] = values else {
                    return None;
                };
                if *denominator == 0.0 {
                    return None;
                }
                numerator / denominator
            }
            Self::Difference { .. } => {
                let [minuend, subtrahend] = values else {
                    return None;
                };
                minuend - subtrahend
            }
            Self::Sum => values.iter().sum(),
        };
        value.is_finite().then_some(value)
    }
}

/// How the combined value should be displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// A measured quantity
    #[default]
    Number,
    /// A count of records or values
    Count,
    /// A dimensionless ratio
    Ratio,
}

impl UnitType {
    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Count => "count",
            Self::Ratio => "ratio",
        }
    }
}

/// Blocks plus the calculation combining them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricFormula {
    /// Blocks, in declaration order
    #[serde(default)]
    pub blocks: Vec<MetricBlock>,
    /// Cross-block calculation
    #[serde(default)]
    pub calculation: Calculation,
    /// Block ids whose results are surfaced for direct display
    #[serde(default)]
    pub expose_blocks: Vec<String>,
}

impl MetricFormula {
    /// Formula over the given blocks with the identity calculation
    pub fn new(blocks: Vec<MetricBlock>) -> Self {
        Self {
            blocks,
            ..Default::default()
        }
    }

    /// Set the calculation
    pub fn with_calculation(mut self, calculation: Calculation) -> Self {
        self.calculation = calculation;
        self
    }

    /// Surface a block for direct display
    pub fn expose(mut self, block_id: impl Into<String>) -> Self {
        self.expose_blocks.push(block_id.into());
        self
    }

    /// Unit of the combined result
    pub fn unit_type(&self) -> UnitType {
        let calculation = self.effective_calculation();
        if matches!(calculation, Calculation::Ratio { .. }) {
            return UnitType::Ratio;
        }

        let operands = calculation.operands(&self.blocks);
        let counts = operands
            .iter()
            .all(|i| i.is_some_and(|i| self.blocks[i].op.is_count()));
        if !operands.is_empty() && counts {
            UnitType::Count
        } else {
            UnitType::Number
        }
    }

    /// A single block is always shown as-is
    fn effective_calculation(&self) -> &Calculation {
        if self.blocks.len() == 1 {
            &Calculation::Identity
        } else {
            &self.calculation
        }
    }
}

/// Everything needed to compute a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaRequest {
    /// The formula
    pub formula: MetricFormula,
    /// Window start (inclusive)
    pub start: DateTime<Utc>,
    /// Window end (inclusive)
    pub end: DateTime<Utc>,
    /// Bucket size
    #[serde(default)]
    pub granularity: Granularity,
    /// Global filters, applied to blocks reading the condition's object
    #[serde(default)]
    pub filters: FilterSet,
    /// Objects selected in the caller's UI
    #[serde(default)]
    pub selected_objects: Vec<String>,
    /// Fields selected in the caller's UI
    #[serde(default)]
    pub selected_fields: Vec<FieldRef>,
    /// Comparison baseline
    #[serde(default)]
    pub comparison: ComparisonMode,
}

impl FormulaRequest {
    /// Request over a range
    pub fn new(formula: MetricFormula, range: TimeRange, granularity: Granularity) -> Self {
        Self {
            formula,
            start: range.start,
            end: range.end,
            granularity,
            filters: FilterSet::default(),
            selected_objects: Vec::new(),
            selected_fields: Vec::new(),
            comparison: ComparisonMode::None,
        }
    }

    /// Set global filters
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Set the comparison mode
    pub fn with_comparison(mut self, comparison: ComparisonMode) -> Self {
        self.comparison = comparison;
        self
    }

    /// Record the caller's object and field selection
    pub fn with_selection(mut self, objects: Vec<String>, fields: Vec<FieldRef>) -> Self {
        self.selected_objects = objects;
        self.selected_fields = fields;
        self
    }

    /// The request's window; an inverted window has no buckets
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
            granularity: self.granularity,
        }
    }
}

/// Formula-level result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    /// Combined scalar
    pub value: Option<f64>,
    /// Combined series, aligned by bucket index
    pub series: Option<Series>,
    /// Display unit
    pub unit_type: UnitType,
    /// Baseline and deltas, when a comparison was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonResult>,
}

/// Output of [`compute_formula`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaResult {
    /// Combined result
    pub result: CombinedResult,
    /// One entry per block, in declaration order
    pub block_results: Vec<BlockResult>,
    /// Results of the blocks listed in `expose_blocks`
    pub exposed: Vec<BlockResult>,
}

/// Compute a formula over a window
///
/// Pure function of its inputs. An empty formula yields a null result and
/// no block results.
pub fn compute_formula(
    request: &FormulaRequest,
    warehouse: &Warehouse,
    schema: &Schema,
) -> FormulaResult {
    let formula = &request.formula;
    if formula.blocks.is_empty() {
        return FormulaResult::default();
    }

    let window = request.window();
    let (mut result, block_results) = compose(formula, &request.filters, &window, warehouse, schema);

    if !block_results.is_empty() {
        result.comparison = compare_with(
            request.comparison,
            &window,
            result.value,
            result.series.as_ref(),
            |baseline| {
                let (combined, _) = compose(formula, &request.filters, baseline, warehouse, schema);
                (combined.value, combined.series)
            },
        );
    }

    let exposed = formula
        .expose_blocks
        .iter()
        .filter_map(|id| block_results.iter().find(|r| &r.block_id == id))
        .cloned()
        .collect();

    tracing::debug!(
        blocks = formula.blocks.len(),
        calculation = ?formula.calculation,
        value = ?result.value,
        "computed formula"
    );

    FormulaResult {
        result,
        block_results,
        exposed,
    }
}

fn compose(
    formula: &MetricFormula,
    filters: &FilterSet,
    window: &TimeWindow,
    warehouse: &Warehouse,
    schema: &Schema,
) -> (CombinedResult, Vec<BlockResult>) {
    let block_results: Vec<BlockResult> = formula
        .blocks
        .iter()
        .map(|block| {
            let object = block.source.as_ref().map(|s| s.object.as_str()).unwrap_or_default();
            let global = filters.for_object(object);
            evaluate_block_where(block, window, warehouse, schema, |_, record| {
                global.matches(object, record, schema)
            })
        })
        .collect();

    let calculation = formula.effective_calculation();

    let operands: Option<Vec<&BlockResult>> = calculation
        .operands(&formula.blocks)
        .into_iter()
        .map(|i| i.map(|i| &block_results[i]))
        .collect();

    let (value, series) = match operands {
        Some(operands) => combine(calculation, &operands),
        None => {
            tracing::warn!(calculation = ?calculation, "calculation references an unknown block");
            (None, None)
        }
    };

    let combined = CombinedResult {
        value,
        series,
        unit_type: formula.unit_type(),
        comparison: None,
    };
    (combined, block_results)
}

fn combine(calculation: &Calculation, operands: &[&BlockResult]) -> (Option<f64>, Option<Series>) {
    let values: Option<Vec<f64>> = operands.iter().map(|r| r.value).collect();
    let value = values.and_then(|v| calculation.apply(&v));

    let series: Option<Vec<&Series>> = operands.iter().map(|r| r.series.as_ref()).collect();
    let series = series.map(|series| combine_series(calculation, &series));

    (value, series)
}

/// Combine series point by point, matching buckets by index
fn combine_series(calculation: &Calculation, operands: &[&Series]) -> Series {
    let mut buckets: BTreeMap<usize, &SeriesPoint> = BTreeMap::new();
    for series in operands {
        for point in &series.points {
            buckets.entry(point.index).or_insert(point);
        }
    }

    let points = buckets
        .into_iter()
        .map(|(index, point)| {
            let values: Option<Vec<f64>> = operands.iter().map(|s| s.value_at(index)).collect();
            point.with_value(values.and_then(|v| calculation.apply(&v)))
        })
        .collect();

    Series::from_points(points)
}
