//! Comparison baselines
//!
//! Derives a baseline for a block or formula result and the deltas against
//! it. Shifted baselines (previous period, previous year) re-evaluate the
//! same configuration over a shifted window; `period_start` takes the first
//! bucket of the current series.

use serde::{Deserialize, Serialize};
use tally_warehouse::{Schema, Warehouse};

use crate::block::{BlockResult, MetricBlock, evaluate_block};
use crate::error::{AnalyticsError, Result};
use crate::timerange::TimeWindow;
use crate::timeseries::Series;

/// Comparison mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// No comparison
    #[default]
    None,
    /// Preceding window of equal length
    PreviousPeriod,
    /// Same window one year earlier
    PreviousYear,
    /// First bucket of the current window
    PeriodStart,
}

impl ComparisonMode {
    /// Parse comparison mode from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "previous_period" | "previous" | "prev" => Ok(Self::PreviousPeriod),
            "previous_year" | "yoy" | "year" => Ok(Self::PreviousYear),
            "period_start" | "start" => Ok(Self::PeriodStart),
            _ => Err(AnalyticsError::InvalidComparison(s.to_string())),
        }
    }

    /// Window to re-evaluate for shifted modes
    pub fn baseline_window(&self, window: &TimeWindow) -> Option<TimeWindow> {
        match self {
            Self::PreviousPeriod => Some(window.previous_period()),
            Self::PreviousYear => Some(window.previous_year()),
            Self::None | Self::PeriodStart => None,
        }
    }
}

/// Baseline and deltas for one result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Baseline scalar
    pub baseline_value: Option<f64>,
    /// Baseline series, for shifted windows only
    pub baseline_series: Option<Series>,
    /// `current - baseline`
    pub delta: Option<f64>,
    /// `delta / baseline` as a fraction (0.5 = +50%)
    pub percent_delta: Option<f64>,
}

impl ComparisonResult {
    /// Compute deltas between a current and baseline value
    ///
    /// A zero or missing baseline leaves the percent delta undefined.
    pub fn from_values(current: Option<f64>, baseline: Option<f64>) -> Self {
        let delta = current.zip(baseline).map(|(c, b)| c - b);
        let percent_delta = match (delta, baseline) {
            (Some(d), Some(b)) if b != 0.0 => Some(d / b).filter(|p| p.is_finite()),
            _ => None,
        };

        Self {
            baseline_value: baseline,
            baseline_series: None,
            delta,
            percent_delta,
        }
    }

    /// Attach the baseline series
    pub fn with_series(mut self, series: Option<Series>) -> Self {
        self.baseline_series = series;
        self
    }
}

/// Compare a block's current result against its baseline
pub fn compare(
    block: &MetricBlock,
    window: &TimeWindow,
    mode: ComparisonMode,
    warehouse: &Warehouse,
    schema: &Schema,
    current: &BlockResult,
) -> Option<ComparisonResult> {
    compare_with(
        mode,
        window,
        current.value,
        current.series.as_ref(),
        |baseline| {
            let result = evaluate_block(block, baseline, warehouse, schema);
            (result.value, result.series)
        },
    )
}

/// Compare using a caller-supplied evaluator for shifted windows
///
/// `evaluate` must run the same configuration as produced `value` and
/// `series`, only over the window it is given.
pub fn compare_with<F>(
    mode: ComparisonMode,
    window: &TimeWindow,
    value: Option<f64>,
    series: Option<&Series>,
    evaluate: F,
) -> Option<ComparisonResult>
where
    F: FnOnce(&TimeWindow) -> (Option<f64>, Option<Series>),
{
    let result = match mode {
        ComparisonMode::None => return None,
        ComparisonMode::PeriodStart => {
            let baseline = series.and_then(Series::first_value);
            ComparisonResult::from_values(value, baseline)
        }
        ComparisonMode::PreviousPeriod | ComparisonMode::PreviousYear => {
            let baseline_window = mode.baseline_window(window)?;
            let (baseline, baseline_series) = evaluate(&baseline_window);
            ComparisonResult::from_values(value, baseline).with_series(baseline_series)
        }
    };

    tracing::debug!(
        mode = ?mode,
        current = ?value,
        baseline = ?result.baseline_value,
        delta = ?result.delta,
        "computed comparison"
    );

    Some(result)
}
