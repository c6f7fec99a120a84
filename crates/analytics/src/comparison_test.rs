//! Tests for comparison baselines

use chrono::{DateTime, Duration, TimeZone, Utc};
use tally_warehouse::{FieldType, Record, Schema, SchemaField, SchemaObject, Warehouse};

use crate::block::{AggregationOp, BlockSource, MetricBlock, evaluate_block};
use crate::comparison::{ComparisonMode, ComparisonResult, compare, compare_with};
use crate::timerange::{Granularity, TimeRange, TimeWindow};

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn schema() -> Schema {
    Schema::new(
        vec![SchemaObject::new(
            "payments",
            vec![
                SchemaField::new("amount", FieldType::Number),
                SchemaField::new("created", FieldType::Date),
            ],
        )],
        vec![],
    )
    .unwrap()
}

fn warehouse() -> Warehouse {
    let mut wh = Warehouse::new();
    let rows = [
        (15.0, at(2024, 1, 5)),
        (25.0, at(2024, 1, 6)),
        (10.0, at(2024, 1, 8)),
        (20.0, at(2024, 1, 9)),
        (30.0, at(2024, 1, 10)),
        (7.0, at(2023, 1, 9)),
    ];
    wh.replace(
        "payments",
        rows.iter()
            .map(|(a, t)| Record::new().with("amount", *a).with("created", *t))
            .collect(),
    );
    wh
}

/// Jan 8 through Jan 10, daily
fn window() -> TimeWindow {
    let range = TimeRange::parse("2024-01-08,2024-01-10").unwrap();
    TimeWindow::new(range, Granularity::Day)
}

fn block() -> MetricBlock {
    MetricBlock::new(
        "revenue",
        BlockSource::field("payments", "amount"),
        AggregationOp::Sum,
    )
}

fn run(mode: ComparisonMode) -> Option<ComparisonResult> {
    let (wh, schema) = (warehouse(), schema());
    let current = evaluate_block(&block(), &window(), &wh, &schema);
    compare(&block(), &window(), mode, &wh, &schema, &current)
}

#[test]
fn test_mode_parse() {
    assert_eq!(ComparisonMode::parse("none").unwrap(), ComparisonMode::None);
    assert_eq!(
        ComparisonMode::parse("previous_period").unwrap(),
        ComparisonMode::PreviousPeriod
    );
    assert_eq!(ComparisonMode::parse("YoY").unwrap(), ComparisonMode::PreviousYear);
    assert_eq!(
        ComparisonMode::parse("period_start").unwrap(),
        ComparisonMode::PeriodStart
    );
    assert!(ComparisonMode::parse("last_quarter").is_err());
}

#[test]
fn test_none_has_no_baseline() {
    assert!(run(ComparisonMode::None).is_none());
}

#[test]
fn test_previous_period() {
    let result = run(ComparisonMode::PreviousPeriod).unwrap();

    // Jan 5 through Jan 7
    assert_eq!(result.baseline_value, Some(40.0));
    assert_eq!(result.delta, Some(20.0));
    assert_eq!(result.percent_delta, Some(0.5));

    let series = result.baseline_series.unwrap();
    assert_eq!(series.len(), 3);
    assert_eq!(series.points[0].date, "2024-01-05");
    assert_eq!(series.value_at(2), Some(0.0));
}

#[test]
fn test_previous_period_boundary_at_midnight() {
    let schema = schema();
    let mut wh = Warehouse::new();
    let just_before = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 23, 59, 59).unwrap();
    wh.replace(
        "payments",
        vec![
            Record::new()
                .with("amount", 100.0)
                .with("created", just_before(2023, 12, 31)),
            Record::new()
                .with("amount", 40.0)
                .with("created", just_before(2024, 1, 7) + Duration::milliseconds(500)),
        ],
    );

    let window = TimeWindow {
        start: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
        granularity: Granularity::Day,
    };
    let current = evaluate_block(&block(), &window, &wh, &schema);
    let result = compare(
        &block(),
        &window,
        ComparisonMode::PreviousPeriod,
        &wh,
        &schema,
        &current,
    )
    .unwrap();

    assert_eq!(result.baseline_value, Some(40.0));
    let baseline = result.baseline_series.unwrap();
    assert_eq!(baseline.len(), current.series.unwrap().len());
    assert_eq!(baseline.points[0].date, "2024-01-01");
    assert_eq!(baseline.value_at(6), Some(40.0));
}

#[test]
fn test_previous_year() {
    let result = run(ComparisonMode::PreviousYear).unwrap();
    assert_eq!(result.baseline_value, Some(7.0));
    assert_eq!(result.delta, Some(53.0));
}

#[test]
fn test_period_start_uses_first_bucket() {
    let result = run(ComparisonMode::PeriodStart).unwrap();
    assert_eq!(result.baseline_value, Some(10.0));
    assert_eq!(result.delta, Some(50.0));
    assert_eq!(result.percent_delta, Some(5.0));
    assert!(result.baseline_series.is_none());
}

#[test]
fn test_zero_or_missing_baseline_is_undefined() {
    let result = ComparisonResult::from_values(Some(10.0), Some(0.0));
    assert_eq!(result.delta, Some(10.0));
    assert!(result.percent_delta.is_none());

    let result = ComparisonResult::from_values(Some(10.0), None);
    assert!(result.delta.is_none());
    assert!(result.percent_delta.is_none());

    let result = ComparisonResult::from_values(None, Some(4.0));
    assert!(result.delta.is_none());
    assert!(result.percent_delta.is_none());

    let result = ComparisonResult::from_values(Some(3.0), Some(-4.0));
    assert_eq!(result.delta, Some(7.0));
    assert_eq!(result.percent_delta, Some(-1.75));
}

#[test]
fn test_compare_with_uses_shifted_window() {
    let result = compare_with(
        ComparisonMode::PreviousPeriod,
        &window(),
        Some(60.0),
        None,
        |w| {
            assert!(w.end < window().start);
            assert_eq!(w.range().days(), 3);
            (Some(40.0), None)
        },
    )
    .unwrap();
    assert_eq!(result.delta, Some(20.0));
    assert_eq!(result.percent_delta, Some(0.5));
}
