//! Tests for time series types

use chrono::{TimeZone, Utc};

use crate::timerange::{Granularity, TimeRange, TimeWindow, bucketize};
use crate::timeseries::{GroupedSeries, Series, SeriesGroup, SeriesPoint};

fn series(values: &[Option<f64>]) -> Series {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, values.len() as u32, 12, 0, 0).unwrap();
    let window = TimeWindow::new(TimeRange::new(start, end).unwrap(), Granularity::Day);
    let points = bucketize(&window)
        .iter()
        .zip(values)
        .map(|(b, v)| SeriesPoint::new(b, *v))
        .collect();
    Series::from_points(points)
}

#[test]
fn test_point_from_bucket() {
    let s = series(&[Some(10.0)]);
    let point = &s.points[0];
    assert_eq!(point.index, 0);
    assert_eq!(point.date, "2024-01-01");
    assert_eq!(point.value, Some(10.0));

    let cleared = point.with_value(None);
    assert_eq!(cleared.date, "2024-01-01");
    assert!(cleared.value.is_none());
}

#[test]
fn test_series_empty() {
    let s = Series::default();
    assert!(s.is_empty());
    assert!(s.total().is_none());
    assert!(s.stats().is_none());
    assert!(s.first_value().is_none());
}

#[test]
fn test_series_stats_skip_undefined() {
    let s = series(&[Some(10.0), None, Some(30.0), Some(20.0)]);

    assert_eq!(s.len(), 4);
    assert_eq!(s.total(), Some(60.0));

    let stats = s.stats().unwrap();
    assert_eq!(stats.total, 60.0);
    assert_eq!(stats.min, 10.0);
    assert_eq!(stats.max, 30.0);
    assert_eq!(stats.avg, 20.0);
}

#[test]
fn test_series_all_undefined_has_no_total() {
    let s = series(&[None, None]);
    assert_eq!(s.len(), 2);
    assert!(s.total().is_none());
}

#[test]
fn test_series_lookup_by_index() {
    let s = series(&[Some(1.0), None, Some(3.0)]);
    assert_eq!(s.value_at(0), Some(1.0));
    assert_eq!(s.value_at(1), None);
    assert_eq!(s.value_at(2), Some(3.0));
    assert!(s.get(7).is_none());
    assert_eq!(s.first_value(), Some(1.0));
}

#[test]
fn test_grouped_series_lookup() {
    let grouped = GroupedSeries::from_groups(vec![
        SeriesGroup::new("paid", Some(30.0), None),
        SeriesGroup::new("failed", Some(30.0), Some(series(&[Some(30.0)]))),
    ]);

    assert!(!grouped.is_empty());
    assert_eq!(grouped.group("paid").unwrap().total, Some(30.0));
    assert!(grouped.group("failed").unwrap().series.is_some());
    assert!(grouped.group("refunded").is_none());
}

#[test]
fn test_series_serialization() {
    let s = series(&[Some(100.0), None]);

    let json = serde_json::to_string(&s).unwrap();
    assert!(json.contains("2024-01-01"));
    assert!(json.contains("null"));

    let parsed: Series = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, s);
}
