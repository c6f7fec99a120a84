//! Time ranges, windows, and bucketing
//!
//! Supports predefined ranges (7d, 30d, ytd) and custom date ranges, the
//! comparison period shifts (previous period, year-over-year), and division
//! of a window into calendar-aligned buckets.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tally_warehouse::Record;

use crate::error::{AnalyticsError, Result};

/// Upper bound on buckets per window; the last bucket absorbs the remainder
pub const MAX_BUCKETS: usize = 10_000;

/// Time granularity for bucketing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Calendar days
    #[default]
    Day,
    /// Weeks starting on Monday
    Week,
    /// Calendar months
    Month,
    /// Calendar quarters
    Quarter,
    /// Calendar years
    Year,
}

impl Granularity {
    /// Parse granularity from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "day" | "daily" | "1d" => Ok(Self::Day),
            "week" | "weekly" | "1w" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            "quarter" | "quarterly" => Ok(Self::Quarter),
            "year" | "yearly" | "1y" => Ok(Self::Year),
            _ => Err(AnalyticsError::InvalidGranularity(s.to_string())),
        }
    }

    /// Start of the calendar unit containing `dt`
    pub fn align(&self, dt: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Day => start_of_day(dt),
            Self::Week => start_of_week(dt),
            Self::Month => start_of_month(dt),
            Self::Quarter => start_of_quarter(dt),
            Self::Year => start_of_year(dt),
        }
    }

    /// Start of the unit following the one that starts at `dt`
    pub fn advance(&self, dt: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Day => dt + Duration::days(1),
            Self::Week => dt + Duration::weeks(1),
            Self::Month => shift_months(dt, 1),
            Self::Quarter => shift_months(dt, 3),
            Self::Year => shift_months(dt, 12),
        }
    }

    /// Display label for the bucket starting at `dt`
    pub fn label(&self, dt: DateTime<Utc>) -> String {
        match self {
            Self::Day | Self::Week => dt.format("%Y-%m-%d").to_string(),
            Self::Month => dt.format("%Y-%m").to_string(),
            Self::Quarter => format!("{}-Q{}", dt.year(), (dt.month() - 1) / 3 + 1),
            Self::Year => dt.format("%Y").to_string(),
        }
    }
}

/// A time range for analytics queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the range (inclusive)
    pub start: DateTime<Utc>,
    /// End of the range (inclusive)
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(AnalyticsError::InvalidTimeRange(
                "end must be after start".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Parse a time range string relative to the current time
    ///
    /// Supported formats:
    /// - Relative: `24h`, `7d`, `4w`, `30d`, `1y`
    /// - Predefined: `today`, `yesterday`, `wtd`, `mtd`, `qtd`, `ytd`, `3m`, `6m`, `12m`
    /// - Custom: `2024-01-01,2024-01-31`
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_at(s, Utc::now())
    }

    /// Parse a time range string relative to `now`
    pub fn parse_at(s: &str, now: DateTime<Utc>) -> Result<Self> {
        let s = s.trim().to_lowercase();

        if let Some(range) = Self::parse_predefined(&s, now) {
            return Ok(range);
        }

        if let Some(range) = Self::parse_relative(&s, now) {
            return Ok(range);
        }

        if let Some(range) = Self::parse_custom(&s)? {
            return Ok(range);
        }

        Err(AnalyticsError::InvalidTimeRange(format!(
            "unknown time range format: {}",
            s
        )))
    }

    /// The preceding period of equal length, `[start - length, start)`
    ///
    /// The end is the last instant before `start`, so the two ranges are
    /// adjacent without overlapping.
    pub fn previous_period(&self) -> Self {
        let length = self.end - self.start;
        Self {
            start: self.start - length,
            end: self.start - Duration::nanoseconds(1),
        }
    }

    /// Get the same calendar period from the previous year
    pub fn previous_year(&self) -> Self {
        Self {
            start: shift_months(self.start, -12),
            end: shift_months(self.end, -12),
        }
    }

    /// Get the duration of this range
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Get the number of calendar days in this range (inclusive)
    pub fn days(&self) -> i64 {
        self.duration().num_days() + 1
    }

    /// Whether `t` falls inside the range, both ends included
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

impl TimeRange {
    fn parse_predefined(s: &str, now: DateTime<Utc>) -> Option<Self> {
        let today_start = start_of_day(now);
        let today_end = end_of_day(now);

        let start = match s {
            "today" => today_start,
            "yesterday" => {
                return Some(Self {
                    start: today_start - Duration::days(1),
                    end: today_end - Duration::days(1),
                });
            }
            "wtd" => start_of_week(now),
            "mtd" => start_of_month(now),
            "qtd" => start_of_quarter(now),
            "ytd" => start_of_year(now),
            // Calendar months, not 30-day approximations
            "3m" => start_of_day(shift_months(now, -3)),
            "6m" => start_of_day(shift_months(now, -6)),
            "12m" => start_of_day(shift_months(now, -12)),
            _ => return None,
        };

        Some(Self {
            start,
            end: today_end,
        })
    }

    fn parse_relative(s: &str, now: DateTime<Utc>) -> Option<Self> {
        let (num, unit) = extract_num_unit(s)?;

        // 7d means today plus the 6 previous days
        let duration = match unit {
            'h' => Duration::try_hours(num)?,
            'd' => Duration::try_days(num - 1)?,
            'w' => Duration::try_weeks(num)?.checked_sub(&Duration::days(1))?,
            'm' => Duration::try_days(num.checked_mul(30)? - 1)?,
            'y' => Duration::try_days(num.checked_mul(365)? - 1)?,
            _ => return None,
        };

        Some(Self {
            start: start_of_day(now.checked_sub_signed(duration)?),
            end: end_of_day(now),
        })
    }

    fn parse_custom(s: &str) -> Result<Option<Self>> {
        let Some((start, end)) = s.split_once(',') else {
            return Ok(None);
        };
        if end.contains(',') {
            return Ok(None);
        }

        let start = start_of_day_naive(parse_date(start.trim())?);
        let end = end_of_day_naive(parse_date(end.trim())?);

        Self::new(start, end).map(Some)
    }
}

/// A time window with its bucket granularity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window start (inclusive)
    pub start: DateTime<Utc>,
    /// Window end (inclusive)
    pub end: DateTime<Utc>,
    /// Bucket size
    pub granularity: Granularity,
}

impl TimeWindow {
    /// Create a window from a range and granularity
    pub fn new(range: TimeRange, granularity: Granularity) -> Self {
        Self {
            start: range.start,
            end: range.end,
            granularity,
        }
    }

    /// The window's range, without granularity
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }

    /// Whether `t` falls inside the window, both ends included
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// The preceding window of equal length, same granularity
    pub fn previous_period(&self) -> Self {
        Self::new(self.range().previous_period(), self.granularity)
    }

    /// The same window one calendar year earlier, same granularity
    pub fn previous_year(&self) -> Self {
        Self::new(self.range().previous_year(), self.granularity)
    }
}

/// One time bucket of a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Position in the window, from 0
    pub index: usize,
    /// Bucket start (inclusive)
    pub start: DateTime<Utc>,
    /// Bucket end (exclusive, except for the final bucket)
    pub end: DateTime<Utc>,
    /// Display label
    pub label: String,
    /// Whether `end` itself belongs to the bucket
    pub closed: bool,
}

impl Bucket {
    /// Whether `t` falls inside this bucket
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && (t < self.end || (self.closed && t == self.end))
    }
}

/// Divide a window into ordered buckets
///
/// The first bucket starts at the calendar unit containing `window.start`.
/// Buckets are half-open `[start, end)`; the final bucket ends at
/// `window.end` and is closed. An inverted window has no buckets.
pub fn bucketize(window: &TimeWindow) -> Vec<Bucket> {
    if window.end < window.start {
        return Vec::new();
    }

    let granularity = window.granularity;
    let mut buckets = Vec::new();
    let mut start = granularity.align(window.start);

    loop {
        let next = granularity.advance(start);
        let last = next >= window.end || next <= start || buckets.len() + 1 == MAX_BUCKETS;

        buckets.push(Bucket {
            index: buckets.len(),
            start,
            end: if last { window.end } else { next },
            label: granularity.label(start),
            closed: last,
        });

        if last {
            if buckets.len() == MAX_BUCKETS && next < window.end {
                tracing::warn!(
                    granularity = ?granularity,
                    max = MAX_BUCKETS,
                    "bucket limit reached, final bucket extended to window end"
                );
            }
            break;
        }
        start = next;
    }

    buckets
}

/// Assign a record to a bucket by its timestamp field
///
/// Returns `None` when the timestamp is missing, not a date, or outside
/// `[window.start, window.end]`.
pub fn assign(
    record: &Record,
    timestamp_field: &str,
    window: &TimeWindow,
    buckets: &[Bucket],
) -> Option<usize> {
    let t = record.get(timestamp_field)?.as_date()?;
    bucket_index(t, window, buckets)
}

/// Bucket index for a timestamp, `None` outside the window
pub fn bucket_index(t: DateTime<Utc>, window: &TimeWindow, buckets: &[Bucket]) -> Option<usize> {
    if !window.contains(t) {
        return None;
    }
    let idx = buckets.partition_point(|b| b.start <= t).checked_sub(1)?;
    buckets.get(idx).filter(|b| b.contains(t)).map(|b| b.index)
}

// Helper functions for date calculations

fn extract_num_unit(s: &str) -> Option<(i64, char)> {
    let unit = s.chars().last()?;
    if !unit.is_ascii_alphabetic() {
        return None;
    }

    let num: i64 = s[..s.len() - unit.len_utf8()].parse().ok()?;
    if num <= 0 {
        return None;
    }

    Some((num, unit))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        AnalyticsError::InvalidTimeRange(format!("invalid date format: {} (use YYYY-MM-DD)", s))
    })
}

fn start_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day_naive(dt.date_naive())
}

fn end_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    end_of_day_naive(dt.date_naive())
}

fn start_of_day_naive(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn end_of_day_naive(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .map(|t| t.and_utc())
        .unwrap_or_else(|| start_of_day_naive(date))
}

fn start_of_week(dt: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = dt.weekday().num_days_from_monday();
    start_of_day(dt - Duration::days(days_from_monday as i64))
}

fn start_of_month(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .with_day(1)
        .map(start_of_day_naive)
        .unwrap_or(dt)
}

fn start_of_quarter(dt: DateTime<Utc>) -> DateTime<Utc> {
    let quarter_start_month = ((dt.month() - 1) / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(dt.year(), quarter_start_month, 1)
        .map(start_of_day_naive)
        .unwrap_or(dt)
}

fn start_of_year(dt: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(dt.year(), 1, 1)
        .map(start_of_day_naive)
        .unwrap_or(dt)
}

/// Shift a date by a number of months (positive or negative)
///
/// If the target day doesn't exist (Mar 31 - 1 month, Feb 29 - 12 months),
/// the last day of the target month is used.
fn shift_months(dt: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let total = dt.year() * 12 + dt.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;

    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return dt;
    };
    let date = first
        .with_day(dt.day())
        .or_else(|| last_day_of_month(first))
        .unwrap_or(first);

    date.and_hms_nano_opt(dt.hour(), dt.minute(), dt.second(), dt.nanosecond())
        .map(|t| t.and_utc())
        .unwrap_or(dt)
}

/// Get the last day of the month for a given date
fn last_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = (date.year(), date.month());
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next_month.map(|d| d - Duration::days(1))
}
