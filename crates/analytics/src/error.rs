//! Analytics error types
//!
//! Only parsing and selection can fail. Computation never errors: malformed
//! or partial configuration degrades to "no data" instead.

use thiserror::Error;

/// Analytics errors
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Invalid filter syntax
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Invalid time range
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    /// Invalid granularity
    #[error("invalid granularity: {0}")]
    InvalidGranularity(String),

    /// Invalid operator
    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    /// Invalid comparison mode
    #[error("invalid comparison mode: {0}")]
    InvalidComparison(String),

    /// Invalid aggregation operator or type
    #[error("invalid aggregation: {0}")]
    InvalidAggregation(String),

    /// Group-by selection cap reached
    #[error("cannot select more than {max} group values")]
    SelectionLimit {
        /// Configured maximum
        max: usize,
    },

    /// Schema or warehouse error
    #[error("warehouse error: {0}")]
    Warehouse(#[from] tally_warehouse::WarehouseError),
}

/// Result type for analytics operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;
