//! Filter conditions and predicate evaluation
//!
//! A filter set is a list of field-scoped conditions combined with a single
//! AND/OR mode. Evaluation branches on the field's declared type and never
//! fails: type mismatches and malformed values make a condition false.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tally_warehouse::{
    FieldRef, FieldType, Record, Schema, Value, parse_bool, parse_date_only, parse_timestamp,
};

use crate::error::{AnalyticsError, Result};

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal (membership for multi-select values)
    Equals,
    /// Not equal (non-membership for multi-select values)
    NotEquals,
    /// Greater than
    GreaterThan,
    /// Greater than or equal
    GreaterOrEqual,
    /// Less than
    LessThan,
    /// Less than or equal
    LessOrEqual,
    /// Inclusive range, value is a 2-element list
    Between,
    /// Case-insensitive substring (string fields)
    Contains,
}

impl Operator {
    /// Parse operator from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "equals" | "eq" | "=" | "==" | "is" => Ok(Self::Equals),
            "not_equals" | "ne" | "!=" | "<>" | "is_not" => Ok(Self::NotEquals),
            "greater_than" | "gt" | ">" => Ok(Self::GreaterThan),
            "greater_or_equal" | "gte" | ">=" => Ok(Self::GreaterOrEqual),
            "less_than" | "lt" | "<" => Ok(Self::LessThan),
            "less_or_equal" | "lte" | "<=" => Ok(Self::LessOrEqual),
            "between" => Ok(Self::Between),
            "contains" | "like" => Ok(Self::Contains),
            _ => Err(AnalyticsError::InvalidOperator(s.to_string())),
        }
    }

    /// Human-readable form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not equals",
            Self::GreaterThan => "greater than",
            Self::GreaterOrEqual => "at least",
            Self::LessThan => "less than",
            Self::LessOrEqual => "at most",
            Self::Between => "between",
            Self::Contains => "contains",
        }
    }
}

/// A single comparison operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean literal
    Bool(bool),
    /// Numeric literal (dates may also be given as epoch milliseconds)
    Number(f64),
    /// Text literal (dates as RFC 3339 or `YYYY-MM-DD`)
    Text(String),
}

impl Scalar {
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(s) => parse_bool(s),
            Self::Number(_) => None,
        }
    }

    /// Text form used for string equality
    fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }

    /// The half-open instant span `[lo, hi)` this operand denotes on a date field
    ///
    /// A bare calendar date covers the whole day; a timestamp covers a
    /// single instant.
    fn as_date_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let instant = |t: DateTime<Utc>| (t, t + Duration::nanoseconds(1));
        match self {
            Self::Text(s) => {
                if let Some(day) = parse_date_only(s) {
                    let lo = day.and_time(chrono::NaiveTime::MIN).and_utc();
                    return Some((lo, lo + Duration::days(1)));
                }
                parse_timestamp(s).map(instant)
            }
            Self::Number(ms) => DateTime::from_timestamp_millis(*ms as i64).map(instant),
            Self::Bool(_) => None,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Condition value (blank, single, or list)
///
/// Decoded from JSON: `null`, `""` and `[]` are blank; arrays are lists
/// (multi-select, or the 2-tuple of `between`); anything else is single.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum ConditionValue {
    /// Field must be absent or empty
    #[default]
    Blank,
    /// Single operand
    Single(Scalar),
    /// Multiple operands
    List(Vec<Scalar>),
}

impl TryFrom<serde_json::Value> for ConditionValue {
    type Error = AnalyticsError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value as J;

        match value {
            J::Null => Ok(Self::Blank),
            J::String(s) if s.is_empty() => Ok(Self::Blank),
            J::Array(items) if items.is_empty() => Ok(Self::Blank),
            J::Array(items) => items
                .iter()
                .map(|item| {
                    Scalar::from_json(item).ok_or_else(|| {
                        AnalyticsError::InvalidFilter(format!("unsupported list item: {}", item))
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            J::Object(_) => Err(AnalyticsError::InvalidFilter(
                "condition value cannot be an object".to_string(),
            )),
            other => Scalar::from_json(&other)
                .map(Self::Single)
                .ok_or_else(|| AnalyticsError::InvalidFilter(format!("unsupported value: {}", other))),
        }
    }
}

impl From<ConditionValue> for serde_json::Value {
    fn from(value: ConditionValue) -> Self {
        fn scalar(s: Scalar) -> serde_json::Value {
            match s {
                Scalar::Bool(b) => serde_json::Value::Bool(b),
                Scalar::Number(n) => serde_json::Number::from_f64(n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                Scalar::Text(t) => serde_json::Value::String(t),
            }
        }

        match value {
            ConditionValue::Blank => serde_json::Value::Null,
            ConditionValue::Single(s) => scalar(s),
            ConditionValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(scalar).collect())
            }
        }
    }
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Field the condition applies to
    pub field: FieldRef,
    /// Operator for comparison
    pub operator: Operator,
    /// Value(s) to compare against
    #[serde(default)]
    pub value: ConditionValue,
}

impl FilterCondition {
    /// Create a condition
    pub fn new(field: FieldRef, operator: Operator, value: ConditionValue) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }

    /// Create an equality condition
    pub fn equals(field: FieldRef, value: impl Into<Scalar>) -> Self {
        Self::new(field, Operator::Equals, ConditionValue::Single(value.into()))
    }

    /// Create a not-equal condition
    pub fn not_equals(field: FieldRef, value: impl Into<Scalar>) -> Self {
        Self::new(field, Operator::NotEquals, ConditionValue::Single(value.into()))
    }

    /// Create a greater-than condition
    pub fn greater_than(field: FieldRef, value: impl Into<Scalar>) -> Self {
        Self::new(field, Operator::GreaterThan, ConditionValue::Single(value.into()))
    }

    /// Create a less-than condition
    pub fn less_than(field: FieldRef, value: impl Into<Scalar>) -> Self {
        Self::new(field, Operator::LessThan, ConditionValue::Single(value.into()))
    }

    /// Create an inclusive range condition
    pub fn between(field: FieldRef, low: impl Into<Scalar>, high: impl Into<Scalar>) -> Self {
        Self::new(
            field,
            Operator::Between,
            ConditionValue::List(vec![low.into(), high.into()]),
        )
    }

    /// Create a multi-select membership condition
    pub fn one_of(field: FieldRef, values: Vec<Scalar>) -> Self {
        let value = if values.is_empty() {
            ConditionValue::Blank
        } else {
            ConditionValue::List(values)
        };
        Self::new(field, Operator::Equals, value)
    }

    /// Create a blank test (field is absent or empty)
    pub fn blank(field: FieldRef) -> Self {
        Self::new(field, Operator::Equals, ConditionValue::Blank)
    }

    /// Create a contains condition
    pub fn contains(field: FieldRef, value: impl Into<String>) -> Self {
        Self::new(
            field,
            Operator::Contains,
            ConditionValue::Single(Scalar::Text(value.into())),
        )
    }

    /// Human-readable clause, e.g. `payments.status equals paid`
    pub fn describe(&self) -> String {
        match &self.value {
            ConditionValue::Blank if self.operator == Operator::NotEquals => {
                format!("{} is set", self.field)
            }
            ConditionValue::Blank => format!("{} is blank", self.field),
            ConditionValue::Single(s) => format!("{} {} {}", self.field, self.operator.as_str(), s),
            ConditionValue::List(items) if self.operator == Operator::Between && items.len() == 2 => {
                format!("{} between {} and {}", self.field, items[0], items[1])
            }
            ConditionValue::List(items) => {
                let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
                let op = match self.operator {
                    Operator::NotEquals => "not in",
                    Operator::Equals => "in",
                    other => other.as_str(),
                };
                format!("{} {} [{}]", self.field, op, joined.join(", "))
            }
        }
    }
}

/// How conditions in a set combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterLogic {
    /// Every condition must match
    #[default]
    And,
    /// At least one condition must match
    Or,
}

impl FilterLogic {
    /// Parse logic from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "and" | "all" => Ok(Self::And),
            "or" | "any" => Ok(Self::Or),
            _ => Err(AnalyticsError::InvalidFilter(format!("unknown logic: {}", s))),
        }
    }
}

/// A set of conditions with one combination mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    /// Conditions
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
    /// Applies across the whole set
    #[serde(default)]
    pub logic: FilterLogic,
}

impl FilterSet {
    /// An AND set of conditions
    pub fn all(conditions: Vec<FilterCondition>) -> Self {
        Self {
            conditions,
            logic: FilterLogic::And,
        }
    }

    /// An OR set of conditions
    pub fn any(conditions: Vec<FilterCondition>) -> Self {
        Self {
            conditions,
            logic: FilterLogic::Or,
        }
    }

    /// Add a condition
    pub fn with_condition(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Whether the set filters nothing
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// The conditions that target `object`, keeping the same logic
    pub fn for_object(&self, object: &str) -> Self {
        Self {
            conditions: self
                .conditions
                .iter()
                .filter(|c| c.field.object == object)
                .cloned()
                .collect(),
            logic: self.logic,
        }
    }

    /// Evaluate the set against a record of `object`
    pub fn matches(&self, object: &str, record: &Record, schema: &Schema) -> bool {
        evaluate(&self.conditions, self.logic, object, record, schema)
    }

    /// Summary using the first condition of each field
    pub fn describe(&self) -> String {
        let mut seen: Vec<&FieldRef> = Vec::new();
        let mut clauses = Vec::new();
        for condition in &self.conditions {
            if seen.contains(&&condition.field) {
                continue;
            }
            seen.push(&condition.field);
            clauses.push(condition.describe());
        }

        let sep = match self.logic {
            FilterLogic::And => " and ",
            FilterLogic::Or => " or ",
        };
        clauses.join(sep)
    }
}

/// Decide whether a record of `object` satisfies the conditions
///
/// An empty set always matches. A condition whose field does not resolve
/// for `object` fails an AND set and is ignored by an OR set.
pub fn evaluate(
    conditions: &[FilterCondition],
    logic: FilterLogic,
    object: &str,
    record: &Record,
    schema: &Schema,
) -> bool {
    if conditions.is_empty() {
        return true;
    }

    match logic {
        FilterLogic::And => conditions.iter().all(|c| match resolve(c, object, schema) {
            Some(field_type) => condition_matches(c, field_type, record),
            None => false,
        }),
        FilterLogic::Or => conditions.iter().any(|c| match resolve(c, object, schema) {
            Some(field_type) => condition_matches(c, field_type, record),
            None => false,
        }),
    }
}

fn resolve(condition: &FilterCondition, object: &str, schema: &Schema) -> Option<FieldType> {
    if condition.field.object != object {
        return None;
    }
    schema.field(&condition.field).map(|f| f.field_type)
}

/// Evaluate one condition against a record, given the field's declared type
pub fn condition_matches(condition: &FilterCondition, field_type: FieldType, record: &Record) -> bool {
    let value = record
        .get(&condition.field.field)
        .filter(|v| !v.is_blank());

    if let ConditionValue::Blank = condition.value {
        return match condition.operator {
            Operator::NotEquals => value.is_some(),
            _ => value.is_none(),
        };
    }

    if field_type == FieldType::Boolean {
        return value.is_some_and(|v| boolean_matches(&condition.value, v));
    }

    let Some(value) = value else {
        return condition.operator == Operator::NotEquals;
    };

    match (condition.operator, &condition.value) {
        (Operator::Equals, ConditionValue::Single(s)) => equals(value, s, field_type),
        (Operator::Equals, ConditionValue::List(items)) => {
            items.iter().any(|s| equals(value, s, field_type))
        }
        (Operator::NotEquals, ConditionValue::Single(s)) => !equals(value, s, field_type),
        (Operator::NotEquals, ConditionValue::List(items)) => {
            !items.iter().any(|s| equals(value, s, field_type))
        }
        (Operator::Between, ConditionValue::List(items))
            if items.len() == 2 && field_type.is_ordered() =>
        {
            between(value, &items[0], &items[1], field_type)
        }
        (Operator::Contains, ConditionValue::Single(s)) => contains(value, s),
        (Operator::Contains, ConditionValue::List(items)) => items.iter().any(|s| contains(value, s)),
        (op, ConditionValue::Single(s)) if is_ordering(op) && field_type.is_ordered() => {
            ordered(op, value, s, field_type)
        }
        _ => false,
    }
}

fn is_ordering(op: Operator) -> bool {
    matches!(
        op,
        Operator::GreaterThan | Operator::GreaterOrEqual | Operator::LessThan | Operator::LessOrEqual
    )
}

fn boolean_matches(expected: &ConditionValue, value: &Value) -> bool {
    let Some(actual) = value.as_bool() else {
        return false;
    };
    match expected {
        ConditionValue::Single(s) => s.as_bool() == Some(actual),
        ConditionValue::List(items) => items.iter().any(|s| s.as_bool() == Some(actual)),
        ConditionValue::Blank => false,
    }
}

fn equals(value: &Value, operand: &Scalar, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String => value.as_str() == Some(operand.as_text().as_str()),
        FieldType::Number => match (value.as_f64(), operand.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        FieldType::Date => match (value.as_date(), operand.as_date_span()) {
            (Some(t), Some((lo, hi))) => lo <= t && t < hi,
            _ => false,
        },
        FieldType::Boolean => value.as_bool().is_some_and(|b| operand.as_bool() == Some(b)),
    }
}

fn ordered(op: Operator, value: &Value, operand: &Scalar, field_type: FieldType) -> bool {
    match field_type {
        FieldType::Number => {
            let (Some(a), Some(b)) = (value.as_f64(), operand.as_number()) else {
                return false;
            };
            match op {
                Operator::GreaterThan => a > b,
                Operator::GreaterOrEqual => a >= b,
                Operator::LessThan => a < b,
                Operator::LessOrEqual => a <= b,
                _ => false,
            }
        }
        FieldType::Date => {
            let (Some(t), Some((lo, hi))) = (value.as_date(), operand.as_date_span()) else {
                return false;
            };
            match op {
                Operator::GreaterThan => t >= hi,
                Operator::GreaterOrEqual => t >= lo,
                Operator::LessThan => t < lo,
                Operator::LessOrEqual => t < hi,
                _ => false,
            }
        }
        FieldType::String | FieldType::Boolean => false,
    }
}

fn between(value: &Value, low: &Scalar, high: &Scalar, field_type: FieldType) -> bool {
    match field_type {
        FieldType::Number => match (value.as_f64(), low.as_number(), high.as_number()) {
            (Some(v), Some(lo), Some(hi)) => lo <= v && v <= hi,
            _ => false,
        },
        FieldType::Date => match (value.as_date(), low.as_date_span(), high.as_date_span()) {
            (Some(t), Some((lo, _)), Some((_, hi))) => lo <= t && t < hi,
            _ => false,
        },
        FieldType::String | FieldType::Boolean => false,
    }
}

fn contains(value: &Value, operand: &Scalar) -> bool {
    match (value.as_str(), operand) {
        (Some(haystack), Scalar::Text(needle)) => {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        }
        _ => false,
    }
}
