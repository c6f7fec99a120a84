//! Metrics engine
//!
//! Owns a schema snapshot and memoizes formula and group-value results.
//! Cache entries are keyed by the serialized request together with the
//! warehouse version, so any change to the data invalidates them without
//! the engine holding on to the warehouse itself.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;
use tally_warehouse::{FieldRef, Schema, Warehouse};

use crate::block::MetricBlock;
use crate::formula::{FormulaRequest, FormulaResult, compute_formula};
use crate::grouping::{
    DEFAULT_GROUP_VALUE_LIMIT, DEFAULT_MAX_SELECTIONS, GroupBySpec, GroupValue, evaluate_grouped,
    get_available_group_fields, get_group_values,
};
use crate::timerange::TimeWindow;
use crate::timeseries::GroupedSeries;

/// Default number of memoized results per cache
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Group values returned when the caller gives no limit
    pub group_value_limit: usize,
    /// Selection cap for new group-by specs
    pub max_group_selections: usize,
    /// Memoized results kept per cache; 0 disables memoization
    pub cache_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            group_value_limit: DEFAULT_GROUP_VALUE_LIMIT,
            max_group_selections: DEFAULT_MAX_SELECTIONS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    request: String,
    version: u64,
}

impl CacheKey {
    fn new<T: Serialize>(request: &T, version: u64) -> Option<Self> {
        match serde_json::to_string(request) {
            Ok(request) => Some(Self { request, version }),
            Err(e) => {
                tracing::warn!(error = %e, "request not cacheable");
                None
            }
        }
    }
}

/// Bounded cache evicting the oldest entry first
struct Memo<T> {
    capacity: usize,
    entries: HashMap<CacheKey, T>,
    order: VecDeque<CacheKey>,
}

impl<T: Clone> Memo<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<T> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, value: T) {
        if self.capacity == 0 || self.entries.contains_key(&key) {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Memoizing facade over the computation modules
///
/// Cached entries are keyed by the request and `Warehouse::version` only,
/// not by warehouse identity. Share one engine across warehouses only when
/// their versions never collide: two snapshots loaded separately both start
/// at version 1 and would read each other's entries. Call
/// [`Self::clear_cache`] when switching to another warehouse.
pub struct MetricsEngine {
    schema: Schema,
    options: EngineOptions,
    formulas: Mutex<Memo<FormulaResult>>,
    group_values: Mutex<Memo<Vec<GroupValue>>>,
}

impl MetricsEngine {
    /// Create an engine over a schema snapshot
    pub fn new(schema: Schema, options: EngineOptions) -> Self {
        Self {
            formulas: Mutex::new(Memo::new(options.cache_capacity)),
            group_values: Mutex::new(Memo::new(options.cache_capacity)),
            schema,
            options,
        }
    }

    /// The schema snapshot
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Engine options
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compute a formula, reusing the result for an unchanged request and
    /// warehouse version
    pub fn compute(&self, request: &FormulaRequest, warehouse: &Warehouse) -> FormulaResult {
        let key = CacheKey::new(request, warehouse.version());

        if let Some(key) = &key
            && let Some(hit) = self.formulas.lock().get(key)
        {
            tracing::debug!(version = warehouse.version(), "formula cache hit");
            return hit;
        }

        let result = compute_formula(request, warehouse, &self.schema);
        tracing::debug!(version = warehouse.version(), "formula cache miss");

        if let Some(key) = key {
            self.formulas.lock().insert(key, result.clone());
        }
        result
    }

    /// Candidate group-by fields for the selected objects
    pub fn group_fields(&self, selected_objects: &[String]) -> Vec<FieldRef> {
        get_available_group_fields(selected_objects, &self.schema)
    }

    /// Ranked distinct values of a field, memoized like [`Self::compute`]
    ///
    /// `limit` defaults to the configured group value limit.
    pub fn group_values(
        &self,
        warehouse: &Warehouse,
        field: &FieldRef,
        limit: Option<usize>,
        primary_object: Option<&str>,
    ) -> Vec<GroupValue> {
        let limit = limit.unwrap_or(self.options.group_value_limit);
        let key = CacheKey::new(&(field, limit, primary_object), warehouse.version());

        if let Some(key) = &key
            && let Some(hit) = self.group_values.lock().get(key)
        {
            tracing::debug!(field = %field, "group values cache hit");
            return hit;
        }

        let values = get_group_values(warehouse, &self.schema, field, limit, primary_object);

        if let Some(key) = key {
            self.group_values.lock().insert(key, values.clone());
        }
        values
    }

    /// Evaluate a block once per selected group value
    pub fn grouped(
        &self,
        block: &MetricBlock,
        window: &TimeWindow,
        group_by: &GroupBySpec,
        warehouse: &Warehouse,
    ) -> GroupedSeries {
        evaluate_grouped(block, window, group_by, warehouse, &self.schema)
    }

    /// A group-by spec carrying the configured selection cap
    pub fn new_group_by(&self, field: FieldRef) -> GroupBySpec {
        GroupBySpec::new(field).with_max_selections(self.options.max_group_selections)
    }

    /// Number of memoized formula results
    pub fn cached_formulas(&self) -> usize {
        self.formulas.lock().len()
    }

    /// Drop every memoized result
    pub fn clear_cache(&self) {
        self.formulas.lock().clear();
        self.group_values.lock().clear();
    }
}
