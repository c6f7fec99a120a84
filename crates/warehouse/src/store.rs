//! Versioned in-memory record warehouse
//!
//! Records live in ordered sequences keyed by object name. Every mutation
//! bumps `version`, which is the only thing derived caches may key on:
//! records can change in place, so object identity says nothing.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, WarehouseError};
use crate::schema::{Schema, SchemaObject};
use crate::value::Value;

/// A single record: field name to decoded value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: HashMap<String, Value>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Set a field
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Remove a field, making it absent
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether the field is absent or an empty string
    pub fn is_blank(&self, field: &str) -> bool {
        self.get(field).is_none_or(Value::is_blank)
    }

    /// Number of present fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decode a raw JSON object against an optional schema object
    fn decode(raw: &serde_json::Map<String, serde_json::Value>, object: Option<&SchemaObject>) -> Self {
        let mut record = Record::new();
        for (name, raw_value) in raw {
            let decoded = match object.and_then(|o| o.field(name)) {
                Some(field) => {
                    let value = Value::decode(raw_value, field.field_type);
                    if value.is_none() && !raw_value.is_null() {
                        tracing::warn!(
                            field = name.as_str(),
                            expected = ?field.field_type,
                            raw = %raw_value,
                            "dropping undecodable value"
                        );
                    }
                    value
                }
                None => Value::infer(raw_value),
            };
            if let Some(value) = decoded {
                record.fields.insert(name.clone(), value);
            }
        }
        record
    }
}

/// The in-memory warehouse
#[derive(Debug, Clone, Default, Serialize)]
pub struct Warehouse {
    data: BTreeMap<String, Vec<Record>>,
    version: u64,
}

impl Warehouse {
    /// Create an empty warehouse at version 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version token
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Records of an object, in insertion order (empty when unknown)
    pub fn records(&self, object: &str) -> &[Record] {
        self.data.get(object).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the warehouse holds any records for the object
    pub fn has_records(&self, object: &str) -> bool {
        !self.records(object).is_empty()
    }

    /// Replace an object's records
    pub fn replace(&mut self, object: impl Into<String>, records: Vec<Record>) {
        self.data.insert(object.into(), records);
        self.bump();
    }

    /// Append a record
    pub fn push(&mut self, object: impl Into<String>, record: Record) {
        self.data.entry(object.into()).or_default().push(record);
        self.bump();
    }

    /// Set (or clear, with `None`) one field of one record in place
    pub fn patch(
        &mut self,
        object: &str,
        index: usize,
        field: &str,
        value: Option<Value>,
    ) -> Result<()> {
        let records = self
            .data
            .get_mut(object)
            .ok_or_else(|| WarehouseError::UnknownObject(object.to_string()))?;
        let record = records
            .get_mut(index)
            .ok_or_else(|| WarehouseError::RecordOutOfRange {
                object: object.to_string(),
                index,
            })?;

        match value {
            Some(value) => record.set(field, value),
            None => {
                record.unset(field);
            }
        }
        self.bump();
        Ok(())
    }

    /// Remove a record, returning it
    pub fn remove(&mut self, object: &str, index: usize) -> Result<Record> {
        let records = self
            .data
            .get_mut(object)
            .ok_or_else(|| WarehouseError::UnknownObject(object.to_string()))?;
        if index >= records.len() {
            return Err(WarehouseError::RecordOutOfRange {
                object: object.to_string(),
                index,
            });
        }
        let record = records.remove(index);
        self.bump();
        Ok(record)
    }

    /// Decode a `{ "object": [ {..}, .. ] }` JSON snapshot
    pub fn from_json(schema: &Schema, json: &str) -> Result<Self> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut warehouse = Warehouse::new();

        for (name, rows) in raw {
            let object = schema.object(&name);
            if object.is_none() {
                tracing::warn!(object = name.as_str(), "object not declared in schema");
            }

            let rows = rows.as_array().ok_or_else(|| {
                WarehouseError::Serialization(format!("'{}' must be an array of records", name))
            })?;

            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let row = row.as_object().ok_or_else(|| {
                    WarehouseError::Serialization(format!("'{}' contains a non-object record", name))
                })?;
                records.push(Record::decode(row, object));
            }

            tracing::debug!(object = name.as_str(), records = records.len(), "decoded records");
            warehouse.data.insert(name, records);
        }

        warehouse.version = 1;
        Ok(warehouse)
    }

    /// Load a JSON snapshot from disk
    pub fn from_file<P: AsRef<Path>>(schema: &Schema, path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| WarehouseError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(schema, &contents)
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, SchemaField};

    fn schema() -> Schema {
        Schema::new(
            vec![SchemaObject::new(
                "payments",
                vec![
                    SchemaField::new("amount", FieldType::Number),
                    SchemaField::new("status", FieldType::String),
                    SchemaField::new("created", FieldType::Date),
                ],
            )],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_mutations_bump_version() {
        let mut wh = Warehouse::new();
        assert_eq!(wh.version(), 0);

        wh.push("payments", Record::new().with("amount", 10.0));
        assert_eq!(wh.version(), 1);

        wh.replace("payments", vec![Record::new().with("amount", 20.0)]);
        assert_eq!(wh.version(), 2);

        wh.patch("payments", 0, "amount", Some(Value::Number(30.0)))
            .unwrap();
        assert_eq!(wh.version(), 3);
        assert_eq!(
            wh.records("payments")[0].get("amount"),
            Some(&Value::Number(30.0))
        );

        wh.remove("payments", 0).unwrap();
        assert_eq!(wh.version(), 4);
        assert!(!wh.has_records("payments"));
    }

    #[test]
    fn test_failed_mutation_keeps_version() {
        let mut wh = Warehouse::new();
        assert!(wh.patch("payments", 0, "amount", None).is_err());
        wh.push("payments", Record::new());
        assert!(wh.remove("payments", 5).is_err());
        assert_eq!(wh.version(), 1);
    }

    #[test]
    fn test_unknown_object_has_no_records() {
        let wh = Warehouse::new();
        assert!(wh.records("nope").is_empty());
    }

    #[test]
    fn test_from_json_decodes_by_schema() {
        let json = r#"{
            "payments": [
                {"amount": "10", "status": "paid", "created": "2024-01-02"},
                {"amount": "oops", "status": "", "note": "vip"}
            ]
        }"#;
        let wh = Warehouse::from_json(&schema(), json).unwrap();
        let records = wh.records("payments");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("amount"), Some(&Value::Number(10.0)));
        assert!(records[0].get("created").unwrap().as_date().is_some());
        assert!(records[1].get("amount").is_none());
        assert!(records[1].is_blank("status"));
        assert_eq!(records[1].get("note"), Some(&Value::from("vip")));
        assert_eq!(wh.version(), 1);
    }

    #[test]
    fn test_from_json_rejects_non_arrays() {
        assert!(Warehouse::from_json(&schema(), r#"{"payments": 3}"#).is_err());
        assert!(Warehouse::from_json(&schema(), r#"{"payments": [1]}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.json");
        fs::write(&path, r#"{"payments": [{"amount": 5}]}"#).unwrap();

        let wh = Warehouse::from_file(&schema(), &path).unwrap();
        assert_eq!(wh.records("payments").len(), 1);

        assert!(Warehouse::from_file(&schema(), dir.path().join("missing.json")).is_err());
    }
}
