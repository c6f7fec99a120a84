//! Schema registry
//!
//! Static object/field metadata describing what the warehouse holds. The
//! registry is loaded once and consumed read-only; filters, blocks and the
//! grouping engine branch on the declared [`FieldType`] rather than on
//! runtime value inspection.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WarehouseError};

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text (enums are strings with an allowed value list)
    String,
    /// 64-bit float
    Number,
    /// true/false
    Boolean,
    /// UTC timestamp
    Date,
}

impl FieldType {
    /// Whether values of this type have a meaningful ordering for
    /// greater/less/between comparisons
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Number | Self::Date)
    }
}

/// A field declared on a schema object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name, unique within its object
    pub name: String,
    /// Display label
    #[serde(default)]
    pub label: String,
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Allowed values for enum-like string fields
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl SchemaField {
    /// Create a field without enum metadata
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            field_type,
            enum_values: None,
        }
    }

    /// Create an enum-like string field
    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            enum_values: Some(values.iter().map(|v| v.to_string()).collect()),
            ..Self::new(name, FieldType::String)
        }
    }

    /// Set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// A schema object (a "table" of records in the warehouse)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaObject {
    /// Object name, also the warehouse key
    pub name: String,
    /// Display label
    #[serde(default)]
    pub label: String,
    /// Declared fields
    pub fields: Vec<SchemaField>,
    /// Field used to place records in time buckets.
    ///
    /// Defaults to the first `date` field when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_field: Option<String>,
}

impl SchemaObject {
    /// Create an object with the given fields
    pub fn new(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            fields,
            timestamp_field: None,
        }
    }

    /// Pin the timestamp field
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = Some(field.into());
        self
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The field used for time bucketing, if this object has one
    ///
    /// An explicitly configured `timestamp_field` wins only when it names a
    /// declared `date` field.
    pub fn timestamp(&self) -> Option<&str> {
        if let Some(name) = &self.timestamp_field {
            return self
                .field(name)
                .filter(|f| f.field_type == FieldType::Date)
                .map(|f| f.name.as_str());
        }
        self.fields
            .iter()
            .find(|f| f.field_type == FieldType::Date)
            .map(|f| f.name.as_str())
    }
}

/// Cardinality of a relationship, read from `from` towards `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Each `from` row links to at most one `to` row and vice versa
    OneToOne,
    /// Each `from` row owns many `to` rows (key lives on `to`)
    OneToMany,
    /// Many `from` rows point at one `to` row (key lives on `from`)
    ManyToOne,
}

/// A declared, directional relationship between two objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source object
    pub from: String,
    /// Target object
    pub to: String,
    /// Cardinality
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    /// Name of the key field; defaults to `{to}_id` on the `from` side, or
    /// `{from}_id` on the `to` side for one-to-many
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

impl Relationship {
    /// Create a relationship using the default key naming
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: RelationshipType) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            foreign_key: None,
        }
    }

    /// Override the key field name
    pub fn with_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// The object whose records carry the key field
    pub fn key_holder(&self) -> &str {
        match self.kind {
            RelationshipType::OneToMany => &self.to,
            RelationshipType::OneToOne | RelationshipType::ManyToOne => &self.from,
        }
    }

    /// The object whose `id` field the key references
    pub fn key_target(&self) -> &str {
        match self.kind {
            RelationshipType::OneToMany => &self.from,
            RelationshipType::OneToOne | RelationshipType::ManyToOne => &self.to,
        }
    }

    /// Name of the key field on [`Self::key_holder`]
    pub fn key_field(&self) -> String {
        match &self.foreign_key {
            Some(key) => key.clone(),
            None => format!("{}_id", self.key_target()),
        }
    }

    /// Whether this relationship connects `a` and `b` (either direction)
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }
}

/// Fully qualified pointer to a schema field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    /// Object name
    pub object: String,
    /// Field name
    pub field: String,
}

impl FieldRef {
    /// Create a field reference
    pub fn new(object: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            field: field.into(),
        }
    }

    /// Parse `object.field`
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().split_once('.') {
            Some((object, field)) if !object.is_empty() && !field.is_empty() => {
                Ok(Self::new(object, field))
            }
            _ => Err(WarehouseError::InvalidFieldRef(s.to_string())),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.field)
    }
}

impl FromStr for FieldRef {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The schema registry: objects plus their relationships
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Declared objects
    pub objects: Vec<SchemaObject>,
    /// Declared relationships
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Schema {
    /// Build and validate a schema
    pub fn new(objects: Vec<SchemaObject>, relationships: Vec<Relationship>) -> Result<Self> {
        let schema = Self {
            objects,
            relationships,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Parse a schema from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Load a schema from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| WarehouseError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Look up an object by name
    pub fn object(&self, name: &str) -> Option<&SchemaObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Look up the field a reference points at
    pub fn field(&self, field: &FieldRef) -> Option<&SchemaField> {
        self.object(&field.object)?.field(&field.field)
    }

    /// Resolve a reference to its object and field
    pub fn resolve(&self, field: &FieldRef) -> Option<(&SchemaObject, &SchemaField)> {
        let object = self.object(&field.object)?;
        let schema_field = object.field(&field.field)?;
        Some((object, schema_field))
    }

    /// The declared relationship between two objects, in either direction
    pub fn relationship_between(&self, a: &str, b: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.connects(a, b))
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for object in &self.objects {
            if !names.insert(object.name.as_str()) {
                return Err(WarehouseError::Duplicate {
                    kind: "object",
                    name: object.name.clone(),
                });
            }

            let mut fields = HashSet::new();
            for field in &object.fields {
                if !fields.insert(field.name.as_str()) {
                    return Err(WarehouseError::Duplicate {
                        kind: "field",
                        name: format!("{}.{}", object.name, field.name),
                    });
                }
            }
        }

        for rel in &self.relationships {
            if !names.contains(rel.from.as_str()) || !names.contains(rel.to.as_str()) {
                return Err(WarehouseError::DanglingRelationship {
                    from: rel.from.clone(),
                    to: rel.to.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payments() -> SchemaObject {
        SchemaObject::new(
            "payments",
            vec![
                SchemaField::new("id", FieldType::String),
                SchemaField::new("amount", FieldType::Number),
                SchemaField::enumeration("status", &["paid", "failed"]),
                SchemaField::new("created", FieldType::Date),
                SchemaField::new("customers_id", FieldType::String),
            ],
        )
    }

    #[test]
    fn test_field_ref_parse() {
        let r = FieldRef::parse("payments.amount").unwrap();
        assert_eq!(r, FieldRef::new("payments", "amount"));
        assert_eq!(r.to_string(), "payments.amount");

        assert!(FieldRef::parse("payments").is_err());
        assert!(FieldRef::parse(".amount").is_err());
        assert!(FieldRef::parse("payments.").is_err());
    }

    #[test]
    fn test_resolve() {
        let schema = Schema::new(vec![payments()], vec![]).unwrap();
        let (object, field) = schema
            .resolve(&FieldRef::new("payments", "status"))
            .unwrap();
        assert_eq!(object.name, "payments");
        assert_eq!(field.enum_values.as_ref().unwrap().len(), 2);

        assert!(schema.resolve(&FieldRef::new("payments", "nope")).is_none());
        assert!(schema.resolve(&FieldRef::new("nope", "amount")).is_none());
    }

    #[test]
    fn test_timestamp_field_defaults_to_first_date() {
        assert_eq!(payments().timestamp(), Some("created"));

        let pinned = payments().with_timestamp_field("amount");
        assert_eq!(pinned.timestamp(), None);

        let timeless = SchemaObject::new("tags", vec![SchemaField::new("name", FieldType::String)]);
        assert_eq!(timeless.timestamp(), None);
    }

    #[test]
    fn test_relationship_keys() {
        let rel = Relationship::new("payments", "customers", RelationshipType::ManyToOne);
        assert_eq!(rel.key_holder(), "payments");
        assert_eq!(rel.key_target(), "customers");
        assert_eq!(rel.key_field(), "customers_id");

        let rel = Relationship::new("customers", "payments", RelationshipType::OneToMany);
        assert_eq!(rel.key_holder(), "payments");
        assert_eq!(rel.key_field(), "customers_id");

        let rel = rel.with_foreign_key("customer");
        assert_eq!(rel.key_field(), "customer");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut object = payments();
        object.fields.push(SchemaField::new("amount", FieldType::Number));
        let err = Schema::new(vec![object], vec![]).unwrap_err();
        assert!(err.to_string().contains("payments.amount"));
    }

    #[test]
    fn test_dangling_relationship_rejected() {
        let rel = Relationship::new("payments", "customers", RelationshipType::ManyToOne);
        assert!(Schema::new(vec![payments()], vec![rel]).is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "objects": [
                {"name": "customers", "fields": [
                    {"name": "id", "type": "string"},
                    {"name": "plan", "type": "string", "enum": ["free", "pro"]}
                ]},
                {"name": "payments", "fields": [
                    {"name": "amount", "type": "number"},
                    {"name": "created", "type": "date"}
                ]}
            ],
            "relationships": [
                {"from": "payments", "to": "customers", "type": "many_to_one"}
            ]
        }"#;
        let schema = Schema::from_json(json).unwrap();
        assert_eq!(schema.objects.len(), 2);
        assert!(schema.relationship_between("customers", "payments").is_some());
        assert_eq!(
            schema.field(&FieldRef::new("payments", "created")).unwrap().field_type,
            FieldType::Date
        );
    }
}
