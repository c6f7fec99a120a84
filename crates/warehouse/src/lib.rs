//! Tally Warehouse - schema registry and record store
//!
//! The data side of the metric engine:
//!
//! - **Schema**: objects, typed fields, enums, and relationships
//! - **Values**: tagged values decoded against the declared field type
//! - **Warehouse**: ordered per-object record arrays plus a version token
//!
//! # Usage
//!
//! ```ignore
//! use tally_warehouse::{Schema, Warehouse};
//!
//! let schema = Schema::from_file("schema.json")?;
//! let warehouse = Warehouse::from_file(&schema, "warehouse.json")?;
//!
//! println!("version {}", warehouse.version());
//! for record in warehouse.records("payments") {
//!     println!("{:?}", record.get("amount"));
//! }
//! ```

pub mod error;
pub mod schema;
pub mod store;
pub mod value;

// Re-exports
pub use error::{Result, WarehouseError};
pub use schema::{
    FieldRef, FieldType, Relationship, RelationshipType, Schema, SchemaField, SchemaObject,
};
pub use store::{Record, Warehouse};
pub use value::{Value, parse_bool, parse_date_only, parse_timestamp};
