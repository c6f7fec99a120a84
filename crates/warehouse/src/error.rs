//! Warehouse error types

/// Errors that can occur while loading a schema or warehouse snapshot
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Failed to read a snapshot file
    #[error("failed to read '{path}': {source}")]
    Io {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Snapshot is not valid JSON or does not match the expected shape
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Warehouse JSON references an object the schema does not declare
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// Schema declares the same object or field twice
    #[error("duplicate {kind} '{name}'")]
    Duplicate {
        /// "object" or "field"
        kind: &'static str,
        /// Offending name
        name: String,
    },

    /// A relationship points at an undeclared object
    #[error("relationship {from} -> {to} references an unknown object")]
    DanglingRelationship {
        /// Source object
        from: String,
        /// Target object
        to: String,
    },

    /// Record index out of bounds for a patch/remove
    #[error("record {index} out of range for object '{object}'")]
    RecordOutOfRange {
        /// Object name
        object: String,
        /// Requested index
        index: usize,
    },

    /// Malformed field reference (expected `object.field`)
    #[error("invalid field reference: {0}")]
    InvalidFieldRef(String),
}

impl From<serde_json::Error> for WarehouseError {
    fn from(err: serde_json::Error) -> Self {
        WarehouseError::Serialization(err.to_string())
    }
}

/// Result type for warehouse operations
pub type Result<T> = std::result::Result<T, WarehouseError>;
