//! # Plantkeeper - Local asset ledger
//!
//! Tracks plants, turbines, components and serialized pieces, and the way
//! pieces and components move between owners over time.
//!
//! Plantkeeper provides:
//! - A schemaless, indexed key-value engine on an embedded SQLite file
//! - A versioned schema registry with forward-only upgrade steps
//! - Typed repositories, one per table
//! - A temporal assignment manager (at most one active membership per subject)
//! - Read models joined on demand, plus display-row adapters

pub mod storage;
pub mod model;
pub mod repository;
pub mod assignment;
pub mod query;
pub mod adapter;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use storage::{SqliteStore, SchemaRegistry};
pub use repository::{Repository, Repositories};
pub use assignment::{AssignmentManager, AssignmentEvent, OnOccupied, OwnerRef};
pub use query::QueryEngine;

/// Result type alias for Plantkeeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Plantkeeper operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage error: {0}")]
    StorageIo(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Unsupported schema version {found} (this build knows up to {supported})")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown index {index} on table {table}")]
    UnknownIndex { table: String, index: String },

    #[error("{table} record not found: {key}")]
    NotFound { table: String, key: String },

    #[error("Position {position} on {owner_id} is occupied by {occupant_id}")]
    PositionOccupied {
        owner_id: String,
        position: String,
        occupant_id: String,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// Structured error taxonomy callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StorageUnavailable,
    StorageIo,
    SchemaVersionConflict,
    ConsistencyWarning,
    PositionOccupied,
    NotFound,
    InvalidInput,
}

impl Error {
    /// Map the error onto its taxonomy kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Error::StorageIo(_) | Error::Constraint(_) => ErrorKind::StorageIo,
            Error::UnsupportedSchemaVersion { .. } => ErrorKind::SchemaVersionConflict,
            Error::PositionOccupied { .. } => ErrorKind::PositionOccupied,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::UnknownTable(_)
            | Error::UnknownIndex { .. }
            | Error::InvalidRecord(_)
            | Error::Config(_) => ErrorKind::InvalidInput,
        }
    }

    /// Only store-open and schema-upgrade failures are fatal
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StorageUnavailable | ErrorKind::SchemaVersionConflict
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => Self::Constraint(e.to_string()),
            _ => Self::StorageIo(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidRecord(e.to_string())
    }
}
