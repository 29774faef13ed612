//! Storage Layer - schemaless documents on embedded SQLite
//!
//! One physical table per logical table:
//! - kv_<table>(key, doc) where `doc` is the JSON form of an entity
//! - expression indexes over `json_extract(doc, '$.<path>')`
//!
//! The schema version marker is `PRAGMA user_version`.

pub mod schema;
pub mod sqlite;

pub use schema::{SchemaRegistry, TableDef, IndexDef, UpgradeStep, Migration};
pub use sqlite::{SqliteStore, StoreStats};
