//! SQLite-backed key-value engine
//!
//! Documents are JSON values keyed by the table's key path. The engine knows
//! nothing about entity types; typed access lives in the repositories.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;

use super::schema::{self, IndexDef, SchemaRegistry, TableDef};
use crate::{Error, Result};

/// Embedded document store. One handle per application, shared by reference.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    tables: HashMap<&'static str, TableDef>,
    version: u32,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("version", &self.version)
            .field("tables", &self.tables.len())
            .finish()
    }
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist) and upgrade it
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_registry(path, &SchemaRegistry::current())
    }

    /// Open a database file against an explicit registry
    pub fn open_with_registry(path: &Path, registry: &SchemaRegistry) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::StorageUnavailable(format!("{}: {}", path.display(), e)))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| Error::StorageUnavailable(format!("{}: {}", path.display(), e)))?;
        Self::initialize(conn, registry)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_registry(&SchemaRegistry::current())
    }

    pub fn open_in_memory_with_registry(registry: &SchemaRegistry) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Self::initialize(conn, registry)
    }

    /// Apply pending upgrade steps, refusing stores newer than the registry
    fn initialize(mut conn: Connection, registry: &SchemaRegistry) -> Result<Self> {
        let found: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let supported = registry.max_version();
        if found > supported {
            return Err(Error::UnsupportedSchemaVersion { found, supported });
        }

        for migration in registry.pending(found) {
            tracing::info!(
                "Upgrading schema to v{} ({})",
                migration.version,
                migration.description
            );
            apply_migration(&mut conn, migration).map_err(|e| {
                Error::StorageUnavailable(format!(
                    "schema upgrade to v{} failed: {}",
                    migration.version, e
                ))
            })?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            tables: registry.tables(),
            version: found.max(supported),
        })
    }

    /// Schema version of the opened store
    pub fn schema_version(&self) -> u32 {
        self.version
    }

    /// Names of every table in the current schema, sorted
    pub fn table_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tables.keys().copied().collect();
        names.sort_unstable();
        names
    }

    fn table(&self, name: &str) -> Result<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    fn index<'t>(&self, table: &'t TableDef, name: &str) -> Result<&'t IndexDef> {
        table.index(name).ok_or_else(|| Error::UnknownIndex {
            table: table.name.to_string(),
            index: name.to_string(),
        })
    }

    /// Run blocking SQLite work off the async executor
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| Error::StorageIo(format!("connection lock poisoned: {}", e)))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::StorageIo(e.to_string()))?
    }

    // ========== Reads ==========

    /// Every document in a table, in key order
    pub async fn get_all(&self, table: &str) -> Result<Vec<Value>> {
        let physical = schema::physical_table(self.table(table)?.name);
        tracing::debug!("get_all {}", table);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT doc FROM \"{}\" ORDER BY key", physical))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            Ok(decode_rows(rows))
        })
        .await
    }

    /// A single document by primary key
    pub async fn get(&self, table: &str, key: &str) -> Result<Option<Value>> {
        let physical = schema::physical_table(self.table(table)?.name);
        let key = key.to_string();
        tracing::debug!("get {}[{}]", table, key);
        self.with_conn(move |conn| {
            let doc: Option<String> = conn
                .query_row(
                    &format!("SELECT doc FROM \"{}\" WHERE key = ?1", physical),
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| serde_json::from_str(&d).map_err(Error::from))
                .transpose()
        })
        .await
    }

    /// Documents whose single-path index equals `value`
    pub async fn get_by_index(&self, table: &str, index: &str, value: &Value) -> Result<Vec<Value>> {
        let def = self.table(table)?;
        let index_def = self.index(def, index)?;
        if index_def.is_compound() {
            return Err(Error::InvalidRecord(format!(
                "index {} on {} is compound; use a compound lookup",
                index, table
            )));
        }
        self.scan_index(def, index_def, std::slice::from_ref(value)).await
    }

    /// Documents whose compound index equals the tuple `values` exactly
    pub async fn get_by_compound_index(
        &self,
        table: &str,
        index: &str,
        values: &[Value],
    ) -> Result<Vec<Value>> {
        let def = self.table(table)?;
        let index_def = self.index(def, index)?;
        if index_def.key_paths.len() != values.len() {
            return Err(Error::InvalidRecord(format!(
                "index {} on {} expects {} values, got {}",
                index,
                table,
                index_def.key_paths.len(),
                values.len()
            )));
        }
        self.scan_index(def, index_def, values).await
    }

    async fn scan_index(&self, def: &TableDef, index: &IndexDef, values: &[Value]) -> Result<Vec<Value>> {
        let predicate: Vec<String> = index
            .key_paths
            .iter()
            .enumerate()
            .map(|(i, path)| format!("{} IS ?{}", schema::key_expr(path), i + 1))
            .collect();
        let sql = format!(
            "SELECT doc FROM \"{}\" WHERE {} ORDER BY key",
            schema::physical_table(def.name),
            predicate.join(" AND ")
        );
        let bound: Vec<SqlValue> = values.iter().map(to_sql_value).collect();
        tracing::debug!("index scan {}.{} = {:?}", def.name, index.name, values);

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bound.iter()), |row| row.get::<_, String>(0))?;
            Ok(decode_rows(rows))
        })
        .await
    }

    /// Number of documents in a table
    pub async fn count(&self, table: &str) -> Result<usize> {
        let physical = schema::physical_table(self.table(table)?.name);
        self.with_conn(move |conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", physical), [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    // ========== Writes ==========

    /// Full-document upsert by primary key
    pub async fn put(&self, table: &str, doc: Value) -> Result<()> {
        let def = self.table(table)?;
        let physical = schema::physical_table(def.name);
        let key = document_key(def, &doc)?;
        let body = serde_json::to_string(&doc)?;
        tracing::debug!("put {}[{}]", table, key);
        self.with_conn(move |conn| {
            conn.execute(
                &upsert_sql(&physical),
                params![key, body],
            )?;
            Ok(())
        })
        .await
    }

    /// Upsert many documents in one transaction: all persist or none do
    pub async fn put_many(&self, table: &str, docs: Vec<Value>) -> Result<()> {
        let def = self.table(table)?;
        let physical = schema::physical_table(def.name);
        let mut rows = Vec::with_capacity(docs.len());
        for doc in &docs {
            rows.push((document_key(def, doc)?, serde_json::to_string(doc)?));
        }
        tracing::debug!("put_many {} ({} documents)", table, rows.len());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&upsert_sql(&physical))?;
                for (key, body) in &rows {
                    stmt.execute(params![key, body])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Delete one document; deleting a missing key is not an error
    pub async fn delete(&self, table: &str, key: &str) -> Result<()> {
        let physical = schema::physical_table(self.table(table)?.name);
        let key = key.to_string();
        tracing::debug!("delete {}[{}]", table, key);
        self.with_conn(move |conn| {
            conn.execute(&format!("DELETE FROM \"{}\" WHERE key = ?1", physical), [&key])?;
            Ok(())
        })
        .await
    }

    /// Remove every document from a table
    pub async fn clear(&self, table: &str) -> Result<()> {
        let physical = schema::physical_table(self.table(table)?.name);
        tracing::debug!("clear {}", table);
        self.with_conn(move |conn| {
            conn.execute(&format!("DELETE FROM \"{}\"", physical), [])?;
            Ok(())
        })
        .await
    }

    /// Row counts for every table
    pub async fn stats(&self) -> Result<StoreStats> {
        let mut tables = Vec::new();
        for name in self.table_names() {
            tables.push((name.to_string(), self.count(name).await?));
        }
        Ok(StoreStats { version: self.version, tables })
    }
}

/// Upsert on the primary key only; other unique indexes still reject
fn upsert_sql(physical: &str) -> String {
    format!(
        "INSERT INTO \"{}\" (key, doc) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET doc = excluded.doc",
        physical
    )
}

/// Extract the primary key from a document using the table's key path
fn document_key(def: &TableDef, doc: &Value) -> Result<String> {
    match lookup_path(doc, def.key_path) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Error::InvalidRecord(format!(
            "{} document has no usable key at '{}'",
            def.name, def.key_path
        ))),
    }
}

/// Follow a dotted key path into a JSON document
pub(crate) fn lookup_path<'v>(doc: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(doc, |node, part| node.get(part))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// One migration in its own transaction
fn apply_migration(conn: &mut Connection, migration: &schema::Migration) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    for step in &migration.steps {
        for stmt in step.statements() {
            tx.execute_batch(&stmt)?;
        }
    }
    tx.pragma_update(None, "user_version", migration.version)?;
    tx.commit()
}

/// Decode stored documents, skipping any that no longer read or parse
fn decode_rows(rows: impl Iterator<Item = rusqlite::Result<String>>) -> Vec<Value> {
    rows.filter_map(|row| match row {
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::warn!("Skipping unreadable row: {}", e);
            None
        }
    })
    .filter_map(|doc| match serde_json::from_str(&doc) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Skipping undecodable document: {}", e);
            None
        }
    })
    .collect()
}

/// Store statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub version: u32,
    pub tables: Vec<(String, usize)>,
}

impl StoreStats {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Store Statistics (schema v{}):", self.version)?;
        for (table, rows) in &self.tables {
            writeln!(f, "  {}: {}", table, rows)?;
        }
        write!(f, "  Total rows: {}", self.total_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{indexes, tables};
    use serde_json::json;

    fn piece(id: &str, sn: &str, product: &str) -> Value {
        json!({ "id": id, "sn": sn, "product_id": product, "hours": 0.0, "trips": 0, "starts": 0 })
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version(), 2);

        store.put(tables::PIECES, piece("p1", "SN-1", "prod-1")).await.unwrap();
        let doc = store.get(tables::PIECES, "p1").await.unwrap().unwrap();
        assert_eq!(doc["sn"], "SN-1");
        assert!(store.get(tables::PIECES, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_whole_document() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put(tables::PLANTS, json!({ "id": "pl1", "name": "North", "location": "Coast" }))
            .await
            .unwrap();
        store.put(tables::PLANTS, json!({ "id": "pl1", "name": "North" })).await.unwrap();

        let doc = store.get(tables::PLANTS, "pl1").await.unwrap().unwrap();
        assert!(doc.get("location").is_none());
        assert_eq!(store.count(tables::PLANTS).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_index_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put_many(
                tables::PIECES,
                vec![piece("p1", "SN-1", "a"), piece("p2", "SN-2", "a"), piece("p3", "SN-3", "b")],
            )
            .await
            .unwrap();

        let by_product = store
            .get_by_index(tables::PIECES, indexes::PRODUCT_ID, &json!("a"))
            .await
            .unwrap();
        assert_eq!(by_product.len(), 2);

        let by_sn = store.get_by_index(tables::PIECES, indexes::SN, &json!("SN-3")).await.unwrap();
        assert_eq!(by_sn.len(), 1);
        assert_eq!(by_sn[0]["id"], "p3");
    }

    #[tokio::test]
    async fn test_compound_index_exact_match() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, turbine, metric) in [("m1", "t1", "hours"), ("m2", "t1", "trips"), ("m3", "t2", "hours")] {
            store
                .put(
                    tables::TURBINE_METRICS,
                    json!({ "id": id, "turbine_id": turbine, "metric_type_code": metric }),
                )
                .await
                .unwrap();
        }

        let found = store
            .get_by_compound_index(tables::TURBINE_METRICS, indexes::TURBINE_METRIC, &[json!("t1"), json!("hours")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], "m1");

        let err = store
            .get_by_compound_index(tables::TURBINE_METRICS, indexes::TURBINE_METRIC, &[json!("t1")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicate() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(tables::PIECES, piece("p1", "SN-1", "a")).await.unwrap();
        let err = store.put(tables::PIECES, piece("p2", "SN-1", "a")).await.unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[tokio::test]
    async fn test_put_many_is_atomic() {
        let store = SqliteStore::open_in_memory().unwrap();
        let batch = vec![piece("p1", "SN-1", "a"), piece("p2", "SN-1", "a")];
        assert!(store.put_many(tables::PIECES, batch).await.is_err());
        assert_eq!(store.count(tables::PIECES).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_rows_are_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(tables::PIECES, piece("p1", "SN-1", "prod-1")).await.unwrap();
        store
            .with_conn(|conn| {
                conn.execute("INSERT INTO kv_pieces (key, doc) VALUES ('p2', X'00FF')", [])?;
                conn.execute("INSERT INTO kv_pieces (key, doc) VALUES ('p3', '{broken')", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let docs = store.get_all(tables::PIECES).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], "p1");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put_many(tables::PIECES, vec![piece("p1", "SN-1", "a"), piece("p2", "SN-2", "a")])
            .await
            .unwrap();

        store.delete(tables::PIECES, "p1").await.unwrap();
        store.delete(tables::PIECES, "p1").await.unwrap();
        assert_eq!(store.count(tables::PIECES).await.unwrap(), 1);

        store.clear(tables::PIECES).await.unwrap();
        assert!(store.get_all(tables::PIECES).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_and_index() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(store.count("nope").await, Err(Error::UnknownTable(_))));
        assert!(matches!(
            store.get_by_index(tables::PIECES, "nope", &json!(1)).await,
            Err(Error::UnknownIndex { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_key_is_invalid() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.put(tables::PLANTS, json!({ "name": "keyless" })).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[test]
    fn test_lookup_dotted_path() {
        let doc = json!({ "target": { "entity_type": "piece", "entity_id": "p1" } });
        assert_eq!(lookup_path(&doc, "target.entity_id"), Some(&json!("p1")));
        assert_eq!(lookup_path(&doc, "target.missing"), None);
    }

    #[test]
    fn test_refuses_newer_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", 7).unwrap();
        }
        let err = SqliteStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSchemaVersion { found: 7, supported: 2 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_failed_upgrade_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.db");
        {
            // Index creation on this table has no doc column to read
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE kv_turbines (key TEXT PRIMARY KEY)").unwrap();
        }
        let err = SqliteStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(err.is_fatal());

        let conn = Connection::open(&path).unwrap();
        let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0)).unwrap();
        assert_eq!(version, 0);
    }

    #[test]
    fn test_unavailable_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("store.db");
        let err = SqliteStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_v1_to_v2_upgrade_discards_flat_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let legacy = SqliteStore::open_with_registry(&path, &SchemaRegistry::up_to(1)).unwrap();
            assert_eq!(legacy.schema_version(), 1);
            legacy.put(tables::PIECES, json!({ "id": "old-1", "sn": "LEGACY-1" })).await.unwrap();
            legacy.put(tables::SITES, json!({ "id": "s1", "name": "Old site" })).await.unwrap();
            assert_eq!(legacy.count(tables::PIECES).await.unwrap(), 1);
        }

        let upgraded = SqliteStore::open(&path).unwrap();
        assert_eq!(upgraded.schema_version(), 2);
        // Flat rows are dropped, not migrated
        assert_eq!(upgraded.count(tables::PIECES).await.unwrap(), 0);
        assert!(matches!(upgraded.count(tables::SITES).await, Err(Error::UnknownTable(_))));
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(tables::PLANTS, json!({ "id": "pl1", "name": "North" })).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count(tables::PLANTS).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(tables::PLANTS, json!({ "id": "pl1", "name": "North" })).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_rows(), 1);
        assert!(stats.to_string().contains("plants: 1"));
    }
}
