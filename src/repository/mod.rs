//! Entity repositories
//!
//! One typed repository per table over a shared store handle. Writes are
//! full-row upserts: callers read, modify and save whole records. Parent
//! existence is not checked here; the assignment manager and the query
//! layer own referential checks.

pub mod import;
pub mod lookups;

pub use import::{Dataset, seed_metric_types};

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::Result;
use crate::model::*;
use crate::storage::SqliteStore;

/// Typed access to one logical table
pub struct Repository<T: Record> {
    store: Arc<SqliteStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), _marker: PhantomData }
    }
}

impl<T: Record> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("table", &T::TABLE).finish()
    }
}

impl<T: Record> Repository<T> {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store, _marker: PhantomData }
    }

    pub fn table(&self) -> &'static str {
        T::TABLE
    }

    pub async fn get_all(&self) -> Result<Vec<T>> {
        let docs = self.store.get_all(T::TABLE).await?;
        Ok(decode_all(docs))
    }

    pub async fn get(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(T::TABLE, key).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store.get(T::TABLE, key).await?.is_some())
    }

    /// Upsert the whole record
    pub async fn save(&self, record: &T) -> Result<()> {
        let doc = serde_json::to_value(record)?;
        self.store.put(T::TABLE, doc).await.inspect_err(|e| {
            tracing::error!("Failed to save {}[{}]: {}", T::TABLE, record.key(), e);
        })
    }

    /// Upsert many records in one transaction
    pub async fn save_all(&self, records: &[T]) -> Result<()> {
        let docs = records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.store.put_many(T::TABLE, docs).await.inspect_err(|e| {
            tracing::error!("Failed to save {} {} records: {}", records.len(), T::TABLE, e);
        })
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(T::TABLE, key).await.inspect_err(|e| {
            tracing::error!("Failed to delete {}[{}]: {}", T::TABLE, key, e);
        })
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear(T::TABLE).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count(T::TABLE).await
    }

    /// Records whose single-path index equals `value`
    pub async fn by_index(&self, index: &str, value: impl Into<Value>) -> Result<Vec<T>> {
        let docs = self.store.get_by_index(T::TABLE, index, &value.into()).await?;
        Ok(decode_all(docs))
    }

    /// First record whose single-path index equals `value`
    pub async fn first_by_index(&self, index: &str, value: impl Into<Value>) -> Result<Option<T>> {
        Ok(self.by_index(index, value).await?.into_iter().next())
    }

    /// Records whose compound index equals `values` exactly
    pub async fn by_compound_index(&self, index: &str, values: &[Value]) -> Result<Vec<T>> {
        let docs = self.store.get_by_compound_index(T::TABLE, index, values).await?;
        Ok(decode_all(docs))
    }
}

fn decode_all<T: Record>(docs: Vec<Value>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match serde_json::from_value::<T>(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed {} record: {}", T::TABLE, e);
                None
            }
        })
        .collect()
}

/// One repository per table, all sharing one store handle
#[derive(Clone, Debug)]
pub struct Repositories {
    store: Arc<SqliteStore>,
    pub component_types: Repository<ComponentType>,
    pub use_statuses: Repository<UseStatus>,
    pub condition_codes: Repository<ConditionCode>,
    pub metric_types: Repository<TurbineMetricType>,
    pub plants: Repository<Plant>,
    pub plant_contacts: Repository<PlantContact>,
    pub turbines: Repository<Turbine>,
    pub metrics: Repository<TurbineOperationalMetric>,
    pub components: Repository<Component>,
    pub products: Repository<Product>,
    pub pieces: Repository<Piece>,
    pub component_pieces: Repository<ComponentPiece>,
    pub component_assignments: Repository<ComponentAssignment>,
    pub notes: Repository<Note>,
    pub note_links: Repository<NoteLink>,
    pub outage_events: Repository<OutageEvent>,
    pub outages: Repository<Outage>,
    pub repair_orders: Repository<RepairOrder>,
    pub repair_line_items: Repository<RepairLineItem>,
    pub status_colors: Repository<StatusColorSetting>,
}

impl Repositories {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            component_types: Repository::new(Arc::clone(&store)),
            use_statuses: Repository::new(Arc::clone(&store)),
            condition_codes: Repository::new(Arc::clone(&store)),
            metric_types: Repository::new(Arc::clone(&store)),
            plants: Repository::new(Arc::clone(&store)),
            plant_contacts: Repository::new(Arc::clone(&store)),
            turbines: Repository::new(Arc::clone(&store)),
            metrics: Repository::new(Arc::clone(&store)),
            components: Repository::new(Arc::clone(&store)),
            products: Repository::new(Arc::clone(&store)),
            pieces: Repository::new(Arc::clone(&store)),
            component_pieces: Repository::new(Arc::clone(&store)),
            component_assignments: Repository::new(Arc::clone(&store)),
            notes: Repository::new(Arc::clone(&store)),
            note_links: Repository::new(Arc::clone(&store)),
            outage_events: Repository::new(Arc::clone(&store)),
            outages: Repository::new(Arc::clone(&store)),
            repair_orders: Repository::new(Arc::clone(&store)),
            repair_line_items: Repository::new(Arc::clone(&store)),
            status_colors: Repository::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Notes attached to an entity, oldest first
    pub async fn notes_for(&self, target: &NoteTarget) -> Result<Vec<Note>> {
        let links = self.note_links.for_target(target).await?;
        let mut notes = Vec::with_capacity(links.len());
        for link in links {
            match self.notes.get(&link.note_id).await? {
                Some(note) => notes.push(note),
                None => tracing::warn!("Note link {} points at missing note {}", link.id, link.note_id),
            }
        }
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(notes)
    }

    /// Save a note and link it to an entity
    pub async fn attach_note(&self, note: &Note, target: NoteTarget) -> Result<NoteLink> {
        self.notes.save(note).await?;
        let link = NoteLink {
            id: ulid::Ulid::new().to_string(),
            note_id: note.id.clone(),
            target,
        };
        self.note_links.save(&link).await?;
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn repos() -> Repositories {
        Repositories::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let repos = repos();
        let plant = Plant::new("pl1", "North").with_location("Coast");

        repos.plants.save(&plant).await.unwrap();
        let first = repos.plants.get_all().await.unwrap();
        repos.plants.save(&plant).await.unwrap();
        repos.plants.save(&plant).await.unwrap();
        let second = repos.plants.get_all().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_save_overwrites_whole_record() {
        let repos = repos();
        let mut piece = Piece::new("p1", "SN-1", "pr1").with_counters(100.0, 2, 3);
        repos.pieces.save(&piece).await.unwrap();

        piece.hours = 150.0;
        repos.pieces.save(&piece).await.unwrap();

        let stored = repos.pieces.get("p1").await.unwrap().unwrap();
        assert_eq!(stored.hours, 150.0);
        assert_eq!(stored.trips, 2);
    }

    #[tokio::test]
    async fn test_save_all_and_count() {
        let repos = repos();
        repos
            .components
            .save_all(&[
                Component::new("c1", "rotor", "Rotor A"),
                Component::new("c2", "rotor", "Rotor B"),
                Component::new("c3", "stator", "Stator A"),
            ])
            .await
            .unwrap();
        assert_eq!(repos.components.count().await.unwrap(), 3);

        repos.components.delete("c3").await.unwrap();
        assert!(!repos.components.exists("c3").await.unwrap());

        repos.components.clear().await.unwrap();
        assert_eq!(repos.components.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_save_returns_error() {
        let repos = repos();
        repos.pieces.save(&Piece::new("p1", "SN-1", "pr1")).await.unwrap();
        let err = repos.pieces.save(&Piece::new("p2", "SN-1", "pr1")).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StorageIo);
    }

    #[tokio::test]
    async fn test_notes_for_target() {
        let repos = repos();
        let note = Note {
            id: "n1".into(),
            body: "Borescope shows coating loss".into(),
            author: Some("ops".into()),
            created_at: Utc::now(),
        };
        repos.attach_note(&note, NoteTarget::Piece("p1".into())).await.unwrap();

        let found = repos.notes_for(&NoteTarget::Piece("p1".into())).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].body, note.body);
        assert!(repos.notes_for(&NoteTarget::Piece("p2".into())).await.unwrap().is_empty());
    }
}
