//! Bulk load of a JSON dataset, one array per table

use serde::Deserialize;

use super::Repositories;
use crate::Result;
use crate::model::*;

/// Every table's rows; missing arrays are empty
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub component_types: Vec<ComponentType>,
    pub use_statuses: Vec<UseStatus>,
    pub condition_codes: Vec<ConditionCode>,
    pub turbine_metric_types: Vec<TurbineMetricType>,
    pub plants: Vec<Plant>,
    pub plant_contacts: Vec<PlantContact>,
    pub turbines: Vec<Turbine>,
    pub turbine_metrics: Vec<TurbineOperationalMetric>,
    pub components: Vec<Component>,
    pub products: Vec<Product>,
    pub pieces: Vec<Piece>,
    pub component_pieces: Vec<ComponentPiece>,
    pub component_assignments: Vec<ComponentAssignment>,
    pub notes: Vec<Note>,
    pub note_links: Vec<NoteLink>,
    pub outage_events: Vec<OutageEvent>,
    pub outages: Vec<Outage>,
    pub repair_orders: Vec<RepairOrder>,
    pub repair_line_items: Vec<RepairLineItem>,
    pub status_color_settings: Vec<StatusColorSetting>,
}

impl Dataset {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Save every table with `save_all`, lookups first
    ///
    /// Each table is its own transaction; a failure stops the import and
    /// leaves earlier tables written. Returns `(table, rows)` per non-empty table.
    pub async fn import(&self, repos: &Repositories) -> Result<Vec<(&'static str, usize)>> {
        let mut written = Vec::new();

        macro_rules! load {
            ($field:ident, $repo:ident) => {
                if !self.$field.is_empty() {
                    repos.$repo.save_all(&self.$field).await?;
                    tracing::debug!("Imported {} {} rows", self.$field.len(), repos.$repo.table());
                    written.push((repos.$repo.table(), self.$field.len()));
                }
            };
        }

        load!(component_types, component_types);
        load!(use_statuses, use_statuses);
        load!(condition_codes, condition_codes);
        load!(turbine_metric_types, metric_types);
        load!(plants, plants);
        load!(plant_contacts, plant_contacts);
        load!(turbines, turbines);
        load!(turbine_metrics, metrics);
        load!(components, components);
        load!(products, products);
        load!(pieces, pieces);
        load!(component_pieces, component_pieces);
        load!(component_assignments, component_assignments);
        load!(notes, notes);
        load!(note_links, note_links);
        load!(outage_events, outage_events);
        load!(outages, outages);
        load!(repair_orders, repair_orders);
        load!(repair_line_items, repair_line_items);
        load!(status_color_settings, status_colors);

        Ok(written)
    }
}

/// Seed the metric type lookup rows every turbine metric refers to
pub async fn seed_metric_types(repos: &Repositories) -> Result<usize> {
    let rows: Vec<TurbineMetricType> = MetricKind::all().iter().map(MetricKind::lookup_row).collect();
    repos.metric_types.save_all(&rows).await?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_import_partial_dataset() {
        let repos = Repositories::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let dataset = Dataset::from_json(
            r#"{
                "plants": [{"id": "pl1", "name": "North"}],
                "turbines": [{"id": "t1", "plant_id": "pl1", "name": "GT-1"}],
                "pieces": [
                    {"id": "p1", "sn": "SN-1", "product_id": "pr1", "hours": 100.0},
                    {"id": "p2", "sn": "SN-2", "product_id": "pr1"}
                ]
            }"#,
        )
        .unwrap();

        let written = dataset.import(&repos).await.unwrap();
        assert_eq!(written, vec![("plants", 1), ("turbines", 1), ("pieces", 2)]);
        assert_eq!(repos.pieces.by_sn("SN-1").await.unwrap().unwrap().hours, 100.0);
    }

    #[tokio::test]
    async fn test_seed_metric_types() {
        let repos = Repositories::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        assert_eq!(seed_metric_types(&repos).await.unwrap(), 3);
        assert!(repos.metric_types.exists("hours").await.unwrap());
    }

    #[test]
    fn test_malformed_dataset() {
        let err = Dataset::from_json(r#"{"pieces": [{"id": 1}]}"#).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }
}
