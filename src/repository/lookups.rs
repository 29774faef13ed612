//! Table-specific index lookups

use serde_json::{Value, json};

use super::Repository;
use crate::Result;
use crate::model::*;
use crate::storage::schema::indexes;

impl Repository<Plant> {
    pub async fn by_name(&self, name: &str) -> Result<Option<Plant>> {
        self.first_by_index(indexes::NAME, name).await
    }
}

impl Repository<PlantContact> {
    pub async fn for_plant(&self, plant_id: &str) -> Result<Vec<PlantContact>> {
        self.by_index(indexes::PLANT_ID, plant_id).await
    }
}

impl Repository<Turbine> {
    /// Turbines at a plant, sorted by name
    pub async fn for_plant(&self, plant_id: &str) -> Result<Vec<Turbine>> {
        let mut turbines = self.by_index(indexes::PLANT_ID, plant_id).await?;
        turbines.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(turbines)
    }
}

impl Repository<TurbineOperationalMetric> {
    pub async fn for_turbine(&self, turbine_id: &str) -> Result<Vec<TurbineOperationalMetric>> {
        self.by_index(indexes::TURBINE_ID, turbine_id).await
    }

    /// The single metric row for `(turbine, type)`
    pub async fn find(&self, turbine_id: &str, metric_type_code: &str) -> Result<Option<TurbineOperationalMetric>> {
        let values: [Value; 2] = [json!(turbine_id), json!(metric_type_code)];
        Ok(self
            .by_compound_index(indexes::TURBINE_METRIC, &values)
            .await?
            .into_iter()
            .next())
    }

    /// Overwrite the metric for `(turbine, type)`, keeping the existing row id
    pub async fn upsert(&self, mut metric: TurbineOperationalMetric) -> Result<TurbineOperationalMetric> {
        if let Some(existing) = self.find(&metric.turbine_id, &metric.metric_type_code).await? {
            metric.id = existing.id;
        }
        self.save(&metric).await?;
        Ok(metric)
    }
}

impl Repository<Component> {
    pub async fn of_type(&self, type_code: &str) -> Result<Vec<Component>> {
        self.by_index(indexes::TYPE_CODE, type_code).await
    }
}

impl Repository<Product> {
    pub async fn by_part_number(&self, part_number: &str) -> Result<Option<Product>> {
        self.first_by_index(indexes::PART_NUMBER, part_number).await
    }
}

impl Repository<Piece> {
    pub async fn by_sn(&self, sn: &str) -> Result<Option<Piece>> {
        self.first_by_index(indexes::SN, sn).await
    }

    pub async fn for_product(&self, product_id: &str) -> Result<Vec<Piece>> {
        self.by_index(indexes::PRODUCT_ID, product_id).await
    }

    pub async fn with_use_status(&self, use_status_code: &str) -> Result<Vec<Piece>> {
        self.by_index(indexes::USE_STATUS_CODE, use_status_code).await
    }
}

impl Repository<ComponentPiece> {
    pub async fn for_component(&self, component_id: &str) -> Result<Vec<ComponentPiece>> {
        self.by_index(indexes::COMPONENT_ID, component_id).await
    }

    pub async fn for_piece(&self, piece_id: &str) -> Result<Vec<ComponentPiece>> {
        self.by_index(indexes::PIECE_ID, piece_id).await
    }
}

impl Repository<ComponentAssignment> {
    pub async fn for_turbine(&self, turbine_id: &str) -> Result<Vec<ComponentAssignment>> {
        self.by_index(indexes::TURBINE_ID, turbine_id).await
    }

    pub async fn for_component(&self, component_id: &str) -> Result<Vec<ComponentAssignment>> {
        self.by_index(indexes::COMPONENT_ID, component_id).await
    }
}

impl Repository<NoteLink> {
    pub async fn for_target(&self, target: &NoteTarget) -> Result<Vec<NoteLink>> {
        let values = [json!(target.entity_type()), json!(target.entity_id())];
        self.by_compound_index(indexes::TARGET, &values).await
    }

    pub async fn for_note(&self, note_id: &str) -> Result<Vec<NoteLink>> {
        self.by_index(indexes::NOTE_ID, note_id).await
    }
}

impl Repository<Outage> {
    pub async fn for_event(&self, outage_event_id: &str) -> Result<Vec<Outage>> {
        self.by_index(indexes::OUTAGE_EVENT_ID, outage_event_id).await
    }

    pub async fn for_turbine(&self, turbine_id: &str) -> Result<Vec<Outage>> {
        self.by_index(indexes::TURBINE_ID, turbine_id).await
    }
}

impl Repository<RepairOrder> {
    pub async fn by_order_number(&self, order_number: &str) -> Result<Option<RepairOrder>> {
        self.first_by_index(indexes::ORDER_NUMBER, order_number).await
    }

    pub async fn for_piece(&self, piece_id: &str) -> Result<Vec<RepairOrder>> {
        self.by_index(indexes::PIECE_ID, piece_id).await
    }
}

impl Repository<RepairLineItem> {
    pub async fn for_order(&self, repair_order_id: &str) -> Result<Vec<RepairLineItem>> {
        self.by_index(indexes::REPAIR_ORDER_ID, repair_order_id).await
    }
}

#[cfg(test)]
mod tests {
    use crate::model::*;
    use crate::repository::Repositories;
    use crate::storage::SqliteStore;
    use std::sync::Arc;

    fn repos() -> Repositories {
        Repositories::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_turbines_by_plant() {
        let repos = repos();
        repos
            .turbines
            .save_all(&[
                Turbine::new("t2", "GT-2").at_plant("pl1"),
                Turbine::new("t1", "GT-1").at_plant("pl1"),
                Turbine::new("t3", "GT-3").at_plant("pl2"),
                Turbine::new("t4", "Loose"),
            ])
            .await
            .unwrap();

        let at_plant = repos.turbines.for_plant("pl1").await.unwrap();
        let names: Vec<_> = at_plant.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["GT-1", "GT-2"]);
    }

    #[tokio::test]
    async fn test_piece_by_sn() {
        let repos = repos();
        repos.pieces.save(&Piece::new("p1", "SN-1", "pr1")).await.unwrap();
        assert_eq!(repos.pieces.by_sn("SN-1").await.unwrap().unwrap().id, "p1");
        assert!(repos.pieces.by_sn("SN-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metric_upsert_keeps_one_row() {
        let repos = repos();
        let first = repos
            .metrics
            .upsert(TurbineOperationalMetric::new("m1", "t1", "hours").with_values(8000.0, 4000.0, 100.0))
            .await
            .unwrap();
        let second = repos
            .metrics
            .upsert(TurbineOperationalMetric::new("m-new", "t1", "hours").with_values(8000.0, 4000.0, 250.0))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let rows = repos.metrics.for_turbine("t1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].actual_value, 250.0);
    }

    #[tokio::test]
    async fn test_product_by_part_number() {
        let repos = repos();
        repos.products.save(&Product::new("pr1", "PN-100").with_description("Blade")).await.unwrap();
        let found = repos.products.by_part_number("PN-100").await.unwrap().unwrap();
        assert_eq!(found.description.as_deref(), Some("Blade"));
    }

    #[tokio::test]
    async fn test_repair_lookups() {
        let repos = repos();
        let order = RepairOrder {
            id: "ro1".into(),
            order_number: "RO-1".into(),
            piece_id: Some("p1".into()),
            vendor: None,
            opened_on: None,
            closed_on: None,
        };
        repos.repair_orders.save(&order).await.unwrap();
        repos
            .repair_line_items
            .save(&RepairLineItem {
                id: "li1".into(),
                repair_order_id: "ro1".into(),
                description: "Recoat".into(),
                quantity: 1,
                cost: Some(1200.0),
            })
            .await
            .unwrap();

        assert_eq!(repos.repair_orders.for_piece("p1").await.unwrap().len(), 1);
        assert_eq!(repos.repair_orders.by_order_number("RO-1").await.unwrap(), Some(order));
        assert_eq!(repos.repair_line_items.for_order("ro1").await.unwrap().len(), 1);
    }
}
