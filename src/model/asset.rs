//! Core asset entities

use serde::{Deserialize, Serialize};

use super::impl_record;
use crate::storage::schema::tables;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: String,
    /// Unique across plants
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Plant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), location: None, address: None }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantContact {
    pub id: String,
    pub plant_id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl PlantContact {
    pub fn new(id: impl Into<String>, plant_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plant_id: plant_id.into(),
            name: name.into(),
            phone: None,
            title: None,
            email: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turbine {
    pub id: String,
    #[serde(default)]
    pub plant_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Turbine {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), plant_id: None, name: name.into(), unit: None }
    }

    pub fn at_plant(mut self, plant_id: impl Into<String>) -> Self {
        self.plant_id = Some(plant_id.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// One row per `(turbine_id, metric_type_code)`; overwritten on update, no history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurbineOperationalMetric {
    pub id: String,
    pub turbine_id: String,
    pub metric_type_code: String,
    #[serde(default)]
    pub target_value: f64,
    #[serde(default)]
    pub interval_value: f64,
    #[serde(default)]
    pub actual_value: f64,
    #[serde(default)]
    pub remaining_value: f64,
    #[serde(default)]
    pub status_note: Option<String>,
}

impl TurbineOperationalMetric {
    pub fn new(
        id: impl Into<String>,
        turbine_id: impl Into<String>,
        metric_type_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            turbine_id: turbine_id.into(),
            metric_type_code: metric_type_code.into(),
            target_value: 0.0,
            interval_value: 0.0,
            actual_value: 0.0,
            remaining_value: 0.0,
            status_note: None,
        }
    }

    /// Set target/interval/actual and keep the stored remaining value consistent
    pub fn with_values(mut self, target: f64, interval: f64, actual: f64) -> Self {
        self.target_value = target;
        self.interval_value = interval;
        self.actual_value = actual;
        self.remaining_value = target - actual;
        self
    }
}

/// A mountable assembly. Turbine mounting lives only in `ComponentAssignment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub type_code: String,
    pub name: String,
}

impl Component {
    pub fn new(id: impl Into<String>, type_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), type_code: type_code.into(), name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    /// Unique across products
    pub part_number: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<String>, part_number: impl Into<String>) -> Self {
        Self { id: id.into(), part_number: part_number.into(), description: None }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A serialized physical piece
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub id: String,
    /// Serial number, unique across pieces
    pub sn: String,
    pub product_id: String,
    #[serde(default)]
    pub use_status_code: Option<String>,
    #[serde(default)]
    pub condition_code: Option<String>,
    #[serde(default)]
    pub hours: f64,
    #[serde(default)]
    pub trips: u32,
    #[serde(default)]
    pub starts: u32,
}

impl Piece {
    pub fn new(id: impl Into<String>, sn: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sn: sn.into(),
            product_id: product_id.into(),
            use_status_code: None,
            condition_code: None,
            hours: 0.0,
            trips: 0,
            starts: 0,
        }
    }

    pub fn with_counters(mut self, hours: f64, trips: u32, starts: u32) -> Self {
        self.hours = hours;
        self.trips = trips;
        self.starts = starts;
        self
    }

    pub fn with_status(mut self, use_status_code: impl Into<String>) -> Self {
        self.use_status_code = Some(use_status_code.into());
        self
    }

    pub fn with_condition(mut self, condition_code: impl Into<String>) -> Self {
        self.condition_code = Some(condition_code.into());
        self
    }
}

impl_record!(Plant, tables::PLANTS, id);
impl_record!(PlantContact, tables::PLANT_CONTACTS, id);
impl_record!(Turbine, tables::TURBINES, id);
impl_record!(TurbineOperationalMetric, tables::TURBINE_METRICS, id);
impl_record!(Component, tables::COMPONENTS, id);
impl_record!(Product, tables::PRODUCTS, id);
impl_record!(Piece, tables::PIECES, id);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_defaults_from_sparse_json() {
        let piece: Piece = serde_json::from_str(r#"{"id":"p1","sn":"SN-1","product_id":"pr1"}"#).unwrap();
        assert_eq!(piece.hours, 0.0);
        assert!(piece.use_status_code.is_none());
    }

    #[test]
    fn test_metric_remaining_tracks_values() {
        let metric = TurbineOperationalMetric::new("m1", "t1", "hours").with_values(8000.0, 4000.0, 7500.0);
        assert_eq!(metric.remaining_value, 500.0);
    }

    #[test]
    fn test_turbine_plant_is_optional() {
        let turbine = Turbine::new("t1", "GT-1");
        let json = serde_json::to_value(&turbine).unwrap();
        assert!(json["plant_id"].is_null());
    }
}
