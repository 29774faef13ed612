//! Entity types
//!
//! Every persisted entity implements [`Record`], which binds it to a logical
//! table and exposes its primary key. The key must equal the value stored at
//! the table's key path in the serialized document.

pub mod lookup;
pub mod asset;
pub mod junction;
pub mod peripheral;

pub use lookup::{ComponentType, UseStatus, ConditionCode, TurbineMetricType, MetricKind};
pub use asset::{Plant, PlantContact, Turbine, TurbineOperationalMetric, Component, Product, Piece};
pub use junction::{ComponentPiece, ComponentAssignment};
pub use peripheral::{
    Note, NoteLink, NoteTarget, OutageEvent, Outage, RepairOrder, RepairLineItem, StatusColorSetting,
};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed row of one logical table
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Logical table name
    const TABLE: &'static str;

    /// Primary key value
    fn key(&self) -> &str;
}

/// Implement [`Record`] for a struct whose primary key is a `String` field
macro_rules! impl_record {
    ($ty:ty, $table:expr, $key:ident) => {
        impl $crate::model::Record for $ty {
            const TABLE: &'static str = $table;

            fn key(&self) -> &str {
                &self.$key
            }
        }
    };
}

pub(crate) use impl_record;
