//! Peripheral tables: notes, outages, repairs and status colours

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::impl_record;
use crate::storage::schema::tables;

/// Free text attached to any entity through `NoteLink`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The entity a note is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "entity_id", rename_all = "snake_case")]
pub enum NoteTarget {
    Plant(String),
    Turbine(String),
    Component(String),
    Piece(String),
}

impl NoteTarget {
    pub fn entity_type(&self) -> &'static str {
        match self {
            NoteTarget::Plant(_) => "plant",
            NoteTarget::Turbine(_) => "turbine",
            NoteTarget::Component(_) => "component",
            NoteTarget::Piece(_) => "piece",
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            NoteTarget::Plant(id)
            | NoteTarget::Turbine(id)
            | NoteTarget::Component(id)
            | NoteTarget::Piece(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteLink {
    pub id: String,
    pub note_id: String,
    pub target: NoteTarget,
}

/// A planned outage window spanning one or more turbines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutageEvent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub starts_on: Option<NaiveDate>,
    #[serde(default)]
    pub ends_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outage {
    pub id: String,
    pub outage_event_id: String,
    pub turbine_id: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairOrder {
    pub id: String,
    pub order_number: String,
    #[serde(default)]
    pub piece_id: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub opened_on: Option<NaiveDate>,
    #[serde(default)]
    pub closed_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairLineItem {
    pub id: String,
    pub repair_order_id: String,
    pub description: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Display colour for a status code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusColorSetting {
    pub status_code: String,
    pub color: String,
}

impl_record!(Note, tables::NOTES, id);
impl_record!(NoteLink, tables::NOTE_LINKS, id);
impl_record!(OutageEvent, tables::OUTAGE_EVENTS, id);
impl_record!(Outage, tables::OUTAGES, id);
impl_record!(RepairOrder, tables::REPAIR_ORDERS, id);
impl_record!(RepairLineItem, tables::REPAIR_LINE_ITEMS, id);
impl_record!(StatusColorSetting, tables::STATUS_COLOR_SETTINGS, status_code);
