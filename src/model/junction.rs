//! Temporal junction rows
//!
//! Rows are never deleted, only closed by setting `valid_to`. A row with
//! `valid_to = None` is the subject's current membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::impl_record;
use crate::storage::schema::tables;

/// A piece installed in a component at a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPiece {
    pub id: String,
    pub component_id: String,
    pub piece_id: String,
    pub position: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

/// A component mounted on a turbine at a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentAssignment {
    pub id: String,
    pub turbine_id: String,
    pub component_id: String,
    pub position: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl ComponentPiece {
    pub fn is_active(&self) -> bool {
        self.valid_to.is_none()
    }
}

impl ComponentAssignment {
    pub fn is_active(&self) -> bool {
        self.valid_to.is_none()
    }
}

impl_record!(ComponentPiece, tables::COMPONENT_PIECES, id);
impl_record!(ComponentAssignment, tables::COMPONENT_ASSIGNMENTS, id);
