use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{ComponentAssignment, ComponentPiece, Record};
use crate::storage::schema::{indexes, tables};

/// The owning side of a membership
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OwnerRef {
    /// A component holding pieces
    PieceOwner { component_id: String },
    /// A turbine holding components
    ComponentOwner { turbine_id: String },
}

impl OwnerRef {
    pub fn id(&self) -> &str {
        match self {
            OwnerRef::PieceOwner { component_id } => component_id,
            OwnerRef::ComponentOwner { turbine_id } => turbine_id,
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerRef::PieceOwner { component_id } => write!(f, "component {}", component_id),
            OwnerRef::ComponentOwner { turbine_id } => write!(f, "turbine {}", turbine_id),
        }
    }
}

/// A junction row with a validity interval
///
/// `valid_to = None` marks the active row. The index constants name the
/// single-path owner and subject indexes and the compound
/// `(owner, position)` index of the backing table.
pub trait TemporalLink: Record {
    const OWNER_TABLE: &'static str;
    const SUBJECT_TABLE: &'static str;
    const OWNER_INDEX: &'static str;
    const SUBJECT_INDEX: &'static str;
    const POSITION_INDEX: &'static str;

    fn open(id: String, owner_id: &str, subject_id: &str, position: &str, at: DateTime<Utc>) -> Self;

    fn owner_id(&self) -> &str;
    fn subject_id(&self) -> &str;
    fn position(&self) -> &str;
    fn valid_from(&self) -> DateTime<Utc>;
    fn valid_to(&self) -> Option<DateTime<Utc>>;
    fn close(&mut self, at: DateTime<Utc>);

    fn owner_ref(owner_id: &str) -> OwnerRef;

    fn is_active(&self) -> bool {
        self.valid_to().is_none()
    }
}

macro_rules! temporal_link {
    ($ty:ty, owner: $owner:ident in $owner_table:expr, subject: $subject:ident in $subject_table:expr,
     owner_index: $owner_index:expr, subject_index: $subject_index:expr, position_index: $position_index:expr,
     owner_ref: $variant:ident) => {
        impl TemporalLink for $ty {
            const OWNER_TABLE: &'static str = $owner_table;
            const SUBJECT_TABLE: &'static str = $subject_table;
            const OWNER_INDEX: &'static str = $owner_index;
            const SUBJECT_INDEX: &'static str = $subject_index;
            const POSITION_INDEX: &'static str = $position_index;

            fn open(id: String, owner_id: &str, subject_id: &str, position: &str, at: DateTime<Utc>) -> Self {
                Self {
                    id,
                    $owner: owner_id.to_string(),
                    $subject: subject_id.to_string(),
                    position: position.to_string(),
                    valid_from: at,
                    valid_to: None,
                }
            }

            fn owner_id(&self) -> &str {
                &self.$owner
            }

            fn subject_id(&self) -> &str {
                &self.$subject
            }

            fn position(&self) -> &str {
                &self.position
            }

            fn valid_from(&self) -> DateTime<Utc> {
                self.valid_from
            }

            fn valid_to(&self) -> Option<DateTime<Utc>> {
                self.valid_to
            }

            fn close(&mut self, at: DateTime<Utc>) {
                self.valid_to = Some(at);
            }

            fn owner_ref(owner_id: &str) -> OwnerRef {
                OwnerRef::$variant { $owner: owner_id.to_string() }
            }
        }
    };
}

temporal_link!(
    ComponentPiece,
    owner: component_id in tables::COMPONENTS,
    subject: piece_id in tables::PIECES,
    owner_index: indexes::COMPONENT_ID,
    subject_index: indexes::PIECE_ID,
    position_index: indexes::COMPONENT_POSITION,
    owner_ref: PieceOwner
);

temporal_link!(
    ComponentAssignment,
    owner: turbine_id in tables::TURBINES,
    subject: component_id in tables::COMPONENTS,
    owner_index: indexes::TURBINE_ID,
    subject_index: indexes::COMPONENT_ID,
    position_index: indexes::TURBINE_POSITION,
    owner_ref: ComponentOwner
);
