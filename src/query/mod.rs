//! Read models joined from the repositories on demand
//!
//! Joins never abort on a missing parent: the row is skipped or the label
//! defaulted and a warning logged.

pub mod engine;
pub mod view;

pub use engine::{QueryEngine, UNASSIGNED_COMPONENT, UNASSIGNED_TURBINE};
pub use view::{
    ComponentWithPieces, InstalledPiece, InventoryItem, MountedComponent, PieceHistoryEntry,
    PieceWithComponent, PlantOverview, TurbineWithComponents,
};
