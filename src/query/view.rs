use serde::Serialize;

use crate::model::*;

/// A piece currently installed in a component, with its lookups resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstalledPiece {
    pub link: ComponentPiece,
    pub piece: Piece,
    pub product: Option<Product>,
    pub use_status: Option<UseStatus>,
    pub condition: Option<ConditionCode>,
}

/// A component currently mounted on a turbine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountedComponent {
    pub assignment: ComponentAssignment,
    pub component: Component,
    pub component_type: Option<ComponentType>,
    pub pieces: Vec<InstalledPiece>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurbineWithComponents {
    pub turbine: Turbine,
    pub plant: Option<Plant>,
    pub metrics: Vec<TurbineOperationalMetric>,
    pub components: Vec<MountedComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentWithPieces {
    pub component: Component,
    pub component_type: Option<ComponentType>,
    /// Active mount, `None` for a spare
    pub mount: Option<ComponentAssignment>,
    pub turbine: Option<Turbine>,
    pub pieces: Vec<InstalledPiece>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieceWithComponent {
    pub piece: Piece,
    pub product: Option<Product>,
    pub use_status: Option<UseStatus>,
    pub condition: Option<ConditionCode>,
    pub link: Option<ComponentPiece>,
    pub component: Option<Component>,
    pub mount: Option<ComponentAssignment>,
    pub turbine: Option<Turbine>,
}

/// One flat inventory line per piece
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryItem {
    pub piece_id: String,
    pub sn: String,
    pub part_number: Option<String>,
    pub description: Option<String>,
    pub use_status: Option<String>,
    pub condition: Option<String>,
    pub hours: f64,
    pub trips: u32,
    pub starts: u32,
    /// Component name, or "Unassigned"
    pub component: String,
    pub position: Option<String>,
    /// Turbine name, or "unassigned"
    pub turbine: String,
    pub plant: Option<String>,
}

impl InventoryItem {
    pub fn is_assigned(&self) -> bool {
        self.position.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantOverview {
    pub plant: Plant,
    pub contacts: Vec<PlantContact>,
    pub turbines: Vec<TurbineWithComponents>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieceHistoryEntry {
    pub link: ComponentPiece,
    pub component_name: Option<String>,
}
