use serde::Serialize;
use tabled::Tabled;

use crate::query::{InventoryItem, TurbineWithComponents};

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct InventoryRow {
    #[tabled(rename = "SN")]
    pub sn: String,
    #[tabled(rename = "Part")]
    pub part_number: String,
    #[tabled(rename = "Description")]
    pub description: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Condition")]
    pub condition: String,
    #[tabled(rename = "Hours")]
    pub hours: String,
    #[tabled(rename = "Trips")]
    pub trips: String,
    #[tabled(rename = "Starts")]
    pub starts: String,
    #[tabled(rename = "Component")]
    pub component: String,
    #[tabled(rename = "Pos")]
    pub position: String,
    #[tabled(rename = "Turbine")]
    pub turbine: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct ComponentRow {
    #[tabled(rename = "Pos")]
    pub position: String,
    #[tabled(rename = "Component")]
    pub component: String,
    #[tabled(rename = "Type")]
    pub component_type: String,
    #[tabled(rename = "Piece Pos")]
    pub piece_position: String,
    #[tabled(rename = "SN")]
    pub sn: String,
    #[tabled(rename = "Part")]
    pub part_number: String,
    #[tabled(rename = "Hours")]
    pub hours: String,
}

const EMPTY: &str = "-";

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or(EMPTY).to_string()
}

pub fn inventory_to_rows(items: &[InventoryItem]) -> Vec<InventoryRow> {
    items
        .iter()
        .map(|item| InventoryRow {
            sn: item.sn.clone(),
            part_number: or_dash(item.part_number.as_deref()),
            description: or_dash(item.description.as_deref()),
            status: or_dash(item.use_status.as_deref()),
            condition: or_dash(item.condition.as_deref()),
            hours: format!("{:.1}", item.hours),
            trips: item.trips.to_string(),
            starts: item.starts.to_string(),
            component: item.component.clone(),
            position: or_dash(item.position.as_deref()),
            turbine: item.turbine.clone(),
        })
        .collect()
}

/// One row per installed piece; a component with no pieces still gets a row
pub fn turbine_to_component_rows(view: &TurbineWithComponents) -> Vec<ComponentRow> {
    let mut rows = Vec::new();
    for mounted in &view.components {
        let component_type = mounted
            .component_type
            .as_ref()
            .map(|t| t.name.clone())
            .unwrap_or_else(|| mounted.component.type_code.clone());

        if mounted.pieces.is_empty() {
            rows.push(ComponentRow {
                position: mounted.assignment.position.clone(),
                component: mounted.component.name.clone(),
                component_type,
                piece_position: EMPTY.to_string(),
                sn: EMPTY.to_string(),
                part_number: EMPTY.to_string(),
                hours: EMPTY.to_string(),
            });
            continue;
        }

        for installed in &mounted.pieces {
            rows.push(ComponentRow {
                position: mounted.assignment.position.clone(),
                component: mounted.component.name.clone(),
                component_type: component_type.clone(),
                piece_position: installed.link.position.clone(),
                sn: installed.piece.sn.clone(),
                part_number: or_dash(installed.product.as_ref().map(|p| p.part_number.as_str())),
                hours: format!("{:.1}", installed.piece.hours),
            });
        }
    }
    rows
}
