//! Display adapters
//!
//! Deterministic, side-effect free mappers from view models to display
//! rows. Nothing here touches the store.

pub mod rows;
pub mod stats;

pub use rows::{ComponentRow, InventoryRow, inventory_to_rows, turbine_to_component_rows};
pub use stats::{StatRow, Tone, metrics_to_stat_rows};
