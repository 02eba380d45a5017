//! Common types used across the platform

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The scope within which demand must be satisfied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "scope", content = "warehouses")]
pub enum StockArea {
    /// A single warehouse.
    Warehouse(Uuid),
    /// An explicit set of warehouses.
    Warehouses(Vec<Uuid>),
    /// No scope restriction.
    Everywhere,
}

impl StockArea {
    /// Whether stock in the given warehouse falls inside this area.
    pub fn includes_warehouse(&self, warehouse_id: Uuid) -> bool {
        match self {
            StockArea::Warehouse(id) => *id == warehouse_id,
            StockArea::Warehouses(ids) => ids.contains(&warehouse_id),
            StockArea::Everywhere => true,
        }
    }

    /// The explicit warehouse list, or `None` when the area is unrestricted.
    pub fn warehouse_ids(&self) -> Option<Vec<Uuid>> {
        match self {
            StockArea::Warehouse(id) => Some(vec![*id]),
            StockArea::Warehouses(ids) => Some(ids.clone()),
            StockArea::Everywhere => None,
        }
    }
}
