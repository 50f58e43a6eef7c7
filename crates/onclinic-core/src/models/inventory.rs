//! Inventory item models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A stocked medicine or consumable.
///
/// `current_stock` is a cached projection: it always equals
/// `opening_stock` plus the sum of the item's ledger changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub item_id: String,
    pub name: String,
    /// Stock Keeping Unit - unique identifier
    pub sku: String,
    /// Dispensing unit (e.g., "tablet", "bottle")
    pub unit: String,
    pub cost_price: f64,
    pub sale_price: f64,
    /// Stock on hand when the item was created
    pub opening_stock: i64,
    /// Stock on hand now
    pub current_stock: i64,
    /// Reorder level; `None` disables low-stock reporting for the item
    pub low_stock_threshold: Option<i64>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    /// Tax rate in percent
    pub tax_rate: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl InventoryItem {
    /// Create a new item; the opening stock seeds current stock.
    pub fn new(name: String, sku: String, opening_stock: i64) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            item_id: uuid::Uuid::new_v4().to_string(),
            name,
            sku,
            unit: "unit".to_string(),
            cost_price: 0.0,
            sale_price: 0.0,
            opening_stock,
            current_stock: opening_stock,
            low_stock_threshold: None,
            category: None,
            manufacturer: None,
            expiry_date: None,
            batch_number: None,
            tax_rate: 0.0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// At or below the reorder level. Items without a threshold never are.
    pub fn is_low_stock(&self) -> bool {
        self.low_stock_threshold
            .is_some_and(|threshold| self.current_stock <= threshold)
    }

    /// Expires on or before `cutoff`. Items without an expiry date never do.
    pub fn expires_on_or_before(&self, cutoff: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= cutoff)
    }
}

/// Row returned by the low-stock report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LowStockItem {
    pub item_id: String,
    pub name: String,
    pub current_stock: i64,
    pub low_stock_threshold: i64,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
}

impl LowStockItem {
    /// Build the report row for an item that is at or below its threshold.
    pub fn from_item(item: &InventoryItem) -> Option<Self> {
        if !item.is_low_stock() {
            return None;
        }
        Some(Self {
            item_id: item.item_id.clone(),
            name: item.name.clone(),
            current_stock: item.current_stock,
            low_stock_threshold: item.low_stock_threshold?,
            category: item.category.clone(),
            manufacturer: item.manufacturer.clone(),
        })
    }
}
