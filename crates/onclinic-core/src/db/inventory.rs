//! Inventory item database operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::InventoryItem;

const ITEM_COLUMNS: &str = r#"
    item_id, name, sku, unit, cost_price, sale_price, opening_stock,
    current_stock, low_stock_threshold, category, manufacturer, expiry_date,
    batch_number, tax_rate, created_at, updated_at
"#;

const DATE_FORMAT: &str = "%Y-%m-%d";

impl Database {
    /// Insert a new item. `current_stock` is written as given; callers seed
    /// it from `opening_stock`.
    pub fn insert_item(&self, item: &InventoryItem) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO inventory_items (
                item_id, name, sku, unit, cost_price, sale_price, opening_stock,
                current_stock, low_stock_threshold, category, manufacturer,
                expiry_date, batch_number, tax_rate, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                item.item_id,
                item.name,
                item.sku,
                item.unit,
                item.cost_price,
                item.sale_price,
                item.opening_stock,
                item.current_stock,
                item.low_stock_threshold,
                item.category,
                item.manufacturer,
                item.expiry_date.map(|d| d.format(DATE_FORMAT).to_string()),
                item.batch_number,
                item.tax_rate,
                item.created_at,
                item.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get an item by ID.
    pub fn get_item(&self, item_id: &str) -> DbResult<Option<InventoryItem>> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE item_id = ?"),
                [item_id],
                item_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get an item by SKU.
    pub fn get_item_by_sku(&self, sku: &str) -> DbResult<Option<InventoryItem>> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE sku = ?"),
                [sku],
                item_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all items by name.
    pub fn list_items(&self) -> DbResult<Vec<InventoryItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ITEM_COLUMNS} FROM inventory_items ORDER BY name"))?;
        let rows = stmt.query_map([], item_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// Add `delta` to an item's stock in a single statement.
    ///
    /// Returns false if the item does not exist.
    pub fn increment_stock(&self, item_id: &str, delta: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE inventory_items
            SET current_stock = current_stock + ?2, updated_at = datetime('now')
            WHERE item_id = ?1
            "#,
            params![item_id, delta],
        )?;
        Ok(rows_affected > 0)
    }

    /// Overwrite an item's stock (reconciliation repair only).
    pub fn set_current_stock(&self, item_id: &str, current_stock: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE inventory_items
            SET current_stock = ?2, updated_at = datetime('now')
            WHERE item_id = ?1
            "#,
            params![item_id, current_stock],
        )?;
        Ok(rows_affected > 0)
    }
}

fn item_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        item_id: row.get(0)?,
        name: row.get(1)?,
        sku: row.get(2)?,
        unit: row.get(3)?,
        cost_price: row.get(4)?,
        sale_price: row.get(5)?,
        opening_stock: row.get(6)?,
        current_stock: row.get(7)?,
        low_stock_threshold: row.get(8)?,
        category: row.get(9)?,
        manufacturer: row.get(10)?,
        expiry_date: row.get(11)?,
        batch_number: row.get(12)?,
        tax_rate: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

/// Intermediate row struct for database mapping.
struct ItemRow {
    item_id: String,
    name: String,
    sku: String,
    unit: String,
    cost_price: f64,
    sale_price: f64,
    opening_stock: i64,
    current_stock: i64,
    low_stock_threshold: Option<i64>,
    category: Option<String>,
    manufacturer: Option<String>,
    expiry_date: Option<String>,
    batch_number: Option<String>,
    tax_rate: f64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ItemRow> for InventoryItem {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let expiry_date = row
            .expiry_date
            .filter(|s| !s.is_empty())
            .map(|s| {
                NaiveDate::parse_from_str(&s, DATE_FORMAT)
                    .map_err(|_| DbError::Constraint(format!("Invalid expiry date: {}", s)))
            })
            .transpose()?;

        Ok(InventoryItem {
            item_id: row.item_id,
            name: row.name,
            sku: row.sku,
            unit: row.unit,
            cost_price: row.cost_price,
            sale_price: row.sale_price,
            opening_stock: row.opening_stock,
            current_stock: row.current_stock,
            low_stock_threshold: row.low_stock_threshold,
            category: row.category,
            manufacturer: row.manufacturer,
            expiry_date,
            batch_number: row.batch_number,
            tax_rate: row.tax_rate,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
