//! Low-stock and expiry reports.
//!
//! Both read every item inside one read transaction and filter in memory,
//! so a report never mixes rows from before and after a concurrent change.

use chrono::{Months, NaiveDate};

use super::{LedgerResult, StockLedger};
use crate::models::{InventoryItem, LowStockItem, ValidationError};

impl StockLedger<'_> {
    /// Items at or below their low-stock threshold, lowest stock first.
    pub fn low_stock_items(&self) -> LedgerResult<Vec<LowStockItem>> {
        let items = self.snapshot()?;

        let mut low: Vec<LowStockItem> = items.iter().filter_map(LowStockItem::from_item).collect();
        low.sort_by(|a, b| {
            a.current_stock
                .cmp(&b.current_stock)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(low)
    }

    /// Items expiring on or before `today + within_months`, soonest first.
    ///
    /// Already-expired items are included. Month arithmetic clamps to the
    /// end of shorter months (Oct 31 + 4 months is Feb 28/29).
    pub fn expiring_items(&self, within_months: u32, today: NaiveDate) -> LedgerResult<Vec<InventoryItem>> {
        let cutoff = today
            .checked_add_months(Months::new(within_months))
            .ok_or(ValidationError::ExpiryWindow(within_months))?;

        let mut expiring: Vec<InventoryItem> = self
            .snapshot()?
            .into_iter()
            .filter(|item| item.expires_on_or_before(cutoff))
            .collect();
        expiring.sort_by(|a, b| {
            a.expiry_date
                .cmp(&b.expiry_date)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(expiring)
    }

    fn snapshot(&self) -> LedgerResult<Vec<InventoryItem>> {
        let tx = self.db.begin_read()?;
        let items = self.db.list_items()?;
        tx.finish().map_err(crate::db::DbError::from)?;
        Ok(items)
    }
}
