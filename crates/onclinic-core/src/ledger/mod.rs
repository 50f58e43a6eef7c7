//! Stock ledger: append-only movement log with a cached per-item balance.

mod chain;
mod reconcile;
mod reports;

pub use chain::*;
pub use reconcile::*;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::LedgerConfig;
use crate::context::{CallContext, Interrupted};
use crate::db::{Database, DbError};
use crate::models::{InventoryItem, LedgerEntry, StockAdjustment, ValidationError};

/// Stock ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid stock change: {0}")]
    Validation(#[from] ValidationError),

    #[error("Inventory item not found: {0}")]
    ItemNotFound(String),

    /// The ledger entry was written but the balance row did not take the
    /// change. The enclosing transaction is rolled back.
    #[error("Balance update failed for item {0}")]
    BalanceUpdateFailed(String),

    #[error("Item {item_id} balance drifted: ledger says {expected}, item says {actual}")]
    Inconsistency {
        item_id: String,
        expected: i64,
        actual: i64,
    },

    #[error("Ledger hash chain for item {item_id} broken at entry {entry_id}")]
    BrokenChain { item_id: String, entry_id: i64 },

    #[error("Stock change interrupted: {0}")]
    Interrupted(#[from] Interrupted),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Item state and ledger row produced by one adjustment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentResult {
    pub item: InventoryItem,
    pub entry: LedgerEntry,
}

/// Stock ledger manager.
pub struct StockLedger<'a> {
    db: &'a Database,
    allow_negative_stock: bool,
}

impl<'a> StockLedger<'a> {
    /// Create a ledger that rejects changes leaving negative stock.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            allow_negative_stock: false,
        }
    }

    pub fn with_config(db: &'a Database, config: &LedgerConfig) -> Self {
        Self {
            db,
            allow_negative_stock: config.allow_negative_stock,
        }
    }

    /// Add an item to inventory. Current stock starts at the opening stock.
    pub fn create_item(&self, item: &InventoryItem) -> LedgerResult<InventoryItem> {
        if item.opening_stock < 0 {
            return Err(ValidationError::NegativeOpeningStock(item.opening_stock).into());
        }

        let mut item = item.clone();
        item.current_stock = item.opening_stock;
        self.db.insert_item(&item)?;

        info!(item_id = %item.item_id, sku = %item.sku, opening_stock = item.opening_stock, "item created");
        Ok(item)
    }

    /// Apply a stock change.
    ///
    /// Appending the ledger entry, incrementing the balance and re-reading
    /// the item happen in one write transaction. Either all of it is
    /// visible to other callers or none of it is.
    pub fn adjust_stock(&self, adjustment: &StockAdjustment, ctx: &CallContext) -> LedgerResult<AdjustmentResult> {
        ctx.check()?;

        let tx = self.db.begin_immediate()?;
        let result = self.apply_within(adjustment)?;
        tx.commit().map_err(DbError::from)?;

        info!(
            item_id = %result.item.item_id,
            entry_id = result.entry.entry_id,
            change = result.entry.change,
            reason = %result.entry.reason,
            current_stock = result.item.current_stock,
            "stock adjusted"
        );
        Ok(result)
    }

    /// Apply a stock change inside a write transaction the caller holds.
    pub(crate) fn apply_within(&self, adjustment: &StockAdjustment) -> LedgerResult<AdjustmentResult> {
        if adjustment.delta == 0 {
            return Err(ValidationError::ZeroDelta.into());
        }

        let item = self
            .db
            .get_item(&adjustment.item_id)?
            .ok_or_else(|| LedgerError::ItemNotFound(adjustment.item_id.clone()))?;

        let resulting = item
            .current_stock
            .checked_add(adjustment.delta)
            .ok_or(ValidationError::Overflow)?;
        if resulting < 0 && !self.allow_negative_stock {
            return Err(ValidationError::NegativeStock {
                item_id: item.item_id,
                current: item.current_stock,
                delta: adjustment.delta,
            }
            .into());
        }

        let mut entry = LedgerEntry {
            entry_id: 0,
            item_id: item.item_id.clone(),
            change: adjustment.delta,
            reason: adjustment.reason,
            notes: adjustment.notes.clone(),
            reference_bill_id: adjustment.reference_bill_id.clone(),
            created_by: adjustment.created_by.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            prev_hash: self.db.last_ledger_hash(&item.item_id)?,
            entry_hash: String::new(),
        };
        entry.entry_hash = hash_entry(entry.prev_hash.as_deref(), &entry.to_canonical_json()?);
        entry.entry_id = self.db.insert_ledger_entry(&entry)?;

        if !self.db.increment_stock(&item.item_id, adjustment.delta)? {
            return Err(LedgerError::BalanceUpdateFailed(item.item_id));
        }

        let item = self
            .db
            .get_item(&item.item_id)?
            .ok_or(LedgerError::BalanceUpdateFailed(item.item_id))?;

        Ok(AdjustmentResult { item, entry })
    }

    /// Ledger entries for an item, oldest first.
    pub fn history(&self, item_id: &str) -> LedgerResult<Vec<LedgerEntry>> {
        if self.db.get_item(item_id)?.is_none() {
            return Err(LedgerError::ItemNotFound(item_id.to_string()));
        }
        Ok(self.db.ledger_entries_for_item(item_id)?)
    }
}
