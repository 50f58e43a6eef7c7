//! Balance reconciliation against the ledger.
//!
//! `current_stock` is a cached projection of `opening_stock + Σ change`.
//! Reconciliation recomputes the projection, compares it with the cached
//! value and checks the hash chain.

use serde::Serialize;
use tracing::warn;

use super::{verify_chain, LedgerError, LedgerResult, StockLedger};
use crate::db::DbError;
use crate::models::InventoryItem;

/// Reconciliation report for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub item_id: String,
    pub name: String,
    pub opening_stock: i64,
    pub ledger_total: i64,
    /// `opening_stock + ledger_total`
    pub expected_stock: i64,
    /// `current_stock` as stored on the item
    pub recorded_stock: i64,
    pub entries: usize,
    /// First entry whose hash or back-link does not check out
    pub broken_entry: Option<i64>,
}

impl Reconciliation {
    /// `recorded - expected`; positive means the item shows more than the
    /// ledger accounts for.
    pub fn drift(&self) -> i64 {
        self.recorded_stock - self.expected_stock
    }

    pub fn chain_intact(&self) -> bool {
        self.broken_entry.is_none()
    }

    pub fn is_consistent(&self) -> bool {
        self.drift() == 0 && self.chain_intact()
    }
}

impl StockLedger<'_> {
    /// Reconcile one item.
    pub fn reconcile_item(&self, item_id: &str) -> LedgerResult<Reconciliation> {
        let tx = self.db.begin_read()?;
        let item = self
            .db
            .get_item(item_id)?
            .ok_or_else(|| LedgerError::ItemNotFound(item_id.to_string()))?;
        let report = self.reconcile_loaded(item)?;
        tx.finish().map_err(DbError::from)?;

        log_drift(&report);
        Ok(report)
    }

    /// Reconcile every item, in name order, from one snapshot.
    pub fn reconcile_all(&self) -> LedgerResult<Vec<Reconciliation>> {
        let tx = self.db.begin_read()?;
        let mut reports = Vec::new();
        for item in self.db.list_items()? {
            reports.push(self.reconcile_loaded(item)?);
        }
        tx.finish().map_err(DbError::from)?;

        reports.iter().for_each(log_drift);
        Ok(reports)
    }

    /// Reset an item's balance to the ledger projection.
    ///
    /// Returns the report as it stood before the repair. Refuses to repair
    /// an item whose hash chain is broken, since the projection itself is
    /// then untrustworthy.
    pub fn repair_item(&self, item_id: &str) -> LedgerResult<Reconciliation> {
        let tx = self.db.begin_immediate()?;
        let item = self
            .db
            .get_item(item_id)?
            .ok_or_else(|| LedgerError::ItemNotFound(item_id.to_string()))?;
        let report = self.reconcile_loaded(item)?;

        if let Some(entry_id) = report.broken_entry {
            return Err(LedgerError::BrokenChain {
                item_id: report.item_id,
                entry_id,
            });
        }

        if report.drift() != 0 {
            if !self.db.set_current_stock(item_id, report.expected_stock)? {
                return Err(LedgerError::BalanceUpdateFailed(item_id.to_string()));
            }
            warn!(
                item_id = %report.item_id,
                recorded = report.recorded_stock,
                expected = report.expected_stock,
                "stock balance repaired from ledger"
            );
        }

        tx.commit().map_err(DbError::from)?;
        Ok(report)
    }

    /// Fail with [`LedgerError::Inconsistency`] or [`LedgerError::BrokenChain`]
    /// unless the item reconciles cleanly.
    pub fn assert_consistent(&self, item_id: &str) -> LedgerResult<Reconciliation> {
        let report = self.reconcile_item(item_id)?;

        if let Some(entry_id) = report.broken_entry {
            return Err(LedgerError::BrokenChain {
                item_id: report.item_id,
                entry_id,
            });
        }
        if report.drift() != 0 {
            return Err(LedgerError::Inconsistency {
                item_id: report.item_id,
                expected: report.expected_stock,
                actual: report.recorded_stock,
            });
        }
        Ok(report)
    }

    fn reconcile_loaded(&self, item: InventoryItem) -> LedgerResult<Reconciliation> {
        let entries = self.db.ledger_entries_for_item(&item.item_id)?;
        let ledger_total = self.db.ledger_sum_for_item(&item.item_id)?;
        let broken_entry = verify_chain(&entries)?;

        Ok(Reconciliation {
            expected_stock: item.opening_stock + ledger_total,
            recorded_stock: item.current_stock,
            opening_stock: item.opening_stock,
            ledger_total,
            entries: entries.len(),
            broken_entry,
            item_id: item.item_id,
            name: item.name,
        })
    }
}

fn log_drift(report: &Reconciliation) {
    if report.drift() != 0 {
        warn!(
            item_id = %report.item_id,
            recorded = report.recorded_stock,
            expected = report.expected_stock,
            "stock balance drifted from ledger"
        );
    }
    if let Some(entry_id) = report.broken_entry {
        warn!(item_id = %report.item_id, entry_id, "ledger hash chain broken");
    }
}
