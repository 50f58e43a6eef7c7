//! Stock ledger database operations.
//!
//! The table only ever grows; triggers in the schema reject UPDATE and DELETE.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{LedgerEntry, Reason};

const ENTRY_COLUMNS: &str = r#"
    entry_id, item_id, change, reason, notes, reference_bill_id,
    created_by, created_at, prev_hash, entry_hash
"#;

impl Database {
    /// Append a ledger entry and return its row ID. `entry.entry_id` is ignored.
    pub fn insert_ledger_entry(&self, entry: &LedgerEntry) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO stock_ledger (
                item_id, change, reason, notes, reference_bill_id,
                created_by, created_at, prev_hash, entry_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                entry.item_id,
                entry.change,
                entry.reason.as_str(),
                entry.notes,
                entry.reference_bill_id,
                entry.created_by,
                entry.created_at,
                entry.prev_hash,
                entry.entry_hash,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All entries for an item in append order.
    pub fn ledger_entries_for_item(&self, item_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM stock_ledger WHERE item_id = ? ORDER BY entry_id"
        ))?;
        let rows = stmt.query_map([item_id], entry_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }

    /// Entries written for a bill, in append order.
    pub fn ledger_entries_for_bill(&self, reference_bill_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM stock_ledger WHERE reference_bill_id = ? ORDER BY entry_id"
        ))?;
        let rows = stmt.query_map([reference_bill_id], entry_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }

    /// Sum of all changes recorded for an item.
    pub fn ledger_sum_for_item(&self, item_id: &str) -> DbResult<i64> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(change), 0) FROM stock_ledger WHERE item_id = ?",
                [item_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Hash of the most recent entry for an item.
    pub fn last_ledger_hash(&self, item_id: &str) -> DbResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT entry_hash FROM stock_ledger WHERE item_id = ? ORDER BY entry_id DESC LIMIT 1",
                [item_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }
}

fn entry_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        entry_id: row.get(0)?,
        item_id: row.get(1)?,
        change: row.get(2)?,
        reason: row.get(3)?,
        notes: row.get(4)?,
        reference_bill_id: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
        prev_hash: row.get(8)?,
        entry_hash: row.get(9)?,
    })
}

/// Intermediate row struct for database mapping.
struct EntryRow {
    entry_id: i64,
    item_id: String,
    change: i64,
    reason: String,
    notes: Option<String>,
    reference_bill_id: Option<String>,
    created_by: Option<String>,
    created_at: String,
    prev_hash: Option<String>,
    entry_hash: String,
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = DbError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let reason = Reason::parse(&row.reason)
            .map_err(|_| DbError::Constraint(format!("Unknown ledger reason: {}", row.reason)))?;

        Ok(LedgerEntry {
            entry_id: row.entry_id,
            item_id: row.item_id,
            change: row.change,
            reason,
            notes: row.notes,
            reference_bill_id: row.reference_bill_id,
            created_by: row.created_by,
            created_at: row.created_at,
            prev_hash: row.prev_hash,
            entry_hash: row.entry_hash,
        })
    }
}
