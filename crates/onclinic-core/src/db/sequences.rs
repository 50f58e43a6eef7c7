//! Sequence counter operations and the allocator's view of issued identifiers.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::BillType;
use crate::sequence::{Category, ScopeKey, SequenceStore};

impl Database {
    /// Last serial recorded for a scope prefix.
    pub fn get_sequence_counter(&self, scope_prefix: &str) -> DbResult<Option<u32>> {
        self.conn
            .query_row(
                "SELECT last_serial FROM sequence_counters WHERE scope_prefix = ?",
                [scope_prefix],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Create a counter row. Returns false if the scope already has one.
    pub fn insert_sequence_counter(&self, scope_prefix: &str, category: Category, last_serial: u32) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            INSERT INTO sequence_counters (scope_prefix, category, last_serial)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(scope_prefix) DO NOTHING
            "#,
            params![scope_prefix, category.as_str(), last_serial],
        )?;
        Ok(rows_affected > 0)
    }

    /// Move a counter from `expected` to `new` in one statement.
    ///
    /// Returns false if the stored value is no longer `expected`.
    pub fn advance_sequence_counter(&self, scope_prefix: &str, expected: u32, new: u32) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE sequence_counters
            SET last_serial = ?3, updated_at = datetime('now')
            WHERE scope_prefix = ?1 AND last_serial = ?2
            "#,
            params![scope_prefix, expected, new],
        )?;
        Ok(rows_affected > 0)
    }
}

impl SequenceStore for Database {
    fn scan_identifiers(&self, category: Category, prefix: &str) -> DbResult<Vec<String>> {
        match category {
            Category::ClinicBill => self.bill_numbers_with_prefix(BillType::Clinic, prefix),
            Category::PharmacyBill => self.bill_numbers_with_prefix(BillType::Pharmacy, prefix),
            Category::Prescription => self.prescription_serials_with_prefix(prefix),
            Category::Patient => self.patient_numbers_with_prefix(prefix),
        }
    }

    fn identifier_exists(&self, category: Category, identifier: &str) -> DbResult<bool> {
        match category {
            Category::ClinicBill | Category::PharmacyBill => self.bill_number_exists(identifier),
            Category::Prescription => self.prescription_serial_exists(identifier),
            Category::Patient => self.patient_number_exists(identifier),
        }
    }

    fn read_counter(&self, scope: &ScopeKey) -> DbResult<Option<u32>> {
        self.get_sequence_counter(scope.prefix())
    }

    fn compare_and_set_counter(&self, scope: &ScopeKey, expected: Option<u32>, new: u32) -> DbResult<bool> {
        match expected {
            None => self.insert_sequence_counter(scope.prefix(), scope.category(), new),
            Some(expected) => self.advance_sequence_counter(scope.prefix(), expected, new),
        }
    }
}
