//! Bill database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{Bill, BillLineItem, BillType};

impl Database {
    /// Insert a bill. Fails with a unique violation if the number is taken.
    pub fn insert_bill(&self, bill: &Bill) -> DbResult<()> {
        let line_items_json = serde_json::to_string(&bill.line_items)?;

        self.conn.execute(
            r#"
            INSERT INTO bills (
                bill_id, bill_number, bill_type, patient_id, line_items,
                total, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                bill.bill_id,
                bill.bill_number,
                bill.bill_type.as_str(),
                bill.patient_id,
                line_items_json,
                bill.total,
                bill.created_by,
                bill.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a bill by ID.
    pub fn get_bill(&self, bill_id: &str) -> DbResult<Option<Bill>> {
        self.query_bill("bill_id", bill_id)
    }

    /// Get a bill by its human-readable number.
    pub fn get_bill_by_number(&self, bill_number: &str) -> DbResult<Option<Bill>> {
        self.query_bill("bill_number", bill_number)
    }

    fn query_bill(&self, column: &str, value: &str) -> DbResult<Option<Bill>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    SELECT bill_id, bill_number, bill_type, patient_id, line_items,
                           total, created_by, created_at
                    FROM bills
                    WHERE {column} = ?
                    "#
                ),
                [value],
                |row| {
                    Ok(BillRow {
                        bill_id: row.get(0)?,
                        bill_number: row.get(1)?,
                        bill_type: row.get(2)?,
                        patient_id: row.get(3)?,
                        line_items: row.get(4)?,
                        total: row.get(5)?,
                        created_by: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Numbers of bills of `bill_type` starting with `prefix`.
    ///
    /// Clinic and pharmacy bills share the table, so the type filter keeps
    /// one category's scan from seeing the other's numbers.
    pub fn bill_numbers_with_prefix(&self, bill_type: BillType, prefix: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT bill_number FROM bills
            WHERE bill_type = ?1
              AND bill_number IS NOT NULL
              AND substr(bill_number, 1, length(?2)) = ?2
            "#,
        )?;
        let rows = stmt.query_map(params![bill_type.as_str(), prefix], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Check if a bill number is taken (by a bill of any type).
    pub fn bill_number_exists(&self, bill_number: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM bills WHERE bill_number = ?",
            [bill_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Intermediate row struct for database mapping.
struct BillRow {
    bill_id: String,
    bill_number: Option<String>,
    bill_type: String,
    patient_id: Option<String>,
    line_items: String,
    total: f64,
    created_by: Option<String>,
    created_at: String,
}

impl TryFrom<BillRow> for Bill {
    type Error = DbError;

    fn try_from(row: BillRow) -> Result<Self, Self::Error> {
        let line_items: Vec<BillLineItem> = serde_json::from_str(&row.line_items)?;
        let bill_type = BillType::parse(&row.bill_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown bill type: {}", row.bill_type)))?;

        Ok(Bill {
            bill_id: row.bill_id,
            bill_number: row.bill_number,
            bill_type,
            patient_id: row.patient_id,
            line_items,
            total: row.total,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}
