//! Prescription database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::Prescription;

impl Database {
    /// Insert a prescription.
    pub fn insert_prescription(&self, prescription: &Prescription) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                prescription_id, serial, patient_id, doctor_name, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                prescription.prescription_id,
                prescription.serial,
                prescription.patient_id,
                prescription.doctor_name,
                prescription.notes,
                prescription.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a prescription by serial.
    pub fn get_prescription_by_serial(&self, serial: &str) -> DbResult<Option<Prescription>> {
        self.conn
            .query_row(
                r#"
                SELECT prescription_id, serial, patient_id, doctor_name, notes, created_at
                FROM prescriptions
                WHERE serial = ?
                "#,
                [serial],
                |row| {
                    Ok(Prescription {
                        prescription_id: row.get(0)?,
                        serial: row.get(1)?,
                        patient_id: row.get(2)?,
                        doctor_name: row.get(3)?,
                        notes: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Serials starting with `prefix`.
    pub fn prescription_serials_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT serial FROM prescriptions WHERE substr(serial, 1, length(?1)) = ?1")?;
        let rows = stmt.query_map([prefix], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Check if a serial is taken.
    pub fn prescription_serial_exists(&self, serial: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM prescriptions WHERE serial = ?",
            [serial],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
