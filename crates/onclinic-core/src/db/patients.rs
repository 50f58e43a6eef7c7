//! Patient database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::Patient;

const PATIENT_COLUMNS: &str = "local_id, patient_number, name, age, gender, phone, address, created_at, updated_at";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        local_id: row.get(0)?,
        patient_number: row.get(1)?,
        name: row.get(2)?,
        age: row.get(3)?,
        gender: row.get(4)?,
        phone: row.get(5)?,
        address: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                local_id, patient_number, name, age, gender, phone, address,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                patient.local_id,
                patient.patient_number,
                patient.name,
                patient.age,
                patient.gender,
                patient.phone,
                patient.address,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a patient by local ID.
    pub fn get_patient(&self, local_id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE local_id = ?"),
                [local_id],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get a patient by registration number.
    pub fn get_patient_by_number(&self, patient_number: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE patient_number = ?"),
                [patient_number],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Patient numbers starting with `prefix`.
    pub fn patient_numbers_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT patient_number FROM patients WHERE substr(patient_number, 1, length(?1)) = ?1",
        )?;
        let rows = stmt.query_map([prefix], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Check if a patient number is taken.
    pub fn patient_number_exists(&self, patient_number: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE patient_number = ?",
            [patient_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut patient = Patient::new("2024/0001".into(), "Asha Rao".into());
        patient.age = Some(34);
        patient.phone = Some("98450 12345".into());
        db.insert_patient(&patient).unwrap();

        let retrieved = db.get_patient(&patient.local_id).unwrap().unwrap();
        assert_eq!(retrieved, patient);

        let by_number = db.get_patient_by_number("2024/0001").unwrap().unwrap();
        assert_eq!(by_number.local_id, patient.local_id);
    }

    #[test]
    fn test_duplicate_number_rejected() {
        let db = setup_db();
        db.insert_patient(&Patient::new("2024/0001".into(), "A".into()))
            .unwrap();

        let err = db
            .insert_patient(&Patient::new("2024/0001".into(), "B".into()))
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_prefix_scan() {
        let db = setup_db();
        for number in ["2023/0009", "2024/0001", "2024/0002"] {
            db.insert_patient(&Patient::new(number.into(), "P".into()))
                .unwrap();
        }

        let mut numbers = db.patient_numbers_with_prefix("2024/").unwrap();
        numbers.sort();
        assert_eq!(numbers, vec!["2024/0001", "2024/0002"]);

        assert!(db.patient_number_exists("2023/0009").unwrap());
        assert!(!db.patient_number_exists("2024/0003").unwrap());
    }
}
