//! Patient registration and prescription slips.

use chrono::NaiveDate;
use tracing::info;

use super::{BillingError, BillingResult, BillingService};
use crate::context::CallContext;
use crate::models::{Patient, Prescription};
use crate::sequence::Category;

/// Details for a new patient; the registration number is allocated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPatient {
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Details for a new prescription; the serial is allocated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPrescription {
    pub patient_id: Option<String>,
    pub doctor_name: Option<String>,
    pub notes: Option<String>,
}

impl BillingService<'_> {
    /// Register a patient under the next `YYYY/NNNN` number for `today`.
    pub fn register_patient(&self, new_patient: NewPatient, today: NaiveDate, ctx: &CallContext) -> BillingResult<Patient> {
        let scope = self.format.scope(Category::Patient, today);

        let committed = self.allocator.allocate_and_commit(&scope, ctx, |number| {
            let mut patient = Patient::new(number.to_string(), new_patient.name.clone());
            patient.age = new_patient.age;
            patient.gender = new_patient.gender.clone();
            patient.phone = new_patient.phone.clone();
            patient.address = new_patient.address.clone();
            self.db.insert_patient(&patient)?;
            Ok::<_, BillingError>(patient)
        })?;

        info!(patient_number = %committed.value.patient_number, "patient registered");
        Ok(committed.value)
    }

    /// Record a prescription under the next `YYMMDDNNN` serial for `today`.
    pub fn create_prescription(
        &self,
        new_prescription: NewPrescription,
        today: NaiveDate,
        ctx: &CallContext,
    ) -> BillingResult<Prescription> {
        let scope = self.format.scope(Category::Prescription, today);

        let committed = self.allocator.allocate_and_commit(&scope, ctx, |serial| {
            let mut prescription = Prescription::new(serial.to_string(), new_prescription.patient_id.clone());
            prescription.doctor_name = new_prescription.doctor_name.clone();
            prescription.notes = new_prescription.notes.clone();
            self.db.insert_prescription(&prescription)?;
            Ok::<_, BillingError>(prescription)
        })?;

        info!(serial = %committed.value.serial, "prescription created");
        Ok(committed.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn named(name: &str) -> NewPatient {
        NewPatient {
            name: name.to_string(),
            ..NewPatient::default()
        }
    }

    #[test]
    fn test_patient_numbers_reset_each_year() {
        let db = Database::open_in_memory().unwrap();
        let service = BillingService::new(&db);
        let ctx = CallContext::background();

        let a = service.register_patient(named("Asha"), date(2024, 12, 31), &ctx).unwrap();
        let b = service.register_patient(named("Ravi"), date(2024, 12, 31), &ctx).unwrap();
        let c = service.register_patient(named("Meera"), date(2025, 1, 1), &ctx).unwrap();

        assert_eq!(a.patient_number, "2024/0001");
        assert_eq!(b.patient_number, "2024/0002");
        assert_eq!(c.patient_number, "2025/0001");
        assert_eq!(db.get_patient_by_number("2024/0002").unwrap().unwrap().name, "Ravi");
    }

    #[test]
    fn test_prescription_serials_are_daily() {
        let db = Database::open_in_memory().unwrap();
        let service = BillingService::new(&db);
        let ctx = CallContext::background();
        let patient = service.register_patient(named("Asha"), date(2024, 5, 7), &ctx).unwrap();

        let rx = NewPrescription {
            patient_id: Some(patient.local_id.clone()),
            doctor_name: Some("Dr. Iyer".into()),
            notes: None,
        };
        let first = service.create_prescription(rx.clone(), date(2024, 5, 7), &ctx).unwrap();
        let second = service.create_prescription(rx.clone(), date(2024, 5, 7), &ctx).unwrap();
        let next_day = service.create_prescription(rx, date(2024, 5, 8), &ctx).unwrap();

        assert_eq!(first.serial, "240507001");
        assert_eq!(second.serial, "240507002");
        assert_eq!(next_day.serial, "240508001");
    }

    #[test]
    fn test_unknown_patient_is_not_retried() {
        let db = Database::open_in_memory().unwrap();
        let service = BillingService::new(&db);

        let rx = NewPrescription {
            patient_id: Some("ghost".into()),
            ..NewPrescription::default()
        };
        let err = service
            .create_prescription(rx, date(2024, 5, 7), &CallContext::background())
            .unwrap_err();
        assert!(matches!(err, BillingError::Database(_)));
    }
}
