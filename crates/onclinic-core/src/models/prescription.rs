//! Prescription models.

use serde::{Deserialize, Serialize};

/// A prescription slip identified by its daily serial (`YYMMDDNNN`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub prescription_id: String,
    pub serial: String,
    pub patient_id: Option<String>,
    pub doctor_name: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

impl Prescription {
    pub fn new(serial: String, patient_id: Option<String>) -> Self {
        Self {
            prescription_id: uuid::Uuid::new_v4().to_string(),
            serial,
            patient_id,
            doctor_name: None,
            notes: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
