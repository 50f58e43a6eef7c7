//! Patient models.

use serde::{Deserialize, Serialize};

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Local UUID - always present, generated locally
    pub local_id: String,
    /// Human-readable registration number (`YYYY/NNNN`)
    pub patient_number: String,
    /// Patient name
    pub name: String,
    /// Age in years
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(patient_number: String, name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            patient_number,
            name,
            age: None,
            gender: None,
            phone: None,
            address: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
