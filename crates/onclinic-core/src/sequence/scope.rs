//! Numbering scopes and identifier formatting.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::SequenceConfig;

/// Kind of record an identifier is issued for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// `ON-YYMM-NNNN`
    ClinicBill,
    /// `ONP-YYDDMM-NNNN`
    PharmacyBill,
    /// `YYMMDDNNN`
    Prescription,
    /// `YYYY/NNNN`
    Patient,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::ClinicBill,
        Category::PharmacyBill,
        Category::Prescription,
        Category::Patient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ClinicBill => "clinic_bill",
            Category::PharmacyBill => "pharmacy_bill",
            Category::Prescription => "prescription",
            Category::Patient => "patient",
        }
    }

    /// Accepts both `clinic-bill` and `clinic_bill` spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "clinic_bill" => Some(Category::ClinicBill),
            "pharmacy_bill" => Some(Category::PharmacyBill),
            "prescription" => Some(Category::Prescription),
            "patient" => Some(Category::Patient),
            _ => None,
        }
    }

    /// Zero-padded width of the serial.
    pub fn serial_width(&self) -> usize {
        match self {
            Category::Prescription => 3,
            _ => 4,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An independent numbering namespace: a category plus a calendar period.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    category: Category,
    period: String,
    prefix: String,
}

impl ScopeKey {
    pub fn category(&self) -> Category {
        self.category
    }

    /// Period portion derived from the date (e.g. `2405`).
    pub fn period(&self) -> &str {
        &self.period
    }

    /// Everything before the serial (e.g. `ON-2405-`).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Render a serial in this scope.
    pub fn format(&self, serial: u32) -> String {
        format!(
            "{}{:0width$}",
            self.prefix,
            serial,
            width = self.category.serial_width()
        )
    }

    /// Numeric tail of an identifier in this scope.
    ///
    /// Returns `None` for identifiers outside the scope and for malformed
    /// (empty or non-numeric) suffixes.
    pub fn parse_serial(&self, identifier: &str) -> Option<u32> {
        let suffix = identifier.strip_prefix(&self.prefix)?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok()
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

/// Site-specific identifier prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierFormat {
    pub clinic_bill_prefix: String,
    pub pharmacy_bill_prefix: String,
}

impl Default for IdentifierFormat {
    fn default() -> Self {
        Self {
            clinic_bill_prefix: "ON".to_string(),
            pharmacy_bill_prefix: "ONP".to_string(),
        }
    }
}

impl From<&SequenceConfig> for IdentifierFormat {
    fn from(config: &SequenceConfig) -> Self {
        Self {
            clinic_bill_prefix: config.clinic_bill_prefix.clone(),
            pharmacy_bill_prefix: config.pharmacy_bill_prefix.clone(),
        }
    }
}

impl IdentifierFormat {
    /// Scope for `category` on `date`.
    ///
    /// Pharmacy bills use year-day-month, unlike every other category.
    /// Existing bill books are numbered that way, so it stays.
    pub fn scope(&self, category: Category, date: NaiveDate) -> ScopeKey {
        let (period, prefix) = match category {
            Category::ClinicBill => {
                let period = date.format("%y%m").to_string();
                let prefix = format!("{}-{}-", self.clinic_bill_prefix, period);
                (period, prefix)
            }
            Category::PharmacyBill => {
                let period = date.format("%y%d%m").to_string();
                let prefix = format!("{}-{}-", self.pharmacy_bill_prefix, period);
                (period, prefix)
            }
            Category::Prescription => {
                let period = date.format("%y%m%d").to_string();
                (period.clone(), period)
            }
            Category::Patient => {
                let period = date.format("%Y").to_string();
                let prefix = format!("{}/", period);
                (period, prefix)
            }
        };

        ScopeKey {
            category,
            period,
            prefix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_prefixes() {
        let format = IdentifierFormat::default();
        let day = date(2024, 5, 7);

        assert_eq!(format.scope(Category::ClinicBill, day).prefix(), "ON-2405-");
        assert_eq!(format.scope(Category::PharmacyBill, day).prefix(), "ONP-240705-");
        assert_eq!(format.scope(Category::Prescription, day).prefix(), "240507");
        assert_eq!(format.scope(Category::Patient, day).prefix(), "2024/");
    }

    #[test]
    fn test_format_widths() {
        let format = IdentifierFormat::default();
        let day = date(2024, 5, 7);

        assert_eq!(format.scope(Category::ClinicBill, day).format(1), "ON-2405-0001");
        assert_eq!(format.scope(Category::PharmacyBill, day).format(12), "ONP-240705-0012");
        assert_eq!(format.scope(Category::Prescription, day).format(7), "240507007");
        assert_eq!(format.scope(Category::Patient, day).format(123), "2024/0123");
        // Serials past the padding width just grow.
        assert_eq!(format.scope(Category::Prescription, day).format(1000), "2405071000");
    }

    #[test]
    fn test_parse_serial() {
        let scope = IdentifierFormat::default().scope(Category::ClinicBill, date(2024, 5, 1));

        assert_eq!(scope.parse_serial("ON-2405-0009"), Some(9));
        assert_eq!(scope.parse_serial("ON-2405-12345"), Some(12345));
        assert_eq!(scope.parse_serial("ON-2405-"), None);
        assert_eq!(scope.parse_serial("ON-2405-00A1"), None);
        assert_eq!(scope.parse_serial("ON-2405--001"), None);
        assert_eq!(scope.parse_serial("ON-2406-0001"), None);
    }

    #[test]
    fn test_custom_prefixes() {
        let format = IdentifierFormat {
            clinic_bill_prefix: "CL".into(),
            pharmacy_bill_prefix: "PH".into(),
        };
        let day = date(2025, 1, 31);
        assert_eq!(format.scope(Category::ClinicBill, day).format(5), "CL-2501-0005");
        assert_eq!(format.scope(Category::PharmacyBill, day).format(5), "PH-253101-0005");
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("clinic-bill"), Some(Category::ClinicBill));
        assert_eq!(Category::parse("pharmacy_bill"), Some(Category::PharmacyBill));
        assert_eq!(Category::parse("Patient"), Some(Category::Patient));
        assert_eq!(Category::parse("invoice"), None);
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
    }
}
