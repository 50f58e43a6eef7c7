//! Bill models.

use serde::{Deserialize, Serialize};

use crate::sequence::Category;

/// Which counter a bill draws its number from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    /// Consultation and service bills (`ON-YYMM-NNNN`)
    Clinic,
    /// Medicine sales (`ONP-YYDDMM-NNNN`)
    Pharmacy,
}

impl BillType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillType::Clinic => "clinic",
            BillType::Pharmacy => "pharmacy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clinic" => Some(BillType::Clinic),
            "pharmacy" => Some(BillType::Pharmacy),
            _ => None,
        }
    }

    /// Sequence category used to number bills of this type.
    pub fn category(&self) -> Category {
        match self {
            BillType::Clinic => Category::ClinicBill,
            BillType::Pharmacy => Category::PharmacyBill,
        }
    }
}

/// One line on a bill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillLineItem {
    /// Inventory item dispensed by this line; `None` for services
    pub item_id: Option<String>,
    pub description: String,
    /// Units sold; dispensed lines must be positive
    pub quantity: i64,
    pub unit_price: f64,
}

impl BillLineItem {
    /// A line that draws stock from inventory.
    pub fn medicine(item_id: impl Into<String>, description: impl Into<String>, quantity: i64, unit_price: f64) -> Self {
        Self {
            item_id: Some(item_id.into()),
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    /// A line with no stock effect (consultation, procedure).
    pub fn service(description: impl Into<String>, unit_price: f64) -> Self {
        Self {
            item_id: None,
            description: description.into(),
            quantity: 1,
            unit_price,
        }
    }

    pub fn amount(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }

    pub fn is_stock_line(&self) -> bool {
        self.item_id.is_some()
    }
}

/// A persisted bill. A bill without a number is a draft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bill {
    pub bill_id: String,
    pub bill_number: Option<String>,
    pub bill_type: BillType,
    pub patient_id: Option<String>,
    pub line_items: Vec<BillLineItem>,
    pub total: f64,
    pub created_by: Option<String>,
    pub created_at: String,
}

impl Bill {
    pub fn new(bill_type: BillType, bill_number: Option<String>, line_items: Vec<BillLineItem>) -> Self {
        let total = line_items.iter().map(BillLineItem::amount).sum();
        Self {
            bill_id: uuid::Uuid::new_v4().to_string(),
            bill_number,
            bill_type,
            patient_id: None,
            line_items,
            total,
            created_by: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_draft(&self) -> bool {
        self.bill_number.is_none()
    }

    /// Lines that move inventory when the bill is finalised.
    pub fn stock_lines(&self) -> impl Iterator<Item = &BillLineItem> {
        self.line_items.iter().filter(|line| line.is_stock_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_total() {
        let bill = Bill::new(
            BillType::Pharmacy,
            Some("ONP-240705-0001".into()),
            vec![
                BillLineItem::medicine("item-1", "Amoxicillin 250mg", 10, 2.5),
                BillLineItem::service("Dressing", 40.0),
            ],
        );
        assert_eq!(bill.total, 65.0);
        assert!(!bill.is_draft());
        assert_eq!(bill.stock_lines().count(), 1);
    }

    #[test]
    fn test_bill_type_round_trip_and_category() {
        assert_eq!(BillType::parse("clinic"), Some(BillType::Clinic));
        assert_eq!(BillType::parse(BillType::Pharmacy.as_str()), Some(BillType::Pharmacy));
        assert_eq!(BillType::parse("lab"), None);
        assert_eq!(BillType::Pharmacy.category(), Category::PharmacyBill);
    }

    #[test]
    fn test_draft_bill() {
        let bill = Bill::new(BillType::Clinic, None, vec![]);
        assert!(bill.is_draft());
        assert_eq!(bill.total, 0.0);
    }
}
