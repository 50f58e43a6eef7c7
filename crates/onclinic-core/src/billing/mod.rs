//! Bill creation with identifier allocation and stock dispensing.

mod registry;

pub use registry::*;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::context::CallContext;
use crate::db::{Database, DbError};
use crate::ledger::{LedgerError, StockLedger};
use crate::models::{Bill, BillLineItem, BillType, StockAdjustment};
use crate::sequence::{
    Allocation, IdentifierFormat, SequenceAllocator, SequenceError, UniqueViolation,
};

/// Billing errors.
#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid bill: {0}")]
    InvalidBill(String),
}

pub type BillingResult<T> = Result<T, BillingError>;

impl UniqueViolation for BillingError {
    fn is_unique_violation(&self) -> bool {
        match self {
            BillingError::Database(e) => e.is_unique_violation(),
            BillingError::Sequence(e) => e.is_unique_violation(),
            _ => false,
        }
    }
}

/// What happens to a bill when one of its stock lines cannot be dispensed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispenseMode {
    /// The bill and all its dispenses commit together or not at all.
    Atomic,
    /// The bill commits first; each line is then dispensed on its own and
    /// the receipt reports which lines failed.
    #[default]
    BestEffort,
}

/// A bill to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBill {
    pub bill_type: BillType,
    pub patient_id: Option<String>,
    pub line_items: Vec<BillLineItem>,
    /// Drafts get no number and move no stock
    pub draft: bool,
    pub created_by: Option<String>,
}

impl NewBill {
    pub fn new(bill_type: BillType, line_items: Vec<BillLineItem>) -> Self {
        Self {
            bill_type,
            patient_id: None,
            line_items,
            draft: false,
            created_by: None,
        }
    }

    pub fn for_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn as_draft(mut self) -> Self {
        self.draft = true;
        self
    }

    fn validate(&self) -> BillingResult<()> {
        if self.line_items.is_empty() {
            return Err(BillingError::InvalidBill("bill has no line items".to_string()));
        }
        for line in &self.line_items {
            if line.is_stock_line() && line.quantity <= 0 {
                return Err(BillingError::InvalidBill(format!(
                    "quantity for '{}' must be positive, got {}",
                    line.description, line.quantity
                )));
            }
            if !line.unit_price.is_finite() || line.unit_price < 0.0 {
                return Err(BillingError::InvalidBill(format!(
                    "invalid unit price for '{}'",
                    line.description
                )));
            }
        }
        Ok(())
    }

    fn into_bill(self, bill_number: Option<String>) -> Bill {
        let mut bill = Bill::new(self.bill_type, bill_number, self.line_items);
        bill.patient_id = self.patient_id;
        bill.created_by = self.created_by;
        bill
    }
}

/// Result of dispensing one stock line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispenseOutcome {
    Dispensed {
        item_id: String,
        quantity: i64,
        entry_id: i64,
        remaining_stock: i64,
    },
    Failed {
        item_id: String,
        quantity: i64,
        reason: String,
    },
}

impl DispenseOutcome {
    pub fn is_dispensed(&self) -> bool {
        matches!(self, DispenseOutcome::Dispensed { .. })
    }
}

/// A created bill with its allocation and per-line dispense report.
#[derive(Debug, Clone, Serialize)]
pub struct BillReceipt {
    pub bill: Bill,
    /// `None` for drafts
    pub allocation: Option<Allocation>,
    pub dispensed: Vec<DispenseOutcome>,
}

impl BillReceipt {
    pub fn fully_dispensed(&self) -> bool {
        self.dispensed.iter().all(DispenseOutcome::is_dispensed)
    }
}

/// Bill, patient and prescription creation.
pub struct BillingService<'a> {
    db: &'a Database,
    allocator: SequenceAllocator<'a, Database>,
    format: IdentifierFormat,
    ledger: StockLedger<'a>,
    dispense_mode: DispenseMode,
}

impl<'a> BillingService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_config(db, &AppConfig::default())
    }

    pub fn with_config(db: &'a Database, config: &AppConfig) -> Self {
        Self {
            db,
            allocator: SequenceAllocator::with_config(db, &config.sequence),
            format: IdentifierFormat::from(&config.sequence),
            ledger: StockLedger::with_config(db, &config.ledger),
            dispense_mode: config.billing.dispense_mode,
        }
    }

    /// Create a bill dated `today`.
    ///
    /// Non-draft bills get a number from the bill type's scope and dispense
    /// every stock line with reason `dispense`, referencing the bill number.
    pub fn create_bill(&self, new_bill: NewBill, today: NaiveDate, ctx: &CallContext) -> BillingResult<BillReceipt> {
        new_bill.validate()?;

        if new_bill.draft {
            let bill = new_bill.into_bill(None);
            self.db.insert_bill(&bill)?;
            info!(bill_id = %bill.bill_id, bill_type = bill.bill_type.as_str(), "draft bill saved");
            return Ok(BillReceipt {
                bill,
                allocation: None,
                dispensed: Vec::new(),
            });
        }

        let scope = self.format.scope(new_bill.bill_type.category(), today);

        let receipt = match self.dispense_mode {
            DispenseMode::Atomic => {
                let committed = self.allocator.allocate_and_commit(&scope, ctx, |number| {
                    let bill = new_bill.clone().into_bill(Some(number.to_string()));

                    let tx = self.db.begin_immediate()?;
                    self.db.insert_bill(&bill)?;
                    let mut outcomes = Vec::new();
                    for line in bill.stock_lines() {
                        let adjustment = dispense_adjustment(&bill, line, number);
                        let result = self.ledger.apply_within(&adjustment)?;
                        outcomes.push(DispenseOutcome::Dispensed {
                            item_id: result.item.item_id,
                            quantity: line.quantity,
                            entry_id: result.entry.entry_id,
                            remaining_stock: result.item.current_stock,
                        });
                    }
                    tx.commit().map_err(DbError::from)?;

                    Ok::<_, BillingError>((bill, outcomes))
                })?;

                let (bill, dispensed) = committed.value;
                BillReceipt {
                    bill,
                    allocation: Some(committed.allocation),
                    dispensed,
                }
            }
            DispenseMode::BestEffort => {
                let committed = self.allocator.allocate_and_commit(&scope, ctx, |number| {
                    let bill = new_bill.clone().into_bill(Some(number.to_string()));
                    self.db.insert_bill(&bill)?;
                    Ok::<_, BillingError>(bill)
                })?;

                let bill = committed.value;
                let dispensed = self.dispense_each(&bill, ctx);
                BillReceipt {
                    bill,
                    allocation: Some(committed.allocation),
                    dispensed,
                }
            }
        };

        info!(
            bill_number = receipt.bill.bill_number.as_deref().unwrap_or_default(),
            bill_type = receipt.bill.bill_type.as_str(),
            lines = receipt.bill.line_items.len(),
            dispensed = receipt.dispensed.iter().filter(|o| o.is_dispensed()).count(),
            "bill created"
        );
        Ok(receipt)
    }

    fn dispense_each(&self, bill: &Bill, ctx: &CallContext) -> Vec<DispenseOutcome> {
        let number = bill.bill_number.as_deref().unwrap_or_default();

        bill.stock_lines()
            .map(|line| {
                let adjustment = dispense_adjustment(bill, line, number);
                match self.ledger.adjust_stock(&adjustment, ctx) {
                    Ok(result) => DispenseOutcome::Dispensed {
                        item_id: result.item.item_id,
                        quantity: line.quantity,
                        entry_id: result.entry.entry_id,
                        remaining_stock: result.item.current_stock,
                    },
                    Err(e) => {
                        warn!(
                            bill_number = number,
                            item_id = %adjustment.item_id,
                            error = %e,
                            "dispense failed, bill kept"
                        );
                        DispenseOutcome::Failed {
                            item_id: adjustment.item_id,
                            quantity: line.quantity,
                            reason: e.to_string(),
                        }
                    }
                }
            })
            .collect()
    }
}

fn dispense_adjustment(bill: &Bill, line: &BillLineItem, bill_number: &str) -> StockAdjustment {
    let mut adjustment = StockAdjustment::dispense(
        line.item_id.clone().unwrap_or_default(),
        line.quantity,
        bill_number,
    );
    adjustment.created_by = bill.created_by.clone();
    adjustment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BillingConfig;
    use crate::models::{InventoryItem, Reason};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 5).unwrap()
    }

    fn setup() -> (Database, String, String) {
        let db = Database::open_in_memory().unwrap();
        let ledger = StockLedger::new(&db);
        let pcm = ledger
            .create_item(&InventoryItem::new("Paracetamol".into(), "PCM".into(), 10))
            .unwrap();
        let ors = ledger
            .create_item(&InventoryItem::new("ORS".into(), "ORS".into(), 2))
            .unwrap();
        (db, pcm.item_id, ors.item_id)
    }

    fn config(mode: DispenseMode) -> AppConfig {
        AppConfig {
            billing: BillingConfig { dispense_mode: mode },
            ..AppConfig::default()
        }
    }

    fn pharmacy_bill(pcm: &str, ors: &str, ors_qty: i64) -> NewBill {
        NewBill::new(
            BillType::Pharmacy,
            vec![
                BillLineItem::medicine(pcm, "Paracetamol", 4, 2.0),
                BillLineItem::medicine(ors, "ORS", ors_qty, 15.0),
                BillLineItem::service("Dispensing fee", 10.0),
            ],
        )
    }

    #[test]
    fn test_best_effort_dispenses_and_numbers() {
        let (db, pcm, ors) = setup();
        let service = BillingService::new(&db);

        let receipt = service
            .create_bill(pharmacy_bill(&pcm, &ors, 1), today(), &CallContext::background())
            .unwrap();

        assert_eq!(receipt.bill.bill_number.as_deref(), Some("ONP-240507-0001"));
        assert!(receipt.fully_dispensed());
        assert_eq!(receipt.dispensed.len(), 2);
        assert_eq!(db.get_item(&pcm).unwrap().unwrap().current_stock, 6);

        let entries = db.ledger_entries_for_bill("ONP-240507-0001").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.reason == Reason::Dispense));
    }

    #[test]
    fn test_best_effort_reports_failed_line() {
        let (db, pcm, ors) = setup();
        let service = BillingService::new(&db);

        let receipt = service
            .create_bill(pharmacy_bill(&pcm, &ors, 3), today(), &CallContext::background())
            .unwrap();

        assert!(!receipt.fully_dispensed());
        assert!(receipt.dispensed[0].is_dispensed());
        assert!(matches!(&receipt.dispensed[1], DispenseOutcome::Failed { item_id, .. } if *item_id == ors));

        // Bill and the successful line stay committed.
        assert!(db.get_bill_by_number("ONP-240507-0001").unwrap().is_some());
        assert_eq!(db.get_item(&pcm).unwrap().unwrap().current_stock, 6);
        assert_eq!(db.get_item(&ors).unwrap().unwrap().current_stock, 2);
    }

    #[test]
    fn test_atomic_rolls_back_everything() {
        let (db, pcm, ors) = setup();
        let service = BillingService::with_config(&db, &config(DispenseMode::Atomic));

        let err = service
            .create_bill(pharmacy_bill(&pcm, &ors, 3), today(), &CallContext::background())
            .unwrap_err();
        assert!(matches!(err, BillingError::Ledger(LedgerError::Validation(_))));

        assert!(db.get_bill_by_number("ONP-240507-0001").unwrap().is_none());
        assert_eq!(db.get_item(&pcm).unwrap().unwrap().current_stock, 10);
        assert!(db.ledger_entries_for_item(&pcm).unwrap().is_empty());
    }

    #[test]
    fn test_atomic_success() {
        let (db, pcm, ors) = setup();
        let service = BillingService::with_config(&db, &config(DispenseMode::Atomic));

        let receipt = service
            .create_bill(pharmacy_bill(&pcm, &ors, 2), today(), &CallContext::background())
            .unwrap();
        assert!(receipt.fully_dispensed());
        assert_eq!(db.get_item(&ors).unwrap().unwrap().current_stock, 0);
        assert_eq!(
            StockLedger::new(&db).assert_consistent(&ors).unwrap().ledger_total,
            -2
        );
    }

    #[test]
    fn test_draft_never_dispenses() {
        let (db, pcm, ors) = setup();
        let service = BillingService::new(&db);

        let receipt = service
            .create_bill(pharmacy_bill(&pcm, &ors, 1).as_draft(), today(), &CallContext::background())
            .unwrap();

        assert!(receipt.bill.is_draft());
        assert!(receipt.allocation.is_none());
        assert!(receipt.dispensed.is_empty());
        assert_eq!(db.get_item(&pcm).unwrap().unwrap().current_stock, 10);
    }

    #[test]
    fn test_clinic_and_pharmacy_scopes_are_separate() {
        let (db, _, _) = setup();
        let service = BillingService::new(&db);
        let ctx = CallContext::background();
        let consult = || NewBill::new(BillType::Clinic, vec![BillLineItem::service("Consultation", 300.0)]);

        let first = service.create_bill(consult(), today(), &ctx).unwrap();
        let second = service.create_bill(consult(), today(), &ctx).unwrap();
        assert_eq!(first.bill.bill_number.as_deref(), Some("ON-2407-0001"));
        assert_eq!(second.bill.bill_number.as_deref(), Some("ON-2407-0002"));
    }

    #[test]
    fn test_invalid_bills_rejected() {
        let (db, pcm, _) = setup();
        let service = BillingService::new(&db);
        let ctx = CallContext::background();

        let empty = NewBill::new(BillType::Clinic, vec![]);
        assert!(matches!(
            service.create_bill(empty, today(), &ctx),
            Err(BillingError::InvalidBill(_))
        ));

        let zero_qty = NewBill::new(
            BillType::Pharmacy,
            vec![BillLineItem::medicine(pcm, "Paracetamol", 0, 2.0)],
        );
        assert!(matches!(
            service.create_bill(zero_qty, today(), &ctx),
            Err(BillingError::InvalidBill(_))
        ));
    }
}
