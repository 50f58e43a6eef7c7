//! Onclinic Core Library
//!
//! Collision-free identifiers and an auditable stock ledger for a clinic
//! and pharmacy front desk.
//!
//! # Architecture
//!
//! ```text
//!   register patient ─┐
//!   prescription ─────┼──► SequenceAllocator ──► allocate_and_commit ──► UNIQUE column
//!   bill ─────────────┘           │                                        (backstop)
//!                                 │
//!                          bill number
//!                                 │
//!                                 ▼
//!                   StockLedger::adjust_stock  (BEGIN IMMEDIATE)
//!                   ┌─────────────────────────────────────────┐
//!                   │ validate → append entry (hash chained)  │
//!                   │ → current_stock += delta → re-read      │
//!                   └─────────────────────────────────────────┘
//!                                 │
//!                   reconcile: opening + Σ change == current
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite store, one handle per caller
//! - [`models`]: Domain types (Patient, Bill, InventoryItem, LedgerEntry, etc.)
//! - [`sequence`]: Scoped identifier allocation
//! - [`ledger`]: Stock adjustments, reports and reconciliation
//! - [`billing`]: Bill creation with dispensing, patient and prescription numbering
//! - [`config`]: File + environment configuration

pub mod billing;
pub mod config;
pub mod context;
pub mod db;
pub mod ledger;
pub mod models;
pub mod sequence;

// Re-export commonly used types
pub use billing::{BillReceipt, BillingService, DispenseMode, DispenseOutcome, NewBill};
pub use config::AppConfig;
pub use context::CallContext;
pub use db::Database;
pub use ledger::{AdjustmentResult, Reconciliation, StockLedger};
pub use models::{
    Bill, BillLineItem, BillType, InventoryItem, LedgerEntry, LowStockItem, Patient,
    Prescription, Reason, StockAdjustment,
};
pub use sequence::{Allocation, AllocationStrategy, Category, SequenceAllocator};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum OnclinicError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Busy, locked or I/O failure; the whole call may be retried.
    #[error("Database temporarily unavailable: {0}")]
    Transient(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Identifier contention: {0}")]
    Contention(String),

    #[error("Ledger inconsistency: {0}")]
    Inconsistency(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<db::DbError> for OnclinicError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => OnclinicError::NotFound(what),
            other if other.is_transient() => OnclinicError::Transient(other.to_string()),
            other => OnclinicError::DatabaseError(other.to_string()),
        }
    }
}

impl From<sequence::SequenceError> for OnclinicError {
    fn from(e: sequence::SequenceError) -> Self {
        match e {
            sequence::SequenceError::Database(e) => e.into(),
            sequence::SequenceError::Interrupted(e) => OnclinicError::Interrupted(e.to_string()),
            other => OnclinicError::Contention(other.to_string()),
        }
    }
}

impl From<ledger::LedgerError> for OnclinicError {
    fn from(e: ledger::LedgerError) -> Self {
        use ledger::LedgerError;
        match e {
            LedgerError::Database(e) => e.into(),
            LedgerError::Validation(e) => OnclinicError::InvalidInput(e.to_string()),
            LedgerError::ItemNotFound(id) => OnclinicError::NotFound(format!("inventory item {}", id)),
            LedgerError::Interrupted(e) => OnclinicError::Interrupted(e.to_string()),
            other @ (LedgerError::Inconsistency { .. }
            | LedgerError::BrokenChain { .. }
            | LedgerError::BalanceUpdateFailed(_)) => OnclinicError::Inconsistency(other.to_string()),
            other => OnclinicError::DatabaseError(other.to_string()),
        }
    }
}

impl From<billing::BillingError> for OnclinicError {
    fn from(e: billing::BillingError) -> Self {
        use billing::BillingError;
        match e {
            BillingError::Sequence(e) => e.into(),
            BillingError::Ledger(e) => e.into(),
            BillingError::Database(e) => e.into(),
            BillingError::InvalidBill(msg) => OnclinicError::InvalidInput(msg),
        }
    }
}

impl From<::config::ConfigError> for OnclinicError {
    fn from(e: ::config::ConfigError) -> Self {
        OnclinicError::ConfigError(e.to_string())
    }
}

impl From<models::ValidationError> for OnclinicError {
    fn from(e: models::ValidationError) -> Self {
        OnclinicError::InvalidInput(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for OnclinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        OnclinicError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
///
/// Other settings come from `config/onclinic.toml` and `ONCLINIC__*`
/// environment variables when present.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<OnclinicCore>, OnclinicError> {
    let mut config = AppConfig::load()?;
    config.database.path = path.into();
    let db = Database::open_with_config(&config.database)?;
    Ok(Arc::new(OnclinicCore {
        db: Arc::new(Mutex::new(db)),
        config,
    }))
}

/// Create an in-memory database with default settings (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<OnclinicCore>, OnclinicError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(OnclinicCore {
        db: Arc::new(Mutex::new(db)),
        config: AppConfig::default(),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct OnclinicCore {
    db: Arc<Mutex<Database>>,
    config: AppConfig,
}

#[uniffi::export]
impl OnclinicCore {
    // =========================================================================
    // Identifier Operations
    // =========================================================================

    /// Reserve the next identifier for a category without creating a record.
    pub fn allocate_identifier(&self, category: String) -> Result<FfiAllocation, OnclinicError> {
        let category = Category::parse(&category)
            .ok_or_else(|| OnclinicError::InvalidInput(format!("unknown category: {}", category)))?;
        let db = self.db.lock()?;
        let scope = sequence::IdentifierFormat::from(&self.config.sequence).scope(category, today());
        let allocator = SequenceAllocator::with_config(&*db, &self.config.sequence);
        let allocation = allocator.allocate(&scope, &CallContext::background())?;
        Ok(allocation.into())
    }

    /// Register a patient under the next patient number.
    pub fn register_patient(
        &self,
        name: String,
        age: Option<u32>,
        gender: Option<String>,
        phone: Option<String>,
    ) -> Result<FfiPatient, OnclinicError> {
        let db = self.db.lock()?;
        let service = BillingService::with_config(&db, &self.config);
        let patient = service.register_patient(
            billing::NewPatient {
                name,
                age,
                gender,
                phone,
                address: None,
            },
            today(),
            &CallContext::background(),
        )?;
        Ok(patient.into())
    }

    /// Get a patient by registration number.
    pub fn get_patient_by_number(&self, patient_number: String) -> Result<Option<FfiPatient>, OnclinicError> {
        let db = self.db.lock()?;
        let patient = db.get_patient_by_number(&patient_number)?;
        Ok(patient.map(|p| p.into()))
    }

    /// Record a prescription under the next daily serial.
    pub fn create_prescription(
        &self,
        patient_id: Option<String>,
        doctor_name: Option<String>,
        notes: Option<String>,
    ) -> Result<FfiPrescription, OnclinicError> {
        let db = self.db.lock()?;
        let service = BillingService::with_config(&db, &self.config);
        let prescription = service.create_prescription(
            billing::NewPrescription {
                patient_id,
                doctor_name,
                notes,
            },
            today(),
            &CallContext::background(),
        )?;
        Ok(prescription.into())
    }

    // =========================================================================
    // Billing Operations
    // =========================================================================

    /// Create a bill; non-draft bills are numbered and dispense their stock lines.
    pub fn create_bill(&self, bill: FfiNewBill) -> Result<FfiBillReceipt, OnclinicError> {
        let new_bill = NewBill::try_from(bill)?;
        let db = self.db.lock()?;
        let service = BillingService::with_config(&db, &self.config);
        let receipt = service.create_bill(new_bill, today(), &CallContext::background())?;
        Ok(receipt.into())
    }

    // =========================================================================
    // Inventory Operations
    // =========================================================================

    /// Add an inventory item.
    pub fn add_inventory_item(&self, item: FfiNewItem) -> Result<FfiInventoryItem, OnclinicError> {
        let item = InventoryItem::try_from(item)?;
        let db = self.db.lock()?;
        let ledger = StockLedger::with_config(&db, &self.config.ledger);
        Ok(ledger.create_item(&item)?.into())
    }

    /// Get an inventory item by ID.
    pub fn get_inventory_item(&self, item_id: String) -> Result<Option<FfiInventoryItem>, OnclinicError> {
        let db = self.db.lock()?;
        Ok(db.get_item(&item_id)?.map(|i| i.into()))
    }

    /// Apply a signed stock change.
    pub fn adjust_stock(&self, adjustment: FfiStockAdjustment) -> Result<FfiAdjustmentResult, OnclinicError> {
        let adjustment = StockAdjustment::try_from(adjustment)?;
        let db = self.db.lock()?;
        let ledger = StockLedger::with_config(&db, &self.config.ledger);
        let result = ledger.adjust_stock(&adjustment, &CallContext::background())?;
        Ok(result.into())
    }

    /// Ledger entries for an item, oldest first.
    pub fn item_history(&self, item_id: String) -> Result<Vec<FfiLedgerEntry>, OnclinicError> {
        let db = self.db.lock()?;
        let ledger = StockLedger::with_config(&db, &self.config.ledger);
        Ok(ledger.history(&item_id)?.into_iter().map(|e| e.into()).collect())
    }

    /// Stock movements recorded against a bill number.
    pub fn bill_ledger_entries(&self, bill_number: String) -> Result<Vec<FfiLedgerEntry>, OnclinicError> {
        let db = self.db.lock()?;
        Ok(db.ledger_entries_for_bill(&bill_number)?.into_iter().map(|e| e.into()).collect())
    }

    /// Items at or below their reorder level, lowest stock first.
    pub fn low_stock_items(&self) -> Result<Vec<FfiLowStockItem>, OnclinicError> {
        let db = self.db.lock()?;
        let ledger = StockLedger::with_config(&db, &self.config.ledger);
        Ok(ledger.low_stock_items()?.into_iter().map(|i| i.into()).collect())
    }

    /// Items expiring within the given number of months, soonest first.
    pub fn expiring_items(&self, within_months: u32) -> Result<Vec<FfiInventoryItem>, OnclinicError> {
        let db = self.db.lock()?;
        let ledger = StockLedger::with_config(&db, &self.config.ledger);
        Ok(ledger
            .expiring_items(within_months, today())?
            .into_iter()
            .map(|i| i.into())
            .collect())
    }

    /// Reconcile every item's balance against its ledger.
    pub fn reconcile_all(&self) -> Result<Vec<FfiReconciliation>, OnclinicError> {
        let db = self.db.lock()?;
        let ledger = StockLedger::with_config(&db, &self.config.ledger);
        Ok(ledger.reconcile_all()?.into_iter().map(|r| r.into()).collect())
    }

    /// Reset an item's balance to its ledger projection.
    pub fn repair_item(&self, item_id: String) -> Result<FfiReconciliation, OnclinicError> {
        let db = self.db.lock()?;
        let ledger = StockLedger::with_config(&db, &self.config.ledger);
        Ok(ledger.repair_item(&item_id)?.into())
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn parse_date(value: &str) -> Result<NaiveDate, OnclinicError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| OnclinicError::InvalidInput(format!("invalid date (want YYYY-MM-DD): {}", value)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe allocation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAllocation {
    pub identifier: String,
    pub serial: u32,
    pub attempts: u32,
    pub verified: bool,
}

impl From<Allocation> for FfiAllocation {
    fn from(allocation: Allocation) -> Self {
        Self {
            identifier: allocation.identifier,
            serial: allocation.serial,
            attempts: allocation.attempts,
            verified: allocation.verified,
        }
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub local_id: String,
    pub patient_number: String,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            local_id: patient.local_id,
            patient_number: patient.patient_number,
            name: patient.name,
            age: patient.age,
            gender: patient.gender,
            phone: patient.phone,
        }
    }
}

/// FFI-safe prescription.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub prescription_id: String,
    pub serial: String,
    pub patient_id: Option<String>,
    pub doctor_name: Option<String>,
}

impl From<Prescription> for FfiPrescription {
    fn from(prescription: Prescription) -> Self {
        Self {
            prescription_id: prescription.prescription_id,
            serial: prescription.serial,
            patient_id: prescription.patient_id,
            doctor_name: prescription.doctor_name,
        }
    }
}

/// FFI-safe bill line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBillLine {
    pub item_id: Option<String>,
    pub description: String,
    pub quantity: i64,
    pub unit_price: f64,
}

impl From<FfiBillLine> for BillLineItem {
    fn from(line: FfiBillLine) -> Self {
        BillLineItem {
            item_id: line.item_id,
            description: line.description,
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

/// FFI-safe bill request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewBill {
    /// "clinic" or "pharmacy"
    pub bill_type: String,
    pub patient_id: Option<String>,
    pub line_items: Vec<FfiBillLine>,
    pub draft: bool,
    pub created_by: Option<String>,
}

impl TryFrom<FfiNewBill> for NewBill {
    type Error = OnclinicError;

    fn try_from(bill: FfiNewBill) -> Result<Self, Self::Error> {
        let bill_type = BillType::parse(&bill.bill_type)
            .ok_or_else(|| OnclinicError::InvalidInput(format!("unknown bill type: {}", bill.bill_type)))?;
        Ok(NewBill {
            bill_type,
            patient_id: bill.patient_id,
            line_items: bill.line_items.into_iter().map(|l| l.into()).collect(),
            draft: bill.draft,
            created_by: bill.created_by,
        })
    }
}

/// FFI-safe dispense result for one bill line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDispenseOutcome {
    pub item_id: String,
    pub quantity: i64,
    pub dispensed: bool,
    pub entry_id: Option<i64>,
    pub remaining_stock: Option<i64>,
    pub failure: Option<String>,
}

impl From<DispenseOutcome> for FfiDispenseOutcome {
    fn from(outcome: DispenseOutcome) -> Self {
        match outcome {
            DispenseOutcome::Dispensed {
                item_id,
                quantity,
                entry_id,
                remaining_stock,
            } => Self {
                item_id,
                quantity,
                dispensed: true,
                entry_id: Some(entry_id),
                remaining_stock: Some(remaining_stock),
                failure: None,
            },
            DispenseOutcome::Failed {
                item_id,
                quantity,
                reason,
            } => Self {
                item_id,
                quantity,
                dispensed: false,
                entry_id: None,
                remaining_stock: None,
                failure: Some(reason),
            },
        }
    }
}

/// FFI-safe bill receipt.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBillReceipt {
    pub bill_id: String,
    pub bill_number: Option<String>,
    pub bill_type: String,
    pub total: f64,
    /// False when the number came from the unverified fallback
    pub number_verified: bool,
    pub dispensed: Vec<FfiDispenseOutcome>,
}

impl From<BillReceipt> for FfiBillReceipt {
    fn from(receipt: BillReceipt) -> Self {
        Self {
            bill_id: receipt.bill.bill_id,
            bill_number: receipt.bill.bill_number,
            bill_type: receipt.bill.bill_type.as_str().to_string(),
            total: receipt.bill.total,
            number_verified: receipt.allocation.map(|a| a.verified).unwrap_or(true),
            dispensed: receipt.dispensed.into_iter().map(|o| o.into()).collect(),
        }
    }
}

/// FFI-safe new inventory item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewItem {
    pub name: String,
    pub sku: String,
    pub unit: Option<String>,
    pub opening_stock: i64,
    pub low_stock_threshold: Option<i64>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    /// YYYY-MM-DD
    pub expiry_date: Option<String>,
    pub batch_number: Option<String>,
    pub cost_price: f64,
    pub sale_price: f64,
}

impl TryFrom<FfiNewItem> for InventoryItem {
    type Error = OnclinicError;

    fn try_from(item: FfiNewItem) -> Result<Self, Self::Error> {
        let mut created = InventoryItem::new(item.name, item.sku, item.opening_stock);
        if let Some(unit) = item.unit {
            created.unit = unit;
        }
        created.low_stock_threshold = item.low_stock_threshold;
        created.category = item.category;
        created.manufacturer = item.manufacturer;
        created.expiry_date = item.expiry_date.as_deref().map(parse_date).transpose()?;
        created.batch_number = item.batch_number;
        created.cost_price = item.cost_price;
        created.sale_price = item.sale_price;
        Ok(created)
    }
}

/// FFI-safe inventory item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInventoryItem {
    pub item_id: String,
    pub name: String,
    pub sku: String,
    pub unit: String,
    pub opening_stock: i64,
    pub current_stock: i64,
    pub low_stock_threshold: Option<i64>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub expiry_date: Option<String>,
}

impl From<InventoryItem> for FfiInventoryItem {
    fn from(item: InventoryItem) -> Self {
        Self {
            item_id: item.item_id,
            name: item.name,
            sku: item.sku,
            unit: item.unit,
            opening_stock: item.opening_stock,
            current_stock: item.current_stock,
            low_stock_threshold: item.low_stock_threshold,
            category: item.category,
            manufacturer: item.manufacturer,
            expiry_date: item.expiry_date.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

/// FFI-safe low-stock row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLowStockItem {
    pub item_id: String,
    pub name: String,
    pub current_stock: i64,
    pub low_stock_threshold: i64,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
}

impl From<LowStockItem> for FfiLowStockItem {
    fn from(item: LowStockItem) -> Self {
        Self {
            item_id: item.item_id,
            name: item.name,
            current_stock: item.current_stock,
            low_stock_threshold: item.low_stock_threshold,
            category: item.category,
            manufacturer: item.manufacturer,
        }
    }
}

/// FFI-safe stock change request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockAdjustment {
    pub item_id: String,
    pub delta: i64,
    /// purchase, dispense, adjustment or correction
    pub reason: String,
    pub notes: Option<String>,
    pub reference_bill_id: Option<String>,
    pub created_by: Option<String>,
}

impl TryFrom<FfiStockAdjustment> for StockAdjustment {
    type Error = OnclinicError;

    fn try_from(adjustment: FfiStockAdjustment) -> Result<Self, Self::Error> {
        let reason = Reason::parse(&adjustment.reason)?;
        Ok(StockAdjustment {
            item_id: adjustment.item_id,
            delta: adjustment.delta,
            reason,
            notes: adjustment.notes,
            reference_bill_id: adjustment.reference_bill_id,
            created_by: adjustment.created_by,
        })
    }
}

/// FFI-safe ledger entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLedgerEntry {
    pub entry_id: i64,
    pub item_id: String,
    pub change: i64,
    pub reason: String,
    pub notes: Option<String>,
    pub reference_bill_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub entry_hash: String,
}

impl From<LedgerEntry> for FfiLedgerEntry {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            entry_id: entry.entry_id,
            item_id: entry.item_id,
            change: entry.change,
            reason: entry.reason.as_str().to_string(),
            notes: entry.notes,
            reference_bill_id: entry.reference_bill_id,
            created_by: entry.created_by,
            created_at: entry.created_at,
            entry_hash: entry.entry_hash,
        }
    }
}

/// FFI-safe adjustment result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAdjustmentResult {
    pub item: FfiInventoryItem,
    pub entry: FfiLedgerEntry,
}

impl From<AdjustmentResult> for FfiAdjustmentResult {
    fn from(result: AdjustmentResult) -> Self {
        Self {
            item: result.item.into(),
            entry: result.entry.into(),
        }
    }
}

/// FFI-safe reconciliation report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReconciliation {
    pub item_id: String,
    pub name: String,
    pub expected_stock: i64,
    pub recorded_stock: i64,
    pub drift: i64,
    pub chain_intact: bool,
}

impl From<Reconciliation> for FfiReconciliation {
    fn from(report: Reconciliation) -> Self {
        Self {
            drift: report.drift(),
            chain_intact: report.chain_intact(),
            item_id: report.item_id,
            name: report.name,
            expected_stock: report.expected_stock,
            recorded_stock: report.recorded_stock,
        }
    }
}
