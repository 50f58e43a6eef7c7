//! SQLite schema definition.

/// Complete database schema for onclinic.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    local_id TEXT PRIMARY KEY,
    patient_number TEXT NOT NULL UNIQUE,        -- YYYY/NNNN
    name TEXT NOT NULL,
    age INTEGER,
    gender TEXT,
    phone TEXT,
    address TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);

-- ============================================================================
-- Bills (clinic and pharmacy share one table, split by bill_type)
-- ============================================================================

CREATE TABLE IF NOT EXISTS bills (
    bill_id TEXT PRIMARY KEY,
    bill_number TEXT UNIQUE,                     -- NULL while the bill is a draft
    bill_type TEXT NOT NULL CHECK (bill_type IN ('clinic', 'pharmacy')),
    patient_id TEXT REFERENCES patients(local_id),
    line_items TEXT NOT NULL DEFAULT '[]',       -- JSON array of BillLineItem
    total REAL NOT NULL DEFAULT 0,
    created_by TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_bills_type_number ON bills(bill_type, bill_number);

-- ============================================================================
-- Prescriptions
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    prescription_id TEXT PRIMARY KEY,
    serial TEXT NOT NULL UNIQUE,                 -- YYMMDDNNN
    patient_id TEXT REFERENCES patients(local_id),
    doctor_name TEXT,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Inventory Items (current_stock is a projection of the ledger)
-- ============================================================================

CREATE TABLE IF NOT EXISTS inventory_items (
    item_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sku TEXT NOT NULL UNIQUE,
    unit TEXT NOT NULL DEFAULT 'unit',
    cost_price REAL NOT NULL DEFAULT 0,
    sale_price REAL NOT NULL DEFAULT 0,
    opening_stock INTEGER NOT NULL DEFAULT 0,
    current_stock INTEGER NOT NULL DEFAULT 0,
    low_stock_threshold INTEGER,
    category TEXT,
    manufacturer TEXT,
    expiry_date TEXT,                            -- YYYY-MM-DD
    batch_number TEXT,
    tax_rate REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Stock Ledger (Append-Only - Immutable after creation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS stock_ledger (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id TEXT NOT NULL REFERENCES inventory_items(item_id),
    change INTEGER NOT NULL CHECK (change != 0),
    reason TEXT NOT NULL CHECK (reason IN ('purchase', 'dispense', 'adjustment', 'correction')),
    notes TEXT,
    reference_bill_id TEXT,
    created_by TEXT,
    created_at TEXT NOT NULL,
    prev_hash TEXT,                              -- entry_hash of the item's previous entry
    entry_hash TEXT NOT NULL UNIQUE              -- SHA-256 over prev_hash and entry content
);

CREATE INDEX IF NOT EXISTS idx_ledger_item ON stock_ledger(item_id, entry_id);
CREATE INDEX IF NOT EXISTS idx_ledger_bill ON stock_ledger(reference_bill_id);

CREATE TRIGGER IF NOT EXISTS stock_ledger_no_update BEFORE UPDATE ON stock_ledger
BEGIN
    SELECT RAISE(ABORT, 'stock_ledger is append-only');
END;

CREATE TRIGGER IF NOT EXISTS stock_ledger_no_delete BEFORE DELETE ON stock_ledger
BEGIN
    SELECT RAISE(ABORT, 'stock_ledger is append-only');
END;

-- ============================================================================
-- Sequence Counters (one row per scope, advanced by compare-and-swap)
-- ============================================================================

CREATE TABLE IF NOT EXISTS sequence_counters (
    scope_prefix TEXT PRIMARY KEY,               -- e.g. ON-2405-
    category TEXT NOT NULL,
    last_serial INTEGER NOT NULL CHECK (last_serial >= 0),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
