//! Scoped sequence allocation for bill numbers, prescription serials and
//! patient numbers.
//!
//! Identifiers look like `<prefix><period><zero-padded serial>` and must be
//! unique within their scope. There is no lock: the allocator either
//! rescans and verifies its candidate (`ScanVerify`) or advances a per-scope
//! counter row with compare-and-swap (`Counter`), retrying a bounded number
//! of times when another caller wins the race.

mod allocator;
mod scope;

pub use allocator::*;
pub use scope::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::Interrupted;
use crate::db::{DbError, DbResult};

/// Sequence allocation errors.
#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Scope {scope} still contended after {attempts} attempts")]
    ExhaustedRetries { scope: String, attempts: u32 },

    #[error("Serial space exhausted for scope {0}")]
    SerialOverflow(String),

    #[error("Allocation interrupted: {0}")]
    Interrupted(#[from] Interrupted),
}

pub type SequenceResult<T> = Result<T, SequenceError>;

/// How the allocator derives the next serial.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Scan issued identifiers, take max + 1, verify by point lookup.
    /// Falls back to an unverified random suffix after the last attempt.
    #[default]
    ScanVerify,
    /// Advance a `sequence_counters` row with compare-and-swap. Never falls
    /// back; exhaustion is an error.
    Counter,
}

/// Errors a commit step can report as "someone already holds this identifier".
pub trait UniqueViolation {
    fn is_unique_violation(&self) -> bool;
}

impl UniqueViolation for DbError {
    fn is_unique_violation(&self) -> bool {
        DbError::is_unique_violation(self)
    }
}

impl UniqueViolation for SequenceError {
    fn is_unique_violation(&self) -> bool {
        match self {
            SequenceError::Database(e) => e.is_unique_violation(),
            _ => false,
        }
    }
}

/// Read/compare-and-set access to the record sets identifiers are drawn from.
pub trait SequenceStore {
    /// Identifiers of `category` records that start with `prefix`.
    fn scan_identifiers(&self, category: Category, prefix: &str) -> DbResult<Vec<String>>;

    /// Whether a record already holds exactly `identifier`.
    fn identifier_exists(&self, category: Category, identifier: &str) -> DbResult<bool>;

    /// Last serial handed out for `scope` by the counter strategy.
    fn read_counter(&self, scope: &ScopeKey) -> DbResult<Option<u32>>;

    /// Move the scope's counter from `expected` to `new`.
    ///
    /// `expected == None` creates the row. Returns false if another caller
    /// changed the counter first.
    fn compare_and_set_counter(&self, scope: &ScopeKey, expected: Option<u32>, new: u32) -> DbResult<bool>;
}
