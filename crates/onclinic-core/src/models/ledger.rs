//! Stock ledger models.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a stock quantity changed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Stock received from a supplier
    Purchase,
    /// Stock handed out against a bill
    Dispense,
    /// Stock count adjustment (breakage, expiry write-off)
    Adjustment,
    /// Reversal of an earlier mistaken entry
    Correction,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Purchase => "purchase",
            Reason::Dispense => "dispense",
            Reason::Adjustment => "adjustment",
            Reason::Correction => "correction",
        }
    }

    /// Parse a reason code supplied at an API boundary.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_lowercase().as_str() {
            "" => Err(ValidationError::MissingReason),
            "purchase" => Ok(Reason::Purchase),
            "dispense" => Ok(Reason::Dispense),
            "adjustment" => Ok(Reason::Adjustment),
            "correction" => Ok(Reason::Correction),
            _ => Err(ValidationError::UnknownReason(s.to_string())),
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejections raised before any write takes place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Stock change must be non-zero")]
    ZeroDelta,

    #[error("Reason code is required")]
    MissingReason,

    #[error("Unknown reason code: {0}")]
    UnknownReason(String),

    #[error("Item {item_id} has {current} in stock; change of {delta} would make it negative")]
    NegativeStock {
        item_id: String,
        current: i64,
        delta: i64,
    },

    #[error("Opening stock cannot be negative: {0}")]
    NegativeOpeningStock(i64),

    #[error("Stock change overflows item balance")]
    Overflow,

    #[error("Invalid expiry window: {0} months")]
    ExpiryWindow(u32),
}

/// A request to change an item's stock.
#[derive(Debug, Clone, PartialEq)]
pub struct StockAdjustment {
    pub item_id: String,
    /// Signed quantity change; negative removes stock
    pub delta: i64,
    pub reason: Reason,
    pub notes: Option<String>,
    /// Bill number that caused the change
    pub reference_bill_id: Option<String>,
    pub created_by: Option<String>,
}

impl StockAdjustment {
    pub fn new(item_id: impl Into<String>, delta: i64, reason: Reason) -> Self {
        Self {
            item_id: item_id.into(),
            delta,
            reason,
            notes: None,
            reference_bill_id: None,
            created_by: None,
        }
    }

    /// Dispense `quantity` units against a bill.
    pub fn dispense(item_id: impl Into<String>, quantity: i64, bill_number: impl Into<String>) -> Self {
        Self::new(item_id, -quantity, Reason::Dispense).with_reference_bill(bill_number)
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_reference_bill(mut self, bill: impl Into<String>) -> Self {
        self.reference_bill_id = Some(bill.into());
        self
    }

    pub fn with_created_by(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }
}

/// An immutable ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    /// Store-assigned row ID (0 until appended)
    pub entry_id: i64,
    pub item_id: String,
    pub change: i64,
    pub reason: Reason,
    pub notes: Option<String>,
    pub reference_bill_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    /// Hash of the item's previous entry, `None` for the first one
    pub prev_hash: Option<String>,
    pub entry_hash: String,
}

impl LedgerEntry {
    /// Canonical JSON of the fields covered by `entry_hash`.
    ///
    /// `entry_id` is store-assigned after hashing and is excluded.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Content<'a> {
            item_id: &'a str,
            change: i64,
            reason: Reason,
            notes: Option<&'a str>,
            reference_bill_id: Option<&'a str>,
            created_by: Option<&'a str>,
            created_at: &'a str,
        }

        serde_json::to_string(&Content {
            item_id: &self.item_id,
            change: self.change,
            reason: self.reason,
            notes: self.notes.as_deref(),
            reference_bill_id: self.reference_bill_id.as_deref(),
            created_by: self.created_by.as_deref(),
            created_at: &self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_parse() {
        assert_eq!(Reason::parse("dispense"), Ok(Reason::Dispense));
        assert_eq!(Reason::parse(" Purchase "), Ok(Reason::Purchase));
        assert_eq!(Reason::parse(""), Err(ValidationError::MissingReason));
        assert!(matches!(
            Reason::parse("gift"),
            Err(ValidationError::UnknownReason(_))
        ));
    }

    #[test]
    fn test_reason_as_str_matches_serde() {
        for reason in [Reason::Purchase, Reason::Dispense, Reason::Adjustment, Reason::Correction] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
    }

    #[test]
    fn test_dispense_builder() {
        let adj = StockAdjustment::dispense("item-1", 5, "ONP-240705-0003").with_created_by("pharmacist");
        assert_eq!(adj.delta, -5);
        assert_eq!(adj.reason, Reason::Dispense);
        assert_eq!(adj.reference_bill_id.as_deref(), Some("ONP-240705-0003"));
        assert_eq!(adj.created_by.as_deref(), Some("pharmacist"));
    }

    #[test]
    fn test_canonical_json_ignores_entry_id_and_hashes() {
        let mut entry = LedgerEntry {
            entry_id: 0,
            item_id: "item-1".into(),
            change: -5,
            reason: Reason::Dispense,
            notes: None,
            reference_bill_id: None,
            created_by: None,
            created_at: "2024-05-01T10:00:00+00:00".into(),
            prev_hash: None,
            entry_hash: String::new(),
        };
        let before = entry.to_canonical_json().unwrap();
        entry.entry_id = 42;
        entry.entry_hash = "abc".into();
        assert_eq!(before, entry.to_canonical_json().unwrap());
    }
}
