//! Per-item hash chain over ledger entries.

use sha2::{Digest, Sha256};

use crate::models::LedgerEntry;

/// Compute SHA-256 hash of data.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// `sha256(prev_hash || payload)`; the first entry of an item hashes the
/// payload alone.
pub fn hash_entry(prev_hash: Option<&str>, payload: &str) -> String {
    let combined = format!("{}{}", prev_hash.unwrap_or(""), payload);
    hash_data(combined.as_bytes())
}

/// Check one item's entries (in append order) link up and hash correctly.
///
/// Returns the ID of the first entry that does not, or `None` if the chain
/// is intact.
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<Option<i64>, serde_json::Error> {
    let mut prev: Option<&str> = None;

    for entry in entries {
        if entry.prev_hash.as_deref() != prev {
            return Ok(Some(entry.entry_id));
        }
        let expected = hash_entry(prev, &entry.to_canonical_json()?);
        if expected != entry.entry_hash {
            return Ok(Some(entry.entry_id));
        }
        prev = Some(&entry.entry_hash);
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reason;

    fn chained(changes: &[i64]) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = Vec::new();
        for (i, change) in changes.iter().enumerate() {
            let prev_hash = entries.last().map(|e| e.entry_hash.clone());
            let mut entry = LedgerEntry {
                entry_id: i as i64 + 1,
                item_id: "item-1".into(),
                change: *change,
                reason: Reason::Adjustment,
                notes: None,
                reference_bill_id: None,
                created_by: None,
                created_at: format!("2024-05-0{}T10:00:00+00:00", i + 1),
                prev_hash,
                entry_hash: String::new(),
            };
            entry.entry_hash =
                hash_entry(entry.prev_hash.as_deref(), &entry.to_canonical_json().unwrap());
            entries.push(entry);
        }
        entries
    }

    #[test]
    fn test_hash_data_known_value() {
        assert_eq!(
            hash_data(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_intact_chain() {
        assert_eq!(verify_chain(&chained(&[5, -2, 7])).unwrap(), None);
        assert_eq!(verify_chain(&[]).unwrap(), None);
    }

    #[test]
    fn test_edited_entry_detected() {
        let mut entries = chained(&[5, -2, 7]);
        entries[1].change = -1;
        assert_eq!(verify_chain(&entries).unwrap(), Some(2));
    }

    #[test]
    fn test_removed_entry_detected() {
        let mut entries = chained(&[5, -2, 7]);
        entries.remove(1);
        assert_eq!(verify_chain(&entries).unwrap(), Some(3));
    }
}
