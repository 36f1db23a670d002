//! Ledger port: the append-only `record_id → address` index.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::ContentAddress;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("No ledger entry for record {0}")]
    NotFound(String),

    #[error("Record {record_id} is already stored at {existing}, refusing {attempted}")]
    Conflict {
        record_id: String,
        existing: ContentAddress,
        attempted: ContentAddress,
    },

    #[error("Invalid record id: {0:?}")]
    InvalidRecordId(String),

    #[error("Ledger backend error: {0}")]
    Backend(String),
}

/// Result of a successful `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// The same mapping was already present; nothing was written.
    AlreadyStored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub record_id: String,
    pub address: ContentAddress,
    pub recorded_at: DateTime<Utc>,
}

/// Durable mapping from record ids to content addresses.
///
/// Entries are written once. Implementations must make the
/// check-and-insert of `put` atomic per record id.
pub trait Ledger: Send + Sync {
    /// Record `address` for `record_id`.
    ///
    /// # Errors
    /// - `LedgerError::Conflict` if the id maps to a different address
    /// - `LedgerError::InvalidRecordId` for an empty id
    fn put(&self, record_id: &str, address: &ContentAddress) -> Result<PutOutcome, LedgerError>;

    /// Look up the address stored for `record_id`.
    ///
    /// # Errors
    /// Returns `LedgerError::NotFound` for unknown ids.
    fn get(&self, record_id: &str) -> Result<ContentAddress, LedgerError>;

    /// All entries, oldest first.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError>;
}

/// Reject ids that cannot be a ledger key.
///
/// # Errors
/// Returns `LedgerError::InvalidRecordId` for empty or whitespace-only ids,
/// or ids containing control characters.
pub fn validate_record_id(record_id: &str) -> Result<(), LedgerError> {
    if record_id.trim().is_empty() || record_id.chars().any(char::is_control) {
        return Err(LedgerError::InvalidRecordId(record_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_record_id() {
        assert!(validate_record_id("enc_rec_000001.json").is_ok());
        assert!(matches!(validate_record_id(""), Err(LedgerError::InvalidRecordId(_))));
        assert!(matches!(validate_record_id("   "), Err(LedgerError::InvalidRecordId(_))));
        assert!(matches!(validate_record_id("a\nb"), Err(LedgerError::InvalidRecordId(_))));
    }
}
