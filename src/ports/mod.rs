//! Ports layer: traits at the storage seams.
//!
//! Application services depend only on these traits; `adapters` provides
//! the SQLite and filesystem implementations.

mod blob_store;
mod ledger;

pub use blob_store::{BlobError, BlobStore, FallbackError, FallbackSource};
pub use ledger::{validate_record_id, Ledger, LedgerEntry, LedgerError, PutOutcome};
