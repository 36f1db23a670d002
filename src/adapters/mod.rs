//! Adapters layer: concrete implementations of the ports plus I/O helpers.
//!
//! - `sqlite`: SQLite ledger
//! - `blobs`: filesystem content-addressed blob store
//! - `fallback`: local copies keyed by record id
//! - `keyfile`: sealed Paillier key files
//! - `sanitize`: log redaction

pub mod blobs;
pub mod fallback;
pub mod keyfile;
pub mod sanitize;
pub mod sqlite;

pub use blobs::FsBlobStore;
pub use fallback::LocalFallback;
pub use keyfile::KeyFileError;
pub use sqlite::SqliteLedger;
