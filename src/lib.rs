//! # VitalGuard
//!
//! Privacy-preserving vital-sign monitoring over Paillier ciphertexts.
//!
//! This crate provides:
//! - Anomaly verdicts (heart rate, SpO2) computed on encrypted values, with
//!   only the threshold differences ever decrypted
//! - A decoder for encrypted record blobs
//! - Content-addressed blob storage indexed by an append-only ledger, with a
//!   local fallback for retrieval
//!
//! ## Architecture
//!
//! - `domain`: Paillier arithmetic, anomaly policy, record format
//! - `ports`: ledger and blob storage traits
//! - `adapters`: SQLite, filesystem, key files, log sanitization
//! - `application`: archive, retrieval and monitoring use cases
//! - `config`: runtime settings

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{Decoded, DecodedRecord, DecodedValue, EncryptedRecord, Verdict};

/// Result type for VitalGuard operations
pub type Result<T> = std::result::Result<T, VitalGuardError>;

/// Main error type for VitalGuard
#[derive(Debug, thiserror::Error)]
pub enum VitalGuardError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] domain::CryptoError),

    #[error("Invalid record: {0}")]
    Record(#[from] domain::RecordError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ports::LedgerError),

    #[error("Blob store error: {0}")]
    Blob(#[from] ports::BlobError),

    #[error("Fallback store error: {0}")]
    Fallback(#[from] ports::FallbackError),

    #[error("Key file error: {0}")]
    KeyFile(#[from] adapters::KeyFileError),

    #[error("Archive failed: {0}")]
    Archive(#[from] application::ArchiveError),

    #[error("Retrieval failed at {}: {0}", .0.stage())]
    Retrieval(#[from] application::RetrievalError),

    #[error("Classification failed: {0}")]
    Monitoring(#[from] application::MonitoringError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
