//! Blob storage ports: the primary content-addressed store and the local
//! fallback keyed by record id.

use thiserror::Error;

use crate::domain::ContentAddress;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob {address} unavailable: {reason}")]
    Unavailable {
        address: ContentAddress,
        reason: String,
    },

    #[error("Blob {address} does not match its content address")]
    Corrupt { address: ContentAddress },

    #[error("Blob store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-addressed storage.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` and return their address.
    ///
    /// # Errors
    /// Returns error if the backend rejects the write.
    fn put_blob(&self, bytes: &[u8]) -> Result<ContentAddress, BlobError>;

    /// Fetch the bytes stored under `address`.
    ///
    /// # Errors
    /// - `BlobError::Unavailable` if the backend cannot serve the address
    /// - `BlobError::Corrupt` if the content fails verification
    fn fetch_blob(&self, address: &ContentAddress) -> Result<Vec<u8>, BlobError>;
}

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("No local copy of record {0}")]
    NotFound(String),

    #[error("Record id {0:?} cannot name a local copy")]
    InvalidRecordId(String),

    #[error("Local copy I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local copies of record blobs, looked up by record id.
pub trait FallbackSource: Send + Sync {
    /// Load the local copy of `record_id`.
    ///
    /// # Errors
    /// Returns `FallbackError::NotFound` if there is no copy.
    fn load(&self, record_id: &str) -> Result<Vec<u8>, FallbackError>;
}
