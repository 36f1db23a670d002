//! Retrieval service: record id → ledger → blob (primary, then local
//! fallback) → decoded vitals.
//!
//! The primary fetch runs on a worker thread and the caller waits at most the
//! configured timeout. A worker that misses the deadline is left to finish on
//! its own and its result is discarded. At most [`MAX_FETCH_WORKERS`] workers
//! are alive per service; past that, primary fetches fail fast as unavailable
//! until a stalled worker returns.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::domain::{
    decode_record, ContentAddress, CryptoError, DecodedRecord, EncryptedRecord, PrivateKey,
    PublicKey, RecordError,
};
use crate::ports::{BlobError, BlobStore, FallbackError, FallbackSource, Ledger, LedgerError};

/// Upper bound on concurrently running primary fetch workers.
pub const MAX_FETCH_WORKERS: usize = 8;

/// Which path served the blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobSource {
    Primary,
    /// The primary failed with `reason`; the local copy was used.
    Fallback { reason: String },
}

impl fmt::Display for BlobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary blob store"),
            Self::Fallback { reason } => write!(f, "local fallback (primary failed: {reason})"),
        }
    }
}

/// Why the primary store could not supply a usable record.
#[derive(Debug, thiserror::Error)]
pub enum PrimaryFailure {
    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("Primary blob is not a record: {0}")]
    Unparseable(#[from] RecordError),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeFailure {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Stage at which a retrieval failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStage {
    Ledger,
    Fetch,
    Decode,
}

impl fmt::Display for RetrievalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger => write!(f, "ledger lookup"),
            Self::Fetch => write!(f, "blob fetch"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Ledger lookup failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Blob fetch failed: primary: {primary}; fallback: {fallback}")]
    Fetch {
        primary: PrimaryFailure,
        #[source]
        fallback: FallbackError,
    },

    #[error("Record decode failed: {0}")]
    Decode(#[from] DecodeFailure),
}

impl RetrievalError {
    #[must_use]
    pub fn stage(&self) -> RetrievalStage {
        match self {
            Self::Ledger(_) => RetrievalStage::Ledger,
            Self::Fetch { .. } => RetrievalStage::Fetch,
            Self::Decode(_) => RetrievalStage::Decode,
        }
    }
}

/// An encrypted record together with where it came from.
#[derive(Debug, Clone)]
pub struct FetchedRecord {
    pub record_id: String,
    pub address: ContentAddress,
    pub source: BlobSource,
    pub record: EncryptedRecord,
}

/// A fully decoded retrieval.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub record_id: String,
    pub address: ContentAddress,
    pub source: BlobSource,
    pub record: DecodedRecord,
}

pub struct RetrievalService<L, B, F>
where
    L: Ledger,
    B: BlobStore + 'static,
    F: FallbackSource,
{
    ledger: Arc<L>,
    blobs: Arc<B>,
    fallback: Arc<F>,
    fetch_timeout: Duration,
    workers: Arc<AtomicUsize>,
}

/// Releases a worker slot when the fetch thread ends.
struct WorkerSlot(Arc<AtomicUsize>);

impl WorkerSlot {
    fn acquire(workers: &Arc<AtomicUsize>) -> Option<Self> {
        workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < MAX_FETCH_WORKERS).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(workers)))
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<L, B, F> RetrievalService<L, B, F>
where
    L: Ledger,
    B: BlobStore + 'static,
    F: FallbackSource,
{
    pub fn new(ledger: Arc<L>, blobs: Arc<B>, fallback: Arc<F>, fetch_timeout: Duration) -> Self {
        Self {
            ledger,
            blobs,
            fallback,
            fetch_timeout,
            workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Retrieve and decode `record_id`.
    ///
    /// # Errors
    /// Returns `RetrievalError` tagged with the failing stage.
    pub fn retrieve(
        &self,
        record_id: &str,
        public: &PublicKey,
        private: &PrivateKey,
    ) -> Result<Retrieval, RetrievalError> {
        let fetched = self.fetch_record(record_id)?;

        let record = decode_record(&fetched.record, public, private).map_err(DecodeFailure::from)?;

        tracing::info!(
            record_id,
            address = %fetched.address,
            source = %fetched.source,
            "Record retrieved"
        );

        Ok(Retrieval {
            record_id: fetched.record_id,
            address: fetched.address,
            source: fetched.source,
            record,
        })
    }

    /// Resolve and fetch the encrypted record without decrypting anything.
    ///
    /// # Errors
    /// - `RetrievalError::Ledger` if the id is not indexed (never retried)
    /// - `RetrievalError::Fetch` if both the primary and the fallback fail
    /// - `RetrievalError::Decode` if the fallback copy is not a record
    pub fn fetch_record(&self, record_id: &str) -> Result<FetchedRecord, RetrievalError> {
        let address = self.ledger.get(record_id)?;
        tracing::debug!(record_id, %address, "Ledger resolved record");

        let primary = self
            .fetch_primary(&address)
            .map_err(PrimaryFailure::from)
            .and_then(|bytes| EncryptedRecord::from_slice(&bytes).map_err(PrimaryFailure::from));

        let (record, source) = match primary {
            Ok(record) => (record, BlobSource::Primary),
            Err(primary) => {
                tracing::warn!(record_id, %address, "Primary fetch failed, using local fallback: {primary}");

                let bytes = match self.fallback.load(record_id) {
                    Ok(bytes) => bytes,
                    Err(fallback) => return Err(RetrievalError::Fetch { primary, fallback }),
                };
                let record = EncryptedRecord::from_slice(&bytes).map_err(DecodeFailure::from)?;
                (
                    record,
                    BlobSource::Fallback {
                        reason: primary.to_string(),
                    },
                )
            }
        };

        Ok(FetchedRecord {
            record_id: record_id.to_string(),
            address,
            source,
            record,
        })
    }

    fn fetch_primary(&self, address: &ContentAddress) -> Result<Vec<u8>, BlobError> {
        let Some(slot) = WorkerSlot::acquire(&self.workers) else {
            return Err(BlobError::Unavailable {
                address: address.clone(),
                reason: format!("{MAX_FETCH_WORKERS} earlier fetches still in flight"),
            });
        };

        let (tx, rx) = mpsc::channel();
        let blobs = Arc::clone(&self.blobs);
        let target = address.clone();

        thread::spawn(move || {
            let _slot = slot;
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(blobs.fetch_blob(&target));
        });

        match rx.recv_timeout(self.fetch_timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(BlobError::Unavailable {
                address: address.clone(),
                reason: format!("timed out after {} ms", self.fetch_timeout.as_millis()),
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(BlobError::Unavailable {
                address: address.clone(),
                reason: "fetch worker exited without a result".to_string(),
            }),
        }
    }
}
