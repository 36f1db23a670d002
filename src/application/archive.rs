//! Archive service: store encrypted record blobs and index them in the ledger.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::{compute_address, ContentAddress, EncryptedRecord, RecordError};
use crate::ports::{BlobError, BlobStore, Ledger, LedgerError, PutOutcome};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Not an encrypted record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("Blob store rejected record: {0}")]
    Blob(#[from] BlobError),

    #[error("Blob store returned {returned}, content hashes to {expected}")]
    AddressMismatch {
        expected: ContentAddress,
        returned: ContentAddress,
    },

    #[error("Ledger update failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Proof that a record is stored and indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub record_id: String,
    pub address: ContentAddress,
    pub outcome: PutOutcome,
}

/// Per-file result of [`ArchiveService::archive_directory`].
#[derive(Debug)]
pub struct ArchiveEntry {
    pub record_id: String,
    pub result: Result<ArchiveReceipt, ArchiveError>,
}

pub struct ArchiveService<L, B>
where
    L: Ledger,
    B: BlobStore,
{
    ledger: Arc<L>,
    blobs: Arc<B>,
}

impl<L, B> ArchiveService<L, B>
where
    L: Ledger,
    B: BlobStore,
{
    pub fn new(ledger: Arc<L>, blobs: Arc<B>) -> Self {
        Self { ledger, blobs }
    }

    /// Store `bytes` and record `record_id → address`.
    ///
    /// # Errors
    /// - `ArchiveError::InvalidRecord` if the bytes are not a record object
    /// - `ArchiveError::AddressMismatch` if the store returns a SHA-256
    ///   address that is not the content hash
    /// - `ArchiveError::Ledger` on a conflicting or invalid ledger entry
    pub fn archive(&self, record_id: &str, bytes: &[u8]) -> Result<ArchiveReceipt, ArchiveError> {
        let record = EncryptedRecord::from_slice(bytes)?;

        let address = self.blobs.put_blob(bytes)?;
        if address.is_sha256() {
            let expected = compute_address(bytes);
            if address != expected {
                return Err(ArchiveError::AddressMismatch {
                    expected,
                    returned: address,
                });
            }
        }

        let outcome = self.ledger.put(record_id, &address)?;

        tracing::info!(
            record_id,
            %address,
            fields = record.encrypted.len(),
            ?outcome,
            "Record archived"
        );

        Ok(ArchiveReceipt {
            record_id: record_id.to_string(),
            address,
            outcome,
        })
    }

    /// Archive every `*.json` file in `dir`, in file-name order.
    ///
    /// The record id of each file is its file name.
    ///
    /// # Errors
    /// Returns `ArchiveError::Io` only if the directory cannot be listed;
    /// per-file failures are reported in the entries.
    pub fn archive_directory(&self, dir: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let io_err = |source| ArchiveError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => files.push((name.to_string(), path)),
                None => tracing::warn!("Skipping file with non UTF-8 name: {}", path.display()),
            }
        }
        files.sort();

        tracing::info!(dir = %dir.display(), files = files.len(), "Archiving directory");

        let entries = files
            .into_iter()
            .map(|(record_id, path)| {
                let result = std::fs::read(&path)
                    .map_err(|source| ArchiveError::Io { path, source })
                    .and_then(|bytes| self.archive(&record_id, &bytes));

                if let Err(e) = &result {
                    tracing::warn!(record_id = %record_id, "Archive failed: {e}");
                }
                ArchiveEntry { record_id, result }
            })
            .collect();

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FsBlobStore, SqliteLedger};

    fn service(dir: &Path) -> ArchiveService<SqliteLedger, FsBlobStore> {
        ArchiveService::new(
            Arc::new(SqliteLedger::in_memory().expect("Should create db")),
            Arc::new(FsBlobStore::open(dir.join("blobs")).expect("Should open")),
        )
    }

    const RECORD: &[u8] = br#"{"meta": {"patient_id": "P1"}, "encrypted": {"heart_rate": {"ct": "12345"}}}"#;

    #[test]
    fn test_archive_indexes_content_hash() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let svc = service(dir.path());

        let receipt = svc.archive("r1.json", RECORD).expect("Should archive");
        assert_eq!(receipt.address, compute_address(RECORD));
        assert_eq!(receipt.outcome, PutOutcome::Stored);
        assert_eq!(svc.ledger.get("r1.json").expect("Indexed"), receipt.address);
    }

    #[test]
    fn test_rearchive_same_bytes_idempotent() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let svc = service(dir.path());

        svc.archive("r1.json", RECORD).expect("Should archive");
        let again = svc.archive("r1.json", RECORD).expect("Should archive");
        assert_eq!(again.outcome, PutOutcome::AlreadyStored);
    }

    #[test]
    fn test_non_record_rejected_before_storing() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let svc = service(dir.path());

        assert!(matches!(
            svc.archive("bad.json", b"[1,2,3]"),
            Err(ArchiveError::InvalidRecord(_))
        ));
        assert!(matches!(svc.ledger.get("bad.json"), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_archive_directory_sorted_and_isolated() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let input = dir.path().join("records");
        std::fs::create_dir(&input).expect("Should mkdir");
        std::fs::write(input.join("enc_rec_000002.json"), RECORD).expect("Should write");
        std::fs::write(input.join("enc_rec_000001.json"), br#"{"encrypted": {}}"#).expect("Should write");
        std::fs::write(input.join("enc_rec_000003.json"), b"not json").expect("Should write");
        std::fs::write(input.join("notes.txt"), b"ignored").expect("Should write");

        let svc = service(dir.path());
        let entries = svc.archive_directory(&input).expect("Should list");

        let ids: Vec<&str> = entries.iter().map(|e| e.record_id.as_str()).collect();
        assert_eq!(ids, ["enc_rec_000001.json", "enc_rec_000002.json", "enc_rec_000003.json"]);
        assert!(entries[0].result.is_ok());
        assert!(entries[1].result.is_ok());
        assert!(matches!(entries[2].result, Err(ArchiveError::InvalidRecord(_))));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let svc = service(dir.path());

        assert!(matches!(
            svc.archive_directory(&dir.path().join("absent")),
            Err(ArchiveError::Io { .. })
        ));
    }
}
