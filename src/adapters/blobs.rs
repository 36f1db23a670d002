//! Filesystem content-addressed blob store.
//!
//! Layout: `<root>/<sha256 hex>`. Each blob is written to a temporary sibling
//! and renamed into place, so a reader never observes a partial blob. A
//! stored blob whose bytes no longer hash to its name is replaced on the next
//! put of the correct content.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use strict_path::{PathBoundary, StrictPath};

use crate::domain::{compute_address, ContentAddress};
use crate::ports::{BlobError, BlobStore};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct FsBlobStore {
    root: PathBoundary,
}

impl FsBlobStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns `BlobError::Io` if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, BlobError> {
        let root = PathBoundary::try_new_create(dir.as_ref()).map_err(to_io)?;
        Ok(Self { root })
    }

    fn blob_path(&self, address: &ContentAddress) -> Result<StrictPath, BlobError> {
        self.root.strict_join(address.as_str()).map_err(to_io)
    }
}

fn to_io(e: strict_path::StrictPathError) -> BlobError {
    BlobError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
}

impl BlobStore for FsBlobStore {
    fn put_blob(&self, bytes: &[u8]) -> Result<ContentAddress, BlobError> {
        let address = compute_address(bytes);
        let target = self.blob_path(&address)?;

        if target.is_file() {
            match target.read() {
                Ok(existing) if address.matches(&existing) => {
                    tracing::debug!(%address, "Blob already present");
                    return Ok(address);
                }
                Ok(_) => tracing::warn!(%address, "Stored blob does not match its address, rewriting"),
                Err(e) => tracing::warn!(%address, error = %e, "Stored blob unreadable, rewriting"),
            }
        }

        let temp_name = format!(
            ".{}.{}.{}.tmp",
            address,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let temp = self.root.strict_join(&temp_name).map_err(to_io)?;
        temp.write(bytes)?;
        if let Err(e) = temp.strict_rename(address.as_str()) {
            // Best-effort cleanup; the rename error is what matters.
            let _ = temp.remove_file();
            return Err(e.into());
        }

        tracing::debug!(%address, size = bytes.len(), "Blob stored");
        Ok(address)
    }

    fn fetch_blob(&self, address: &ContentAddress) -> Result<Vec<u8>, BlobError> {
        let path = self.blob_path(address)?;

        let bytes = match path.read() {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::Unavailable {
                    address: address.clone(),
                    reason: "not in local blob store".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !address.matches(&bytes) {
            return Err(BlobError::Corrupt {
                address: address.clone(),
            });
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_fetch() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let store = FsBlobStore::open(dir.path()).expect("Should open");

        let address = store.put_blob(b"{\"encrypted\":{}}").expect("Should put");
        assert_eq!(address, compute_address(b"{\"encrypted\":{}}"));
        assert_eq!(store.fetch_blob(&address).expect("Should fetch"), b"{\"encrypted\":{}}");
    }

    #[test]
    fn test_reput_is_noop() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let store = FsBlobStore::open(dir.path()).expect("Should open");

        let first = store.put_blob(b"same").expect("Should put");
        let second = store.put_blob(b"same").expect("Should put");
        assert_eq!(first, second);

        let files = std::fs::read_dir(dir.path()).expect("Should list").count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_missing_blob_unavailable() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let store = FsBlobStore::open(dir.path()).expect("Should open");

        assert!(matches!(
            store.fetch_blob(&compute_address(b"never stored")),
            Err(BlobError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_tampered_blob_corrupt() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let store = FsBlobStore::open(dir.path()).expect("Should open");

        let address = store.put_blob(b"original").expect("Should put");
        std::fs::write(dir.path().join(address.as_str()), b"tampered").expect("Should overwrite");

        assert!(matches!(store.fetch_blob(&address), Err(BlobError::Corrupt { .. })));
    }

    #[test]
    fn test_reput_repairs_tampered_blob() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let store = FsBlobStore::open(dir.path()).expect("Should open");

        let address = store.put_blob(b"original").expect("Should put");
        std::fs::write(dir.path().join(address.as_str()), b"tampered").expect("Should overwrite");

        assert_eq!(store.put_blob(b"original").expect("Should put"), address);
        assert_eq!(store.fetch_blob(&address).expect("Should fetch"), b"original");

        let files = std::fs::read_dir(dir.path()).expect("Should list").count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_opaque_address_served_unverified() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let store = FsBlobStore::open(dir.path()).expect("Should open");
        std::fs::write(dir.path().join("QmExternalCid"), b"pinned elsewhere").expect("Should write");

        let address = ContentAddress::parse("QmExternalCid").expect("Valid address");
        assert_eq!(store.fetch_blob(&address).expect("Should fetch"), b"pinned elsewhere");
    }
}
