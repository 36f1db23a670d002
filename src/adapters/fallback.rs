//! Local fallback copies of record blobs, keyed by record id.

use std::path::Path;

use strict_path::{PathBoundary, StrictPathError};

use crate::ports::{FallbackError, FallbackSource};

/// Directory of blobs named by record id: `<root>/<record_id>`.
///
/// Record ids are joined through a `PathBoundary`, so ids such as
/// `../secrets` or absolute paths cannot leave the directory.
pub struct LocalFallback {
    root: PathBoundary,
}

impl LocalFallback {
    /// # Errors
    /// Returns `FallbackError::Io` if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, FallbackError> {
        let root = PathBoundary::try_new_create(dir.as_ref()).map_err(|e| {
            FallbackError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        Ok(Self { root })
    }
}

impl FallbackSource for LocalFallback {
    fn load(&self, record_id: &str) -> Result<Vec<u8>, FallbackError> {
        if record_id.is_empty() {
            return Err(FallbackError::InvalidRecordId(record_id.to_string()));
        }

        let path = self.root.strict_join(record_id).map_err(|e| match e {
            StrictPathError::PathEscapesBoundary { .. } => {
                tracing::warn!(record_id, "Fallback lookup escaped its directory");
                FallbackError::InvalidRecordId(record_id.to_string())
            }
            other => FallbackError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                other.to_string(),
            )),
        })?;

        if !path.is_file() {
            return Err(FallbackError::NotFound(record_id.to_string()));
        }

        Ok(path.read()?)
    }
}
