//! Runtime settings with environment overrides.

use std::path::PathBuf;
use std::time::Duration;

/// Paths and limits used by the `vitalguard` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// SQLite ledger database
    pub ledger_db: PathBuf,
    /// Root of the content-addressed blob store
    pub blob_dir: PathBuf,
    /// Local copies keyed by record id
    pub fallback_dir: PathBuf,
    /// Upper bound on one primary blob fetch
    pub fetch_timeout: Duration,
    /// Sealed Paillier key file
    pub key_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ledger_db: PathBuf::from("data/ledger.db"),
            blob_dir: PathBuf::from("data/blobs"),
            fallback_dir: PathBuf::from("encrypted_blobs"),
            fetch_timeout: Duration::from_millis(5000),
            key_file: PathBuf::from("keys/paillier.json"),
        }
    }
}

impl Settings {
    /// Load overrides from the environment (best-effort).
    ///
    /// Supported:
    /// - VITALGUARD_LEDGER_DB
    /// - VITALGUARD_BLOB_DIR
    /// - VITALGUARD_FALLBACK_DIR
    /// - VITALGUARD_FETCH_TIMEOUT_MS (milliseconds, > 0)
    /// - VITALGUARD_KEY_FILE
    #[must_use]
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        let path = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        if let Some(p) = path("VITALGUARD_LEDGER_DB") {
            cfg.ledger_db = p;
        }
        if let Some(p) = path("VITALGUARD_BLOB_DIR") {
            cfg.blob_dir = p;
        }
        if let Some(p) = path("VITALGUARD_FALLBACK_DIR") {
            cfg.fallback_dir = p;
        }
        if let Some(p) = path("VITALGUARD_KEY_FILE") {
            cfg.key_file = p;
        }

        if let Some(v) = lookup("VITALGUARD_FETCH_TIMEOUT_MS") {
            match v.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => cfg.fetch_timeout = Duration::from_millis(ms),
                _ => tracing::warn!("Ignoring invalid VITALGUARD_FETCH_TIMEOUT_MS={v:?}"),
            }
        }

        cfg
    }
}
