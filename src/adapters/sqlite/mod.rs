//! SQLite adapter: implementation of the `Ledger` port.
//!
//! One table keyed by record id. `put` runs its read-compare-insert inside an
//! immediate transaction while holding the connection mutex, so concurrent
//! writers for the same id cannot both succeed.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::domain::ContentAddress;
use crate::ports::{validate_record_id, Ledger, LedgerEntry, LedgerError, PutOutcome};

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// SQLite-backed ledger.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger database at `path`.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Backend(format!("{}: {e}", parent.display())))?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory ledger (for testing).
    ///
    /// # Errors
    /// Returns error if the database cannot be created.
    pub fn in_memory() -> Result<Self, LedgerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LedgerError> {
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.init_schema()?;
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS ledger_entries (
                record_id TEXT PRIMARY KEY NOT NULL,
                address TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Backend("Ledger connection lock poisoned".to_string()))
    }
}

fn parse_address(raw: String) -> Result<ContentAddress, LedgerError> {
    ContentAddress::parse(raw).map_err(|e| LedgerError::Backend(format!("Stored address invalid: {e}")))
}

impl Ledger for SqliteLedger {
    fn put(&self, record_id: &str, address: &ContentAddress) -> Result<PutOutcome, LedgerError> {
        validate_record_id(record_id)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT address FROM ledger_entries WHERE record_id = ?1",
                params![record_id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(stored) => {
                let existing = parse_address(stored)?;
                if existing != *address {
                    tracing::warn!(
                        record_id,
                        %existing,
                        attempted = %address,
                        "Refusing to overwrite ledger entry"
                    );
                    return Err(LedgerError::Conflict {
                        record_id: record_id.to_string(),
                        existing,
                        attempted: address.clone(),
                    });
                }
                PutOutcome::AlreadyStored
            }
            None => {
                tx.execute(
                    "INSERT INTO ledger_entries (record_id, address, recorded_at) VALUES (?1, ?2, ?3)",
                    params![record_id, address.as_str(), Utc::now().to_rfc3339()],
                )?;
                PutOutcome::Stored
            }
        };

        tx.commit()?;
        tracing::debug!(record_id, %address, ?outcome, "Ledger put");
        Ok(outcome)
    }

    fn get(&self, record_id: &str) -> Result<ContentAddress, LedgerError> {
        let conn = self.lock()?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT address FROM ledger_entries WHERE record_id = ?1",
                params![record_id],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(raw) => parse_address(raw),
            None => Err(LedgerError::NotFound(record_id.to_string())),
        }
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r"
            SELECT record_id, address, recorded_at
            FROM ledger_entries
            ORDER BY recorded_at ASC, record_id ASC
            ",
        )?;

        let rows = stmt
            .query_map([], |row| {
                let record_id: String = row.get(0)?;
                let address: String = row.get(1)?;
                let recorded_at: String = row.get(2)?;
                Ok((record_id, address, recorded_at))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(record_id, address, recorded_at)| {
                let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| LedgerError::Backend(format!("Bad timestamp for {record_id}: {e}")))?;
                Ok(LedgerEntry {
                    record_id,
                    address: parse_address(address)?,
                    recorded_at,
                })
            })
            .collect()
    }
}
