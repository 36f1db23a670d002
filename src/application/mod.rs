//! Application layer: use cases built from domain logic and ports.
//!
//! - `ArchiveService`: store blobs and index them in the ledger
//! - `RetrievalService`: resolve, fetch (with fallback) and decode records
//! - `MonitoringService`: anomaly verdicts over encrypted records

mod archive;
mod monitoring;
mod retrieval;

pub use archive::{ArchiveEntry, ArchiveError, ArchiveReceipt, ArchiveService};
pub use monitoring::{MonitoringError, MonitoringService, SPO2_FIELDS};
pub use retrieval::{
    BlobSource, DecodeFailure, FetchedRecord, PrimaryFailure, Retrieval, RetrievalError,
    RetrievalService, RetrievalStage, MAX_FETCH_WORKERS,
};
